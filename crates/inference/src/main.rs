use common::TelemetryGuard;
use frame::{FrameDescriptor, PixelFormat};
use inference::{AdapterConfig, Adapter, logging::setup_logging};

#[cfg(feature = "ort-backend")]
use inference::backend::ort::{OrtEngine, OrtPrecisionInspector};

#[cfg(not(feature = "ort-backend"))]
compile_error!("The 'ort-backend' feature is required to build inference-plan");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AdapterConfig::from_env()?;

    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(TelemetryGuard::init(
            "inference-plan",
            endpoint,
            config.environment,
        )?),
        None => {
            setup_logging(&config);
            None
        }
    };

    tracing::info!(config = ?config, "Loaded configuration");

    let desc = FrameDescriptor::new(
        config.input_size.width,
        config.input_size.height,
        PixelFormat::YUV420P10,
    );

    let adapter = Adapter::new(OrtPrecisionInspector);
    let plan = adapter.plan(&desc, &config.request)?;

    let summary = serde_json::json!({
        "source": plan.envelope.size,
        "tier": plan.envelope.tier,
        "mode": plan.envelope.mode,
        "scale": plan.scale,
        "padded": plan.padded_size(),
        "model": plan.model,
        "config": plan.config,
        "color_correction": plan.color_correction,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if config.load_engine {
        tracing::info!("Loading inference engine");
        let filter = adapter.build::<OrtEngine>(&desc, &config.request)?;
        tracing::info!(
            input_type = ?filter.engine().input_type(),
            "Engine loaded successfully"
        );
    }

    Ok(())
}
