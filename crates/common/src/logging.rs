use crate::config::Environment;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::Layered, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Subscriber stack every process shares below its OpenTelemetry layer.
pub(crate) type BaseSubscriber = Layered<EnvFilter, Registry>;

/// Initialize tracing subscriber with pretty formatting for development
/// and JSON formatting for production.
///
/// Uses RUST_LOG environment variable for filtering (defaults to "info" if not set).
/// Spans are forwarded to OpenTelemetry if a global tracer provider has been
/// installed; otherwise the layer is inert.
pub fn setup_logging(environment: Environment) {
    install(environment, tracing_opentelemetry::layer());
}

pub(crate) fn install<L>(environment: Environment, otel_layer: L)
where
    L: Layer<BaseSubscriber> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer);

    match environment {
        Environment::Production => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_level(true))
                .init();
        }
        Environment::Development => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
                .init();
        }
    }
}
