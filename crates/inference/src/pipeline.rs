//! Request validation, plan construction and the per-frame filter.

use crate::admission::{EngineMode, Envelope, ResolutionTier, admit};
use crate::backend::{BackendConfig, InferenceEngine, Preferences, select};
use crate::capability::ensure_backend_runtime;
use crate::catalog::ModelFamily;
use crate::error::AdaptError;
use crate::model::{ModelDescriptor, ModelIdentity, PrecisionInspector, resolve};
use crate::shape::{ShapePlan, ShapeRequest, Size, WorkingScale, negotiate, working_scale};
use common::span;
use frame::correction::{DEFAULT_PASSES, DEFAULT_RADIUS};
use frame::{
    ChannelLayout, ColorFamily, Frame, FrameDescriptor, PaddingPlan, Resampler, apply,
    color_correct, from_tensor_layout, plan_padding, revert, to_tensor_layout,
};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Instant;

/// One adaptation request: which model, on which backend, with what options.
#[derive(Debug, Clone)]
pub struct AdaptationRequest {
    pub model: ModelIdentity,
    pub preferences: Preferences,
    /// Directory holding the backend plugin and its `models/` tree.
    pub backend_dir: PathBuf,
}

/// Everything decided for one frame descriptor before an engine is loaded.
#[derive(Debug, Clone)]
pub struct AdaptationPlan {
    pub source: FrameDescriptor,
    pub envelope: Envelope,
    pub scale: WorkingScale,
    pub padding: PaddingPlan,
    pub shapes: ShapePlan,
    pub config: BackendConfig,
    pub model: ModelDescriptor,
    /// Engine output is pulled back toward the source colours.
    pub color_correction: bool,
}

impl AdaptationPlan {
    pub fn padded_size(&self) -> Size {
        let (width, height) = self.padding.padded_size();
        Size::new(width, height)
    }
}

#[derive(Clone)]
pub struct AdapterMetrics {
    requests: Counter<u64>,
    rejections: Counter<u64>,
    frames: Counter<u64>,
    frame_duration: Histogram<f64>,
}

impl AdapterMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.001, 0.002, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0,
        ];
        Self {
            requests: meter
                .u64_counter("adapter_requests_total")
                .with_description("Adaptation requests received")
                .build(),
            rejections: meter
                .u64_counter("adapter_rejections_total")
                .with_description("Adaptation requests refused, by reason")
                .build(),
            frames: meter
                .u64_counter("adapter_frames_total")
                .with_description("Frames processed through an adapted engine")
                .build(),
            frame_duration: meter
                .f64_histogram("adapter_frame_duration_seconds")
                .with_description("Time to bridge, pad, infer and restore a single frame")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
        }
    }

    fn reject(&self, err: &AdaptError) {
        self.rejections
            .add(1, &[KeyValue::new("reason", err.kind())]);
    }
}

/// Builds adaptation plans and filters.
pub struct Adapter<P> {
    inspector: P,
    metrics: AdapterMetrics,
}

impl<P: PrecisionInspector> Adapter<P> {
    pub fn new(inspector: P) -> Self {
        Self {
            inspector,
            metrics: AdapterMetrics::new("inference"),
        }
    }

    /// Decide padding, shapes and engine configuration for `desc`.
    ///
    /// Pure apart from the capability cache and artifact lookup; nothing is
    /// loaded.
    pub fn plan(
        &self,
        desc: &FrameDescriptor,
        request: &AdaptationRequest,
    ) -> Result<AdaptationPlan, AdaptError> {
        let _s = span!("adaptation_plan");
        self.metrics.requests.add(1, &[]);

        self.plan_inner(desc, request).inspect_err(|err| {
            self.metrics.reject(err);
            tracing::warn!(error = %err, kind = err.kind(), "Adaptation request rejected");
        })
    }

    fn plan_inner(
        &self,
        desc: &FrameDescriptor,
        request: &AdaptationRequest,
    ) -> Result<AdaptationPlan, AdaptError> {
        validate_frame(desc)?;
        request.preferences.validate()?;

        let backend = request.preferences.backend;
        ensure_backend_runtime(backend, &request.backend_dir)?;

        let prefs = request.preferences.effective()?;
        let requested_mode = if prefs.static_engine {
            EngineMode::Static
        } else {
            EngineMode::Dynamic
        };
        let tier = if prefs.hd_tier {
            ResolutionTier::Relaxed
        } else {
            ResolutionTier::Standard
        };
        validate_custom(&request.model, requested_mode)?;

        let model = resolve(&request.model, &prefs, &request.backend_dir, &self.inspector)?;
        let mode = if model.requires_static_engine() && requested_mode == EngineMode::Dynamic {
            tracing::debug!(
                family = %model.family,
                "Self-aligning build only ships static engines"
            );
            EngineMode::Static
        } else {
            requested_mode
        };
        if model.channels == ChannelLayout::Gray && desc.format.family == ColorFamily::Rgb {
            return Err(AdaptError::invalid(
                "format",
                format!("single-channel models need a gray or YUV source, got {}", desc.format),
            ));
        }

        let envelope = admit(desc, &model, tier, mode)?;

        let scale = working_scale(envelope.area, &model, mode);
        let tile = model.tile.get() * scale.tile_multiplier();
        let padding_tile = model.padding_tile() * scale.tile_multiplier();
        let padding = plan_padding(
            desc.width,
            desc.height,
            NonZeroU32::new(padding_tile).unwrap_or(NonZeroU32::MIN),
        );
        let (padded_w, padded_h) = padding.padded_size();
        if !desc.format.accepts_size(padded_w, padded_h) {
            return Err(AdaptError::invalid(
                "tile",
                format!("padded size {padded_w}x{padded_h} breaks {} subsampling", desc.format),
            ));
        }

        let shapes = negotiate(
            &ShapeRequest {
                source: envelope.size,
                padded: Size::new(padded_w, padded_h),
                tile,
                mode,
                tier,
            },
            &model,
        )?;

        let config = select(&prefs, &model, shapes, scale)?;

        let color_correction = match model.family {
            ModelFamily::Custom => prefs.color_correction,
            _ if prefs.color_correction => {
                tracing::debug!(
                    family = %model.family,
                    "Color correction only applies to custom models"
                );
                false
            }
            _ => false,
        };

        tracing::info!(
            backend = %backend,
            family = %model.family,
            source = %envelope.size,
            padded = %Size::new(padded_w, padded_h),
            scale = ?scale,
            mode = ?mode,
            fp16 = config.fp16(),
            int8 = config.int8(),
            fp16_io = config.fp16_io(),
            workspace_mib = ?config.workspace_mib(),
            host_alignment = model.host_alignment,
            color_correction,
            "Adaptation plan ready"
        );

        Ok(AdaptationPlan {
            source: *desc,
            envelope,
            scale,
            padding,
            shapes,
            config,
            model,
            color_correction,
        })
    }

    /// Plan for `desc` and load the engine that will serve it.
    pub fn build<E: InferenceEngine>(
        &self,
        desc: &FrameDescriptor,
        request: &AdaptationRequest,
    ) -> Result<Filter<E>, AdaptError> {
        let plan = self.plan(desc, request)?;

        let engine = E::load(&plan.model, &plan.config).map_err(|e| {
            let err = AdaptError::Engine(e);
            self.metrics.reject(&err);
            err
        })?;

        Ok(Filter {
            engine,
            plan,
            metrics: self.metrics.clone(),
        })
    }
}

fn validate_frame(desc: &FrameDescriptor) -> Result<(), AdaptError> {
    if desc.width == 0 || desc.height == 0 {
        return Err(AdaptError::invalid(
            "frame",
            format!("empty frame {}x{}", desc.width, desc.height),
        ));
    }
    if !desc.format.accepts_size(desc.width, desc.height) {
        return Err(AdaptError::invalid(
            "frame",
            format!(
                "{}x{} is not a whole number of {} chroma samples",
                desc.width, desc.height, desc.format
            ),
        ));
    }
    Ok(())
}

fn validate_custom(model: &ModelIdentity, mode: EngineMode) -> Result<(), AdaptError> {
    let ModelIdentity::Custom {
        res_opt, res_max, ..
    } = model
    else {
        return Ok(());
    };

    match (res_opt, res_max) {
        (_, None) if mode == EngineMode::Dynamic => Err(AdaptError::invalid(
            "res_max",
            "dynamic engines for custom models need a maximum resolution",
        )),
        (Some(opt), Some(max)) if !opt.fits_within(*max) => Err(AdaptError::invalid(
            "res_opt",
            format!("{opt} exceeds res_max {max}"),
        )),
        _ => Ok(()),
    }
}

/// Runs one adapted engine over frames matching its plan.
///
/// Owns its engine; hosts run one filter per worker.
pub struct Filter<E> {
    engine: E,
    plan: AdaptationPlan,
    metrics: AdapterMetrics,
}

impl<E: InferenceEngine> Filter<E> {
    pub fn plan(&self) -> &AdaptationPlan {
        &self.plan
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Bridge, pad, infer and restore one frame.
    pub fn process<R: Resampler + ?Sized>(
        &mut self,
        frame: &Frame,
        resampler: &R,
    ) -> anyhow::Result<Frame> {
        let _s = span!("adapter_process");
        let start = Instant::now();

        let source = self.plan.source;
        let desc = frame.desc();
        if (desc.width, desc.height, desc.format) != (source.width, source.height, source.format) {
            anyhow::bail!(
                "frame {}x{} {} does not match the planned {}x{} {}",
                desc.width,
                desc.height,
                desc.format,
                source.width,
                source.height,
                source.format
            );
        }

        let padded = apply(frame, &self.plan.padding);
        let (tensor, metadata) = to_tensor_layout(
            &padded,
            self.plan.model.channels,
            self.plan.config.io_precision(),
            resampler,
        )?;

        let mut output = self.engine.infer(&tensor)?;
        if self.plan.color_correction {
            output = color_correct(&output, &tensor, DEFAULT_RADIUS, DEFAULT_PASSES)?;
        }
        let restored = from_tensor_layout(&output, &metadata, resampler)?;

        let factor = self.output_factor(&restored)?;
        let result = revert(restored, &self.plan.padding.scaled(factor));

        self.metrics.frames.add(1, &[]);
        self.metrics
            .frame_duration
            .record(start.elapsed().as_secs_f64(), &[]);
        tracing::trace!(
            width = result.width(),
            height = result.height(),
            factor,
            "Frame processed"
        );

        Ok(result)
    }

    fn output_factor(&self, output: &Frame) -> anyhow::Result<u32> {
        let padded = self.plan.padded_size();
        let (w, h) = (output.width(), output.height());

        let integral = w % padded.width == 0 && h % padded.height == 0;
        let factor = w / padded.width;
        if !integral || factor == 0 || factor != h / padded.height {
            anyhow::bail!(
                "engine output {w}x{h} is not an integer multiple of the input {padded}"
            );
        }
        if let Some(expected) = self.plan.model.output_scale
            && expected != factor
        {
            anyhow::bail!("engine scaled by {factor}, model declares {expected}");
        }
        Ok(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_profile_validation() {
        let custom = |res_opt, res_max| ModelIdentity::Custom {
            path: "model.onnx".into(),
            res_opt,
            res_max,
        };

        assert!(validate_custom(&custom(None, None), EngineMode::Static).is_ok());
        assert!(matches!(
            validate_custom(&custom(None, None), EngineMode::Dynamic),
            Err(AdaptError::InvalidParameter { param: "res_max", .. })
        ));
        assert!(matches!(
            validate_custom(
                &custom(Some(Size::new(4096, 2160)), Some(Size::new(1920, 1080))),
                EngineMode::Dynamic
            ),
            Err(AdaptError::InvalidParameter { param: "res_opt", .. })
        ));
        assert!(
            validate_custom(
                &custom(Some(Size::new(1280, 720)), Some(Size::new(1920, 1080))),
                EngineMode::Dynamic
            )
            .is_ok()
        );
    }

    #[test]
    fn test_frame_validation() {
        use frame::PixelFormat;

        assert!(validate_frame(&FrameDescriptor::new(1280, 720, PixelFormat::YUV420P10)).is_ok());
        assert!(validate_frame(&FrameDescriptor::new(0, 720, PixelFormat::RGBS)).is_err());
        assert!(validate_frame(&FrameDescriptor::new(1281, 720, PixelFormat::YUV420P8)).is_err());
        assert!(validate_frame(&FrameDescriptor::new(1281, 721, PixelFormat::YUV444P8)).is_ok());
    }
}
