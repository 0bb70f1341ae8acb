//! Precision and feature selection for one backend.

use super::config::{
    BackendConfig, CoreMlConfig, DirectMlConfig, MigraphxConfig, OrtCpuConfig, OrtCudaConfig,
    TensorRtConfig,
};
use super::{BackendFamily, Capability, negotiate};
use crate::catalog::ModelFamily;
use crate::error::AdaptError;
use crate::model::{DeclaredPrecision, ModelDescriptor};
use crate::shape::{ShapePlan, WorkingScale};

/// Workspaces below this size are left to the engine's default.
pub const WORKSPACE_THRESHOLD_MIB: u64 = 128;

/// Largest accepted workspace request, 1 TiB.
pub const MAX_WORKSPACE_MIB: u64 = 1 << 20;

pub const MAX_OPT_LEVEL: u8 = 5;

/// What the caller asked for, before capability negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub backend: BackendFamily,
    pub device_id: u32,
    /// Concurrent inference requests the host keeps in flight.
    pub num_streams: u32,
    pub fp16: bool,
    pub int8: bool,
    pub workspace_mib: u64,
    pub graph_capture: bool,
    pub ensemble: bool,
    pub static_engine: bool,
    /// Opt into the relaxed HD resolution tier.
    pub hd_tier: bool,
    pub opt_level: u8,
    pub exhaustive_tune: bool,
    pub ml_program: bool,
    pub use_cublas: bool,
    pub use_cudnn: bool,
    /// Interpolation fast path: RIFE runs its self-aligning variant with no
    /// host padding, full scale and no ensemble.
    pub turbo: bool,
    /// Pull custom model output back toward the source colours.
    pub color_correction: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            backend: BackendFamily::TensorRt,
            device_id: 0,
            num_streams: 2,
            fp16: true,
            int8: false,
            workspace_mib: 0,
            graph_capture: true,
            ensemble: false,
            static_engine: false,
            hd_tier: false,
            opt_level: 3,
            exhaustive_tune: false,
            ml_program: false,
            use_cublas: false,
            use_cudnn: false,
            turbo: false,
            color_correction: false,
        }
    }
}

impl Preferences {
    pub fn validate(&self) -> Result<(), AdaptError> {
        if self.device_id > 2 {
            return Err(AdaptError::invalid(
                "device_id",
                format!("must be one of 0, 1, 2 (got {})", self.device_id),
            ));
        }
        if self.num_streams == 0 {
            return Err(AdaptError::invalid("num_streams", "must be at least 1"));
        }
        if self.opt_level > MAX_OPT_LEVEL {
            return Err(AdaptError::invalid(
                "opt_level",
                format!("must be within 0..={MAX_OPT_LEVEL} (got {})", self.opt_level),
            ));
        }
        if self.workspace_mib > MAX_WORKSPACE_MIB {
            return Err(AdaptError::invalid(
                "workspace_mib",
                format!(
                    "must be at most {MAX_WORKSPACE_MIB} (got {})",
                    self.workspace_mib
                ),
            ));
        }
        Ok(())
    }

    /// Drop every advisory feature the backend cannot honour.
    ///
    /// A dynamic engine requested on a static-only backend becomes static.
    /// Precision options are left to [`select`].
    pub fn effective(&self) -> Result<Self, AdaptError> {
        let backend = self.backend;
        let multi_stream = negotiate(backend, Capability::MultiStream, self.num_streams > 1)?;
        let dynamic = negotiate(backend, Capability::DynamicShape, !self.static_engine)?;

        Ok(Self {
            num_streams: if multi_stream { self.num_streams } else { 1 },
            static_engine: !dynamic,
            graph_capture: negotiate(backend, Capability::GraphCapture, self.graph_capture)?,
            ensemble: negotiate(backend, Capability::Ensemble, self.ensemble)?,
            exhaustive_tune: negotiate(backend, Capability::ExhaustiveTune, self.exhaustive_tune)?,
            ml_program: negotiate(backend, Capability::MlProgram, self.ml_program)?,
            ..self.clone()
        })
    }
}

/// Engine workspace for `mib` requested megabytes.
///
/// Dynamic engines get twice the requested workspace to cover the profile range.
pub fn workspace_for(mib: u64, shapes: &ShapePlan) -> Result<Option<u64>, AdaptError> {
    if mib < WORKSPACE_THRESHOLD_MIB {
        return Ok(None);
    }
    let factor = match shapes {
        ShapePlan::Static { .. } => 1,
        ShapePlan::Dynamic { .. } => 2,
    };
    mib.checked_mul(factor)
        .map(Some)
        .ok_or_else(|| AdaptError::invalid("workspace_mib", format!("{mib} MiB overflows")))
}

struct Precision {
    fp16: bool,
    int8: bool,
    fp16_io: bool,
}

fn select_precision(
    prefs: &Preferences,
    model: &ModelDescriptor,
) -> Result<Precision, AdaptError> {
    let backend = prefs.backend;
    let envelope = backend.envelope();

    let (fp16, int8) = match model.precision {
        DeclaredPrecision::Fp16 => {
            if prefs.fp16 || prefs.int8 {
                tracing::debug!(
                    backend = %backend,
                    "Model is declared fp16, runtime quantization stays off"
                );
            }
            (false, false)
        }
        DeclaredPrecision::Fp32 => {
            let int8 = negotiate(backend, Capability::Int8, prefs.int8)?;
            let wants_fp16 = prefs.fp16 || (int8 && !envelope.pure_int8_io);
            (negotiate(backend, Capability::Fp16, wants_fp16)?, int8)
        }
    };

    let wants_fp16_io = model.precision == DeclaredPrecision::Fp16
        || (envelope.io_follows_quantization && fp16);
    let fp16_io = negotiate(backend, Capability::Fp16Io, wants_fp16_io)?;

    Ok(Precision {
        fp16,
        int8,
        fp16_io,
    })
}

/// Build the engine configuration for `prefs`, which must already be
/// [`Preferences::effective`]. `scale` is the working scale chosen for the frame.
pub fn select(
    prefs: &Preferences,
    model: &ModelDescriptor,
    shapes: ShapePlan,
    scale: WorkingScale,
) -> Result<BackendConfig, AdaptError> {
    let Precision {
        fp16,
        int8,
        fp16_io,
    } = select_precision(prefs, model)?;
    let custom = model.family == ModelFamily::Custom;

    let config = match prefs.backend {
        BackendFamily::TensorRt => BackendConfig::TensorRt(TensorRtConfig {
            device_id: prefs.device_id,
            num_streams: prefs.num_streams,
            fp16,
            int8,
            tf32: !fp16,
            fp16_io,
            workspace_mib: workspace_for(prefs.workspace_mib, &shapes)?,
            graph_capture: prefs.graph_capture,
            use_cublas: custom && prefs.use_cublas,
            use_cudnn: custom && prefs.use_cudnn,
            opt_level: prefs.opt_level,
            scale,
            shapes,
        }),
        BackendFamily::Migraphx => BackendConfig::Migraphx(MigraphxConfig {
            device_id: prefs.device_id,
            num_streams: prefs.num_streams,
            fp16,
            fp16_io,
            exhaustive_tune: prefs.exhaustive_tune,
            scale,
            shapes,
        }),
        BackendFamily::OrtDirectMl => BackendConfig::OrtDirectMl(DirectMlConfig {
            device_id: prefs.device_id,
            num_streams: prefs.num_streams,
            fp16_io,
            scale,
            shapes,
        }),
        BackendFamily::OrtCoreMl => BackendConfig::OrtCoreMl(CoreMlConfig {
            num_streams: prefs.num_streams,
            fp16,
            fp16_io,
            ml_program: prefs.ml_program,
            scale,
            shapes,
        }),
        BackendFamily::OrtCuda => BackendConfig::OrtCuda(OrtCudaConfig {
            device_id: prefs.device_id,
            num_streams: prefs.num_streams,
            fp16_io,
            graph_capture: prefs.graph_capture,
            scale,
            shapes,
        }),
        BackendFamily::OrtCpu => BackendConfig::OrtCpu(OrtCpuConfig {
            num_streams: prefs.num_streams,
            fp16_io,
            scale,
            shapes,
        }),
    };

    Ok(config)
}
