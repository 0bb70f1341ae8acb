use crate::error::AdaptError;
use crate::model::ModelDescriptor;
use crate::shape::WorkingScale;
use frame::TensorFrame;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub mod config;
#[cfg(feature = "ort-backend")]
pub mod ort;
pub mod select;

pub use config::{
    BackendConfig, CoreMlConfig, DirectMlConfig, MigraphxConfig, OrtCpuConfig, OrtCudaConfig,
    TensorRtConfig,
};
pub use select::{
    MAX_WORKSPACE_MIB, Preferences, WORKSPACE_THRESHOLD_MIB, select, workspace_for,
};

/// Opaque compute engine invoked once per frame.
///
/// The engine owns any internal concurrency; `num_streams` in the config is a hint.
/// Engines run the model at `config.scale()`, see [`infer_at_scale`].
pub trait InferenceEngine {
    fn load(model: &ModelDescriptor, config: &BackendConfig) -> anyhow::Result<Self>
    where
        Self: Sized;

    fn infer(&mut self, input: &TensorFrame) -> anyhow::Result<TensorFrame>;
}

/// Run `infer` at the configured working scale.
///
/// A half-scale engine sees the input 2x2 box averaged and its output is
/// brought back to the full extent, so callers always exchange full-size tensors.
pub fn infer_at_scale(
    scale: WorkingScale,
    input: &TensorFrame,
    infer: impl FnOnce(&TensorFrame) -> anyhow::Result<TensorFrame>,
) -> anyhow::Result<TensorFrame> {
    match scale {
        WorkingScale::Full => infer(input),
        WorkingScale::Half => infer(&input.halved()?)?.doubled(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendFamily {
    TensorRt,
    Migraphx,
    OrtDirectMl,
    OrtCoreMl,
    OrtCuda,
    OrtCpu,
}

impl BackendFamily {
    pub const ALL: [BackendFamily; 6] = [
        BackendFamily::TensorRt,
        BackendFamily::Migraphx,
        BackendFamily::OrtDirectMl,
        BackendFamily::OrtCoreMl,
        BackendFamily::OrtCuda,
        BackendFamily::OrtCpu,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendFamily::TensorRt => "tensorrt",
            BackendFamily::Migraphx => "migraphx",
            BackendFamily::OrtDirectMl => "ort_directml",
            BackendFamily::OrtCoreMl => "ort_coreml",
            BackendFamily::OrtCuda => "ort_cuda",
            BackendFamily::OrtCpu => "ort_cpu",
        }
    }

    /// Host plugin that provides this backend. The ONNX Runtime families share one.
    pub fn plugin(&self) -> &'static str {
        match self {
            BackendFamily::TensorRt => "trt",
            BackendFamily::Migraphx => "migx",
            BackendFamily::OrtDirectMl
            | BackendFamily::OrtCoreMl
            | BackendFamily::OrtCuda
            | BackendFamily::OrtCpu => "ort",
        }
    }

    pub fn envelope(&self) -> &'static EngineEnvelope {
        match self {
            BackendFamily::TensorRt => &EngineEnvelope::TENSORRT,
            BackendFamily::Migraphx => &EngineEnvelope::MIGRAPHX,
            BackendFamily::OrtDirectMl => &EngineEnvelope::ORT_DIRECTML,
            BackendFamily::OrtCoreMl => &EngineEnvelope::ORT_COREML,
            BackendFamily::OrtCuda => &EngineEnvelope::ORT_CUDA,
            BackendFamily::OrtCpu => &EngineEnvelope::ORT_CPU,
        }
    }
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tensorrt" | "trt" => Ok(BackendFamily::TensorRt),
            "migraphx" | "migx" => Ok(BackendFamily::Migraphx),
            "ort_directml" | "directml" | "dml" => Ok(BackendFamily::OrtDirectMl),
            "ort_coreml" | "coreml" => Ok(BackendFamily::OrtCoreMl),
            "ort_cuda" | "cuda" => Ok(BackendFamily::OrtCuda),
            "ort_cpu" | "cpu" => Ok(BackendFamily::OrtCpu),
            other => Err(format!("unknown backend {other:?}")),
        }
    }
}

/// Static capability table for one backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineEnvelope {
    pub supports_dynamic_shape: bool,
    pub supports_fp16: bool,
    pub supports_fp16_io: bool,
    pub supports_int8: bool,
    /// int8 engines keep int8 tensors end to end instead of falling back to fp16.
    pub pure_int8_io: bool,
    pub supports_graph_capture: bool,
    pub supports_multi_stream: bool,
    pub supports_ensemble: bool,
    pub supports_workspace: bool,
    /// Tensor IO switches to fp16 whenever fp16 quantization is on.
    pub io_follows_quantization: bool,
    pub supports_exhaustive_tune: bool,
    pub supports_ml_program: bool,
    /// The host pads frames to the model tile and may halve the working scale.
    /// Without it, models that need alignment run their internal variant instead.
    pub supports_host_alignment: bool,
}

impl EngineEnvelope {
    const NONE: Self = Self {
        supports_dynamic_shape: false,
        supports_fp16: false,
        supports_fp16_io: false,
        supports_int8: false,
        pure_int8_io: false,
        supports_graph_capture: false,
        supports_multi_stream: false,
        supports_ensemble: false,
        supports_workspace: false,
        io_follows_quantization: false,
        supports_exhaustive_tune: false,
        supports_ml_program: false,
        supports_host_alignment: true,
    };

    pub const TENSORRT: Self = Self {
        supports_dynamic_shape: true,
        supports_fp16: true,
        supports_fp16_io: true,
        supports_int8: true,
        supports_graph_capture: true,
        supports_multi_stream: true,
        supports_ensemble: true,
        supports_workspace: true,
        io_follows_quantization: true,
        ..Self::NONE
    };

    pub const MIGRAPHX: Self = Self {
        supports_fp16: true,
        supports_fp16_io: true,
        supports_multi_stream: true,
        io_follows_quantization: true,
        supports_exhaustive_tune: true,
        ..Self::NONE
    };

    pub const ORT_DIRECTML: Self = Self {
        supports_fp16_io: true,
        supports_multi_stream: true,
        supports_ensemble: true,
        ..Self::NONE
    };

    pub const ORT_COREML: Self = Self {
        supports_fp16: true,
        supports_fp16_io: true,
        supports_multi_stream: true,
        supports_ml_program: true,
        supports_host_alignment: false,
        ..Self::NONE
    };

    pub const ORT_CUDA: Self = Self {
        supports_fp16_io: true,
        supports_graph_capture: true,
        supports_multi_stream: true,
        supports_ensemble: true,
        ..Self::NONE
    };

    pub const ORT_CPU: Self = Self {
        supports_fp16_io: true,
        supports_multi_stream: true,
        supports_ensemble: true,
        ..Self::NONE
    };
}

/// Every feature a caller can ask a backend for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Int8,
    Fp16Io,
    BackendRuntime,
    Fp16,
    GraphCapture,
    MultiStream,
    Ensemble,
    DynamicShape,
    ExhaustiveTune,
    MlProgram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityClass {
    /// Missing support fails the request with `CapabilityMissing`.
    Required,
    /// Missing support silently drops the feature.
    Advisory,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::Int8,
        Capability::Fp16Io,
        Capability::BackendRuntime,
        Capability::Fp16,
        Capability::GraphCapture,
        Capability::MultiStream,
        Capability::Ensemble,
        Capability::DynamicShape,
        Capability::ExhaustiveTune,
        Capability::MlProgram,
    ];

    pub fn class(&self) -> CapabilityClass {
        match self {
            Capability::Int8 | Capability::Fp16Io | Capability::BackendRuntime => {
                CapabilityClass::Required
            }
            Capability::Fp16
            | Capability::GraphCapture
            | Capability::MultiStream
            | Capability::Ensemble
            | Capability::DynamicShape
            | Capability::ExhaustiveTune
            | Capability::MlProgram => CapabilityClass::Advisory,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Int8 => "int8",
            Capability::Fp16Io => "fp16_io",
            Capability::BackendRuntime => "backend_runtime",
            Capability::Fp16 => "fp16",
            Capability::GraphCapture => "graph_capture",
            Capability::MultiStream => "multi_stream",
            Capability::Ensemble => "ensemble",
            Capability::DynamicShape => "dynamic_shape",
            Capability::ExhaustiveTune => "exhaustive_tune",
            Capability::MlProgram => "ml_program",
        }
    }

    /// Runtime presence is not part of the static table; see [`crate::capability`].
    pub fn supported_by(&self, envelope: &EngineEnvelope) -> bool {
        match self {
            Capability::Int8 => envelope.supports_int8,
            Capability::Fp16Io => envelope.supports_fp16_io,
            Capability::BackendRuntime => true,
            Capability::Fp16 => envelope.supports_fp16,
            Capability::GraphCapture => envelope.supports_graph_capture,
            Capability::MultiStream => envelope.supports_multi_stream,
            Capability::Ensemble => envelope.supports_ensemble,
            Capability::DynamicShape => envelope.supports_dynamic_shape,
            Capability::ExhaustiveTune => envelope.supports_exhaustive_tune,
            Capability::MlProgram => envelope.supports_ml_program,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grant or refuse a requested capability according to its class.
///
/// Returns whether the feature ends up enabled.
pub fn negotiate(
    backend: BackendFamily,
    capability: Capability,
    requested: bool,
) -> Result<bool, AdaptError> {
    if !requested {
        return Ok(false);
    }
    if capability.supported_by(backend.envelope()) {
        return Ok(true);
    }

    match capability.class() {
        CapabilityClass::Required => Err(AdaptError::CapabilityMissing {
            backend,
            capability,
        }),
        CapabilityClass::Advisory => {
            tracing::debug!(
                backend = %backend,
                capability = %capability,
                "Dropping unsupported advisory capability"
            );
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_capability_has_one_class() {
        let required: Vec<_> = Capability::ALL
            .iter()
            .filter(|c| c.class() == CapabilityClass::Required)
            .collect();
        assert_eq!(
            required,
            [
                &Capability::Int8,
                &Capability::Fp16Io,
                &Capability::BackendRuntime
            ]
        );
        assert_eq!(
            Capability::ALL
                .iter()
                .filter(|c| c.class() == CapabilityClass::Advisory)
                .count(),
            7
        );
    }

    #[test]
    fn test_advisory_drop_never_fails() {
        for backend in BackendFamily::ALL {
            for capability in Capability::ALL {
                if capability.class() != CapabilityClass::Advisory {
                    continue;
                }
                let granted = negotiate(backend, capability, true).unwrap();
                assert_eq!(
                    granted,
                    capability.supported_by(backend.envelope()),
                    "{capability} on {backend}"
                );
            }
        }
    }

    #[test]
    fn test_required_capability_fails_when_missing() {
        let err = negotiate(BackendFamily::OrtDirectMl, Capability::Int8, true).unwrap_err();
        assert!(matches!(
            err,
            AdaptError::CapabilityMissing {
                backend: BackendFamily::OrtDirectMl,
                capability: Capability::Int8
            }
        ));

        let err = negotiate(BackendFamily::Migraphx, Capability::Int8, true).unwrap_err();
        assert!(matches!(err, AdaptError::CapabilityMissing { .. }));

        assert!(negotiate(BackendFamily::TensorRt, Capability::Int8, true).unwrap());
    }

    #[test]
    fn test_unrequested_capability_is_never_checked() {
        for backend in BackendFamily::ALL {
            for capability in Capability::ALL {
                assert!(!negotiate(backend, capability, false).unwrap());
            }
        }
    }

    #[test]
    fn test_only_tensorrt_compiles_dynamic_shapes() {
        for backend in BackendFamily::ALL {
            assert_eq!(
                backend.envelope().supports_dynamic_shape,
                backend == BackendFamily::TensorRt
            );
        }
    }

    #[test]
    fn test_fp16_io_available_everywhere() {
        for backend in BackendFamily::ALL {
            assert!(negotiate(backend, Capability::Fp16Io, true).unwrap(), "{backend}");
        }
    }

    #[test]
    fn test_fp16_quantization_only_where_the_provider_exposes_it() {
        let granted: Vec<_> = BackendFamily::ALL
            .into_iter()
            .filter(|b| negotiate(*b, Capability::Fp16, true).unwrap())
            .collect();
        assert_eq!(
            granted,
            [
                BackendFamily::TensorRt,
                BackendFamily::Migraphx,
                BackendFamily::OrtCoreMl
            ]
        );
    }

    #[test]
    fn test_only_coreml_skips_host_alignment() {
        for backend in BackendFamily::ALL {
            assert_eq!(
                backend.envelope().supports_host_alignment,
                backend != BackendFamily::OrtCoreMl
            );
        }
    }

    #[test]
    fn test_half_scale_inference_sees_half_extent() {
        use frame::{Plane, TensorPrecision};

        let input = TensorFrame::from_planes(&[Plane::filled(8, 4, 0.5)], TensorPrecision::Fp32)
            .unwrap();
        let mut seen = None;
        let output = infer_at_scale(WorkingScale::Half, &input, |t| {
            seen = Some((t.width(), t.height()));
            Ok(t.clone())
        })
        .unwrap();
        assert_eq!(seen, Some((4, 2)));
        assert_eq!(output, input);

        let output = infer_at_scale(WorkingScale::Full, &input, |t| {
            seen = Some((t.width(), t.height()));
            Ok(t.clone())
        })
        .unwrap();
        assert_eq!(seen, Some((8, 4)));
        assert_eq!(output, input);
    }

    #[test]
    fn test_backend_names_parse() {
        for backend in BackendFamily::ALL {
            assert_eq!(backend.as_str().parse::<BackendFamily>().unwrap(), backend);
        }
        assert_eq!("TRT".parse::<BackendFamily>().unwrap(), BackendFamily::TensorRt);
        assert_eq!("dml".parse::<BackendFamily>().unwrap(), BackendFamily::OrtDirectMl);
        assert!("vulkan".parse::<BackendFamily>().is_err());
    }
}
