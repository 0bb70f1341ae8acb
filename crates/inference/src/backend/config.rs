//! Typed per-backend engine configuration.
//!
//! Built by [`super::select`]; serialized only when handed to an external
//! engine or printed by the planning binary.

use super::BackendFamily;
use crate::shape::{ShapePlan, WorkingScale};
use frame::TensorPrecision;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TensorRtConfig {
    pub device_id: u32,
    pub num_streams: u32,
    pub fp16: bool,
    pub int8: bool,
    pub tf32: bool,
    pub fp16_io: bool,
    pub workspace_mib: Option<u64>,
    pub graph_capture: bool,
    pub use_cublas: bool,
    pub use_cudnn: bool,
    /// Builder optimization level, 0..=5.
    pub opt_level: u8,
    /// Working scale the engine runs the model at.
    pub scale: WorkingScale,
    pub shapes: ShapePlan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigraphxConfig {
    pub device_id: u32,
    pub num_streams: u32,
    pub fp16: bool,
    pub fp16_io: bool,
    pub exhaustive_tune: bool,
    pub scale: WorkingScale,
    pub shapes: ShapePlan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectMlConfig {
    pub device_id: u32,
    pub num_streams: u32,
    pub fp16_io: bool,
    pub scale: WorkingScale,
    pub shapes: ShapePlan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoreMlConfig {
    pub num_streams: u32,
    pub fp16: bool,
    pub fp16_io: bool,
    pub ml_program: bool,
    pub scale: WorkingScale,
    pub shapes: ShapePlan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrtCudaConfig {
    pub device_id: u32,
    pub num_streams: u32,
    pub fp16_io: bool,
    pub graph_capture: bool,
    pub scale: WorkingScale,
    pub shapes: ShapePlan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrtCpuConfig {
    pub num_streams: u32,
    pub fp16_io: bool,
    pub scale: WorkingScale,
    pub shapes: ShapePlan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum BackendConfig {
    TensorRt(TensorRtConfig),
    Migraphx(MigraphxConfig),
    OrtDirectMl(DirectMlConfig),
    OrtCoreMl(CoreMlConfig),
    OrtCuda(OrtCudaConfig),
    OrtCpu(OrtCpuConfig),
}

impl BackendConfig {
    pub fn family(&self) -> BackendFamily {
        match self {
            BackendConfig::TensorRt(_) => BackendFamily::TensorRt,
            BackendConfig::Migraphx(_) => BackendFamily::Migraphx,
            BackendConfig::OrtDirectMl(_) => BackendFamily::OrtDirectMl,
            BackendConfig::OrtCoreMl(_) => BackendFamily::OrtCoreMl,
            BackendConfig::OrtCuda(_) => BackendFamily::OrtCuda,
            BackendConfig::OrtCpu(_) => BackendFamily::OrtCpu,
        }
    }

    pub fn fp16(&self) -> bool {
        match self {
            BackendConfig::TensorRt(c) => c.fp16,
            BackendConfig::Migraphx(c) => c.fp16,
            BackendConfig::OrtCoreMl(c) => c.fp16,
            BackendConfig::OrtDirectMl(_) | BackendConfig::OrtCuda(_) | BackendConfig::OrtCpu(_) => {
                false
            }
        }
    }

    pub fn int8(&self) -> bool {
        match self {
            BackendConfig::TensorRt(c) => c.int8,
            _ => false,
        }
    }

    pub fn fp16_io(&self) -> bool {
        match self {
            BackendConfig::TensorRt(c) => c.fp16_io,
            BackendConfig::Migraphx(c) => c.fp16_io,
            BackendConfig::OrtDirectMl(c) => c.fp16_io,
            BackendConfig::OrtCoreMl(c) => c.fp16_io,
            BackendConfig::OrtCuda(c) => c.fp16_io,
            BackendConfig::OrtCpu(c) => c.fp16_io,
        }
    }

    /// Element type of the tensors exchanged with the engine.
    pub fn io_precision(&self) -> TensorPrecision {
        if self.fp16_io() {
            TensorPrecision::Fp16
        } else {
            TensorPrecision::Fp32
        }
    }

    pub fn workspace_mib(&self) -> Option<u64> {
        match self {
            BackendConfig::TensorRt(c) => c.workspace_mib,
            _ => None,
        }
    }

    pub fn graph_capture(&self) -> bool {
        match self {
            BackendConfig::TensorRt(c) => c.graph_capture,
            BackendConfig::OrtCuda(c) => c.graph_capture,
            _ => false,
        }
    }

    pub fn num_streams(&self) -> u32 {
        match self {
            BackendConfig::TensorRt(c) => c.num_streams,
            BackendConfig::Migraphx(c) => c.num_streams,
            BackendConfig::OrtDirectMl(c) => c.num_streams,
            BackendConfig::OrtCoreMl(c) => c.num_streams,
            BackendConfig::OrtCuda(c) => c.num_streams,
            BackendConfig::OrtCpu(c) => c.num_streams,
        }
    }

    pub fn device_id(&self) -> Option<u32> {
        match self {
            BackendConfig::TensorRt(c) => Some(c.device_id),
            BackendConfig::Migraphx(c) => Some(c.device_id),
            BackendConfig::OrtDirectMl(c) => Some(c.device_id),
            BackendConfig::OrtCuda(c) => Some(c.device_id),
            BackendConfig::OrtCoreMl(_) | BackendConfig::OrtCpu(_) => None,
        }
    }

    pub fn shapes(&self) -> &ShapePlan {
        match self {
            BackendConfig::TensorRt(c) => &c.shapes,
            BackendConfig::Migraphx(c) => &c.shapes,
            BackendConfig::OrtDirectMl(c) => &c.shapes,
            BackendConfig::OrtCoreMl(c) => &c.shapes,
            BackendConfig::OrtCuda(c) => &c.shapes,
            BackendConfig::OrtCpu(c) => &c.shapes,
        }
    }

    pub fn scale(&self) -> WorkingScale {
        match self {
            BackendConfig::TensorRt(c) => c.scale,
            BackendConfig::Migraphx(c) => c.scale,
            BackendConfig::OrtDirectMl(c) => c.scale,
            BackendConfig::OrtCoreMl(c) => c.scale,
            BackendConfig::OrtCuda(c) => c.scale,
            BackendConfig::OrtCpu(c) => c.scale,
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
