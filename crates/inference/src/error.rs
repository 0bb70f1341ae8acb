use crate::backend::{BackendFamily, Capability};
use crate::shape::Size;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdaptError {
    #[error("invalid parameter {param}: {reason}")]
    InvalidParameter { param: &'static str, reason: String },

    #[error("{size} ({area} px) exceeds the {tier} ceiling of {limit} px")]
    ResolutionExceeded {
        size: Size,
        area: u64,
        limit: u64,
        tier: &'static str,
    },

    #[error("{size} is outside the dynamic engine range {min}..={max}")]
    DynamicShapeUnsupported { size: Size, min: Size, max: Size },

    #[error("model artifact not found (searched {})", display_paths(.candidates))]
    ModelNotFound { candidates: Vec<PathBuf> },

    #[error("unsupported model precision: element type {code} in {}", .path.display())]
    UnsupportedModelPrecision { path: PathBuf, code: i32 },

    #[error("{backend} does not provide required capability {capability}")]
    CapabilityMissing {
        backend: BackendFamily,
        capability: Capability,
    },

    #[error("engine error: {0:#}")]
    Engine(#[from] anyhow::Error),
}

impl AdaptError {
    pub fn invalid(param: &'static str, reason: impl Into<String>) -> Self {
        AdaptError::InvalidParameter {
            param,
            reason: reason.into(),
        }
    }

    /// Short label used as the `reason` attribute on rejection metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AdaptError::InvalidParameter { .. } => "invalid_parameter",
            AdaptError::ResolutionExceeded { .. } => "resolution_exceeded",
            AdaptError::DynamicShapeUnsupported { .. } => "dynamic_shape_unsupported",
            AdaptError::ModelNotFound { .. } => "model_not_found",
            AdaptError::UnsupportedModelPrecision { .. } => "unsupported_model_precision",
            AdaptError::CapabilityMissing { .. } => "capability_missing",
            AdaptError::Engine(_) => "engine",
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
