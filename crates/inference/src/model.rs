//! Model descriptor resolution: artifact lookup, declared precision and
//! the per-family envelope a request is checked against.

use crate::backend::Preferences;
use crate::catalog::{CatalogEntry, ModelFamily, ResolutionLimits};
use crate::error::AdaptError;
use crate::shape::{ShapeSource, Size};
use frame::{ChannelLayout, TensorPrecision};
use serde::Serialize;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

/// ONNX `TensorProto.DataType` codes this layer accepts.
pub const ONNX_FLOAT: i32 = 1;
pub const ONNX_FLOAT16: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredPrecision {
    Fp16,
    Fp32,
}

impl DeclaredPrecision {
    pub fn from_onnx_elem_type(code: i32) -> Option<Self> {
        match code {
            ONNX_FLOAT => Some(DeclaredPrecision::Fp32),
            ONNX_FLOAT16 => Some(DeclaredPrecision::Fp16),
            _ => None,
        }
    }

    pub fn tensor_precision(&self) -> TensorPrecision {
        match self {
            DeclaredPrecision::Fp16 => TensorPrecision::Fp16,
            DeclaredPrecision::Fp32 => TensorPrecision::Fp32,
        }
    }
}

/// Reads the element type of a model artifact's first input.
pub trait PrecisionInspector {
    fn element_type(&self, path: &Path) -> anyhow::Result<i32>;
}

/// Which model the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelIdentity {
    BuiltIn {
        family: ModelFamily,
        variant: i32,
    },
    Custom {
        path: String,
        /// Optimisation shape for dynamic engines, defaults to `res_max`.
        res_opt: Option<Size>,
        /// Largest shape a dynamic engine is built for.
        res_max: Option<Size>,
    },
}

impl ModelIdentity {
    pub fn family(&self) -> ModelFamily {
        match self {
            ModelIdentity::BuiltIn { family, .. } => *family,
            ModelIdentity::Custom { .. } => ModelFamily::Custom,
        }
    }
}

/// Everything the pipeline needs to know about one resolved model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDescriptor {
    pub family: ModelFamily,
    pub variant: Option<i32>,
    pub precision: DeclaredPrecision,
    #[serde(serialize_with = "serialize_tile")]
    pub tile: NonZeroU32,
    /// Dynamic engine rectangle. `max_size` is `None` when unbounded.
    pub min_size: Size,
    pub max_size: Option<Size>,
    #[serde(skip)]
    pub channels: ChannelLayout,
    pub output_scale: Option<u32>,
    pub path: PathBuf,
    pub ensemble: bool,
    pub limits: ResolutionLimits,
    #[serde(skip)]
    pub shape_source: ShapeSource,
    pub force_full_scale: bool,
    pub supports_half_scale: bool,
    /// Frames are padded to `tile` and the working scale may drop below 1.
    /// Off when the artifact aligns internally.
    pub host_alignment: bool,
}

fn serialize_tile<S: serde::Serializer>(tile: &NonZeroU32, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u32(tile.get())
}

impl ModelDescriptor {
    pub fn from_entry(
        family: ModelFamily,
        entry: &CatalogEntry,
        path: PathBuf,
        precision: DeclaredPrecision,
        ensemble: bool,
    ) -> Self {
        let (min_size, max_size) = family.dynamic_range();
        Self {
            family,
            variant: Some(entry.variant),
            precision,
            tile: NonZeroU32::new(entry.tile).unwrap_or(NonZeroU32::MIN),
            min_size,
            max_size,
            channels: entry.channels,
            output_scale: family.output_scale(),
            path,
            ensemble,
            limits: family.limits(),
            shape_source: family.shape_source(),
            force_full_scale: entry.force_full_scale,
            supports_half_scale: family.supports_half_scale(),
            host_alignment: true,
        }
    }

    pub fn custom(
        path: PathBuf,
        precision: DeclaredPrecision,
        res_opt: Option<Size>,
        res_max: Option<Size>,
    ) -> Self {
        let family = ModelFamily::Custom;
        let (min_size, _) = family.dynamic_range();
        let shape_source = match res_max {
            Some(max) => ShapeSource::Caller {
                opt: res_opt.unwrap_or(max),
                max,
            },
            None => ShapeSource::Fixed,
        };
        Self {
            family,
            variant: None,
            precision,
            tile: NonZeroU32::MIN,
            min_size,
            max_size: res_max,
            channels: ChannelLayout::Rgb,
            output_scale: family.output_scale(),
            path,
            ensemble: false,
            limits: family.limits(),
            shape_source,
            force_full_scale: false,
            supports_half_scale: family.supports_half_scale(),
            host_alignment: true,
        }
    }

    /// Self-aligning builds of the full-scale variants only ship as static engines.
    pub fn requires_static_engine(&self) -> bool {
        !self.host_alignment && self.force_full_scale
    }

    /// Tile the host pads frames to, 1 when the model aligns internally.
    pub fn padding_tile(&self) -> u32 {
        if self.host_alignment { self.tile.get() } else { 1 }
    }
}

fn first_existing(candidates: Vec<PathBuf>) -> Result<PathBuf, AdaptError> {
    match candidates.iter().find(|p| p.is_file()) {
        Some(found) => Ok(found.clone()),
        None => Err(AdaptError::ModelNotFound { candidates }),
    }
}

/// Resolve `identity` for `prefs.backend` against the artifacts under `backend_dir`.
///
/// Custom artifacts are inspected for their declared precision; built-in
/// artifacts are fp32.
pub fn resolve<P: PrecisionInspector + ?Sized>(
    identity: &ModelIdentity,
    prefs: &Preferences,
    backend_dir: &Path,
    inspector: &P,
) -> Result<ModelDescriptor, AdaptError> {
    let backend = prefs.backend;
    let family = identity.family();
    if !family.supports(backend) {
        return Err(AdaptError::invalid(
            "backend",
            format!("{family} models are not available on {backend}"),
        ));
    }

    let models = backend_dir.join("models");

    let descriptor = match identity {
        ModelIdentity::BuiltIn { family, variant } => {
            let entry = family.lookup(*variant).ok_or_else(|| {
                AdaptError::invalid("variant", format!("{family} has no variant {variant}"))
            })?;

            let host_alignment = family.host_alignment(backend, prefs.turbo);
            let ensemble = if prefs.ensemble && prefs.turbo {
                tracing::debug!(family = %family, "Turbo mode runs without the ensemble");
                false
            } else {
                prefs.ensemble
            };

            let use_ensemble = match (ensemble, entry.ensemble_file) {
                (true, Some(_)) => true,
                (true, None) => {
                    tracing::debug!(
                        family = %family,
                        variant,
                        "No ensemble artifact for this variant, using the plain model"
                    );
                    false
                }
                (false, _) => false,
            };
            let file = match entry.ensemble_file {
                Some(ensemble_file) if use_ensemble => ensemble_file,
                _ => entry.file,
            };

            let dir = models.join(family.directory(host_alignment));
            let path = first_existing(vec![dir.join(format!("{file}.onnx"))])?;

            ModelDescriptor {
                host_alignment,
                ..ModelDescriptor::from_entry(
                    *family,
                    entry,
                    path,
                    DeclaredPrecision::Fp32,
                    use_ensemble,
                )
            }
        }
        ModelIdentity::Custom {
            path,
            res_opt,
            res_max,
        } => {
            if path.len() <= 5 {
                return Err(AdaptError::invalid(
                    "model_path",
                    format!("{path:?} is not a model artifact path"),
                ));
            }

            let path = first_existing(vec![models.join(path), PathBuf::from(path)])?;
            let code = inspector.element_type(&path)?;
            let precision = DeclaredPrecision::from_onnx_elem_type(code).ok_or_else(|| {
                AdaptError::UnsupportedModelPrecision {
                    path: path.clone(),
                    code,
                }
            })?;

            ModelDescriptor::custom(path, precision, *res_opt, *res_max)
        }
    };

    tracing::debug!(
        family = %descriptor.family,
        path = %descriptor.path.display(),
        precision = ?descriptor.precision,
        ensemble = descriptor.ensemble,
        host_alignment = descriptor.host_alignment,
        "Resolved model descriptor"
    );

    Ok(descriptor)
}
