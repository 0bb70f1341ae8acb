//! Working-scale policy and engine shape negotiation.

use crate::admission::{EngineMode, ResolutionTier};
use crate::error::AdaptError;
use crate::model::ModelDescriptor;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Area above which static engines halve the working scale and tile tables
/// switch to their larger maximum.
pub const SCALE_THRESHOLD_AREA: u64 = 2048 * 1088;

/// Smallest optimisation profile accepted for tiered and caller-shaped models.
pub const PROFILE_MIN: Size = Size::new(384, 384);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn fits_within(&self, other: Size) -> bool {
        self.width <= other.width && self.height <= other.height
    }

    pub fn max(self, other: Size) -> Size {
        Size::new(self.width.max(other.width), self.height.max(other.height))
    }

    pub fn min(self, other: Size) -> Size {
        Size::new(self.width.min(other.width), self.height.min(other.height))
    }

    fn times(self, factor: u32) -> Size {
        Size::new(self.width * factor, self.height * factor)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X', ','])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid dimension {v:?}: {e}"))
        };
        Ok(Size::new(parse(w)?, parse(h)?))
    }
}

/// Internal resolution the model works at, relative to the padded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkingScale {
    Full,
    Half,
}

impl WorkingScale {
    pub fn factor(&self) -> f32 {
        match self {
            WorkingScale::Full => 1.0,
            WorkingScale::Half => 0.5,
        }
    }

    /// Alignment multiplier: a halved model needs twice the tile in source pixels.
    pub fn tile_multiplier(&self) -> u32 {
        match self {
            WorkingScale::Full => 1,
            WorkingScale::Half => 2,
        }
    }

    /// Extent the model itself sees for a padded frame of `size`.
    pub fn model_size(&self, size: Size) -> Size {
        let m = self.tile_multiplier();
        Size::new(size.width / m, size.height / m)
    }
}

/// Choose the working scale before any padding or shape is computed.
///
/// Family overrides win, as does a model that aligns internally. Then a
/// dynamic engine keeps full scale (its rectangle was already enforced at
/// admission), then large static frames are halved.
pub fn working_scale(source_area: u64, model: &ModelDescriptor, mode: EngineMode) -> WorkingScale {
    if model.force_full_scale || !model.supports_half_scale || !model.host_alignment {
        return WorkingScale::Full;
    }
    match mode {
        EngineMode::Dynamic => WorkingScale::Full,
        EngineMode::Static if source_area > SCALE_THRESHOLD_AREA => WorkingScale::Half,
        EngineMode::Static => WorkingScale::Full,
    }
}

/// Tile multiples `(min, opt, max above threshold, max at or below threshold)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileMultiples {
    pub min: Size,
    pub opt: Size,
    pub max_high: Size,
    pub max_standard: Size,
}

const TILE_TABLE: [(u32, TileMultiples); 3] = [
    (
        32,
        TileMultiples {
            min: Size::new(10, 8),
            opt: Size::new(60, 34),
            max_high: Size::new(128, 68),
            max_standard: Size::new(64, 34),
        },
    ),
    (
        64,
        TileMultiples {
            min: Size::new(5, 4),
            opt: Size::new(30, 17),
            max_high: Size::new(64, 34),
            max_standard: Size::new(32, 17),
        },
    ),
    (
        128,
        TileMultiples {
            min: Size::new(3, 2),
            opt: Size::new(15, 9),
            max_high: Size::new(32, 17),
            max_standard: Size::new(16, 9),
        },
    ),
];

pub fn tile_multiples(tile: u32) -> Option<&'static TileMultiples> {
    TILE_TABLE
        .iter()
        .find(|(t, _)| *t == tile)
        .map(|(_, multiples)| multiples)
}

/// Where a model's dynamic profile comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeSource {
    /// Tile-indexed multiples (frame interpolation models).
    TileTable,
    /// Fixed standard/HD tiers (upscalers, denoisers).
    Tiered,
    /// Caller-provided optimum and maximum (custom models).
    Caller { opt: Size, max: Size },
    /// No dynamic profile is known; only static engines can be built.
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ShapePlan {
    Static { shape: Size },
    Dynamic { min: Size, opt: Size, max: Size },
}

impl ShapePlan {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, ShapePlan::Dynamic { .. })
    }

    /// Largest shape the engine will be asked to run.
    pub fn max_shape(&self) -> Size {
        match *self {
            ShapePlan::Static { shape } => shape,
            ShapePlan::Dynamic { max, .. } => max,
        }
    }
}

/// Inputs to [`negotiate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeRequest {
    pub source: Size,
    /// Size after tile padding.
    pub padded: Size,
    /// Tile granularity after applying the working scale.
    pub tile: u32,
    pub mode: EngineMode,
    pub tier: ResolutionTier,
}

pub fn negotiate(request: &ShapeRequest, model: &ModelDescriptor) -> Result<ShapePlan, AdaptError> {
    let padded = request.padded;

    if request.mode == EngineMode::Static {
        return Ok(ShapePlan::Static { shape: padded });
    }

    let plan = match model.shape_source {
        ShapeSource::TileTable => {
            let multiples = tile_multiples(request.tile).ok_or_else(|| {
                AdaptError::invalid(
                    "tile",
                    format!("no dynamic shape table for tile {}", request.tile),
                )
            })?;
            let tile = request.tile;
            let max_standard = multiples.max_standard.times(tile);
            let max = if request.source.area() > SCALE_THRESHOLD_AREA
                || !padded.fits_within(max_standard)
            {
                multiples.max_high.times(tile)
            } else {
                max_standard
            };
            ShapePlan::Dynamic {
                min: multiples.min.times(tile).min(padded),
                opt: multiples.opt.times(tile).max(padded).min(max),
                max,
            }
        }
        ShapeSource::Tiered => {
            let (opt, max) = match request.tier {
                ResolutionTier::Relaxed => (Size::new(1920, 1080), Size::new(2048, 1080)),
                ResolutionTier::Standard => (Size::new(1280, 720), Size::new(1280, 720)),
            };
            let max = max.max(padded);
            ShapePlan::Dynamic {
                min: PROFILE_MIN.min(padded),
                opt: opt.max(padded).min(max),
                max,
            }
        }
        ShapeSource::Fixed => {
            return Err(AdaptError::invalid(
                "res_max",
                "dynamic engines need a maximum resolution",
            ));
        }
        ShapeSource::Caller { opt, max } => {
            let min = PROFILE_MIN.min(padded);
            ShapePlan::Dynamic {
                min,
                opt: opt.max(min).min(max),
                max,
            }
        }
    };

    if let ShapePlan::Dynamic { max, .. } = plan
        && !padded.fits_within(max)
    {
        return Err(AdaptError::DynamicShapeUnsupported {
            size: padded,
            min: PROFILE_MIN,
            max,
        });
    }

    tracing::debug!(plan = ?plan, padded = %padded, "Negotiated engine shapes");
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelFamily;
    use crate::model::tests::descriptor;

    fn dynamic(source: Size, padded: Size, tile: u32, tier: ResolutionTier) -> ShapeRequest {
        ShapeRequest {
            source,
            padded,
            tile,
            mode: EngineMode::Dynamic,
            tier,
        }
    }

    #[test]
    fn test_static_mode_locks_padded_shape() {
        let model = descriptor(ModelFamily::Rife, 46);
        let request = ShapeRequest {
            mode: EngineMode::Static,
            ..dynamic(
                Size::new(1280, 720),
                Size::new(1280, 768),
                64,
                ResolutionTier::Standard,
            )
        };
        assert_eq!(
            negotiate(&request, &model).unwrap(),
            ShapePlan::Static {
                shape: Size::new(1280, 768)
            }
        );
    }

    #[test]
    fn test_tile_table_below_threshold() {
        let model = descriptor(ModelFamily::Rife, 46);
        let request = dynamic(
            Size::new(1920, 1080),
            Size::new(1920, 1088),
            32,
            ResolutionTier::Standard,
        );
        assert_eq!(
            negotiate(&request, &model).unwrap(),
            ShapePlan::Dynamic {
                min: Size::new(320, 256),
                opt: Size::new(1920, 1088),
                max: Size::new(2048, 1088),
            }
        );
    }

    #[test]
    fn test_tile_table_above_threshold_uses_high_max() {
        let model = descriptor(ModelFamily::Rife, 426);
        let request = dynamic(
            Size::new(3840, 2160),
            Size::new(3840, 2176),
            64,
            ResolutionTier::Standard,
        );
        let ShapePlan::Dynamic { opt, max, .. } = negotiate(&request, &model).unwrap() else {
            panic!("expected a dynamic plan");
        };
        assert_eq!(max, Size::new(4096, 2176));
        assert!(Size::new(3840, 2176).fits_within(opt));
    }

    #[test]
    fn test_opt_covers_padded_size_below_threshold() {
        let model = descriptor(ModelFamily::Rife, 4251);
        for (w, h) in [(640, 480), (1280, 720), (1920, 800), (2048, 1080)] {
            let source = Size::new(w, h);
            let padded = Size::new(w.div_ceil(128) * 128, h.div_ceil(128) * 128);
            let ShapePlan::Dynamic { min, opt, max } =
                negotiate(&dynamic(source, padded, 128, ResolutionTier::Standard), &model).unwrap()
            else {
                panic!("expected a dynamic plan");
            };
            assert!(padded.fits_within(opt), "{source}: opt {opt} < padded {padded}");
            assert!(min.fits_within(padded) && opt.fits_within(max));
        }
    }

    #[test]
    fn test_tiered_profiles() {
        let model = descriptor(ModelFamily::ArtCnn, 8);
        let source = Size::new(1280, 720);

        let standard =
            negotiate(&dynamic(source, source, 1, ResolutionTier::Standard), &model).unwrap();
        assert_eq!(
            standard,
            ShapePlan::Dynamic {
                min: Size::new(384, 384),
                opt: Size::new(1280, 720),
                max: Size::new(1280, 720),
            }
        );

        let relaxed =
            negotiate(&dynamic(source, source, 1, ResolutionTier::Relaxed), &model).unwrap();
        assert_eq!(
            relaxed,
            ShapePlan::Dynamic {
                min: Size::new(384, 384),
                opt: Size::new(1920, 1080),
                max: Size::new(2048, 1080),
            }
        );
    }

    #[test]
    fn test_tiered_min_narrows_for_small_frames() {
        let model = descriptor(ModelFamily::Dpir, 1);
        let source = Size::new(128, 64);
        let ShapePlan::Dynamic { min, .. } =
            negotiate(&dynamic(source, source, 8, ResolutionTier::Standard), &model).unwrap()
        else {
            panic!("expected a dynamic plan");
        };
        assert_eq!(min, Size::new(128, 64));
    }

    #[test]
    fn test_unknown_tile_rejected() {
        let model = descriptor(ModelFamily::Rife, 46);
        let request = dynamic(
            Size::new(1280, 720),
            Size::new(1280, 768),
            256,
            ResolutionTier::Standard,
        );
        assert!(matches!(
            negotiate(&request, &model),
            Err(AdaptError::InvalidParameter { param: "tile", .. })
        ));
    }

    #[test]
    fn test_scale_policy() {
        let rife46 = descriptor(ModelFamily::Rife, 46);
        let rife426 = descriptor(ModelFamily::Rife, 426);
        let uhd = 3840 * 2160;
        let hd = 1920 * 1080;

        assert_eq!(working_scale(uhd, &rife46, EngineMode::Static), WorkingScale::Half);
        assert_eq!(working_scale(hd, &rife46, EngineMode::Static), WorkingScale::Full);
        assert_eq!(
            working_scale(uhd, &rife46, EngineMode::Dynamic),
            WorkingScale::Full,
            "the dynamic rectangle governs, not the area"
        );
        assert_eq!(
            working_scale(uhd, &rife426, EngineMode::Static),
            WorkingScale::Full,
            "family override beats the halving rule"
        );

        let artcnn = descriptor(ModelFamily::ArtCnn, 8);
        assert_eq!(working_scale(uhd, &artcnn, EngineMode::Static), WorkingScale::Full);

        let self_aligning = ModelDescriptor {
            host_alignment: false,
            ..rife46
        };
        assert_eq!(
            working_scale(uhd, &self_aligning, EngineMode::Static),
            WorkingScale::Full
        );
    }

    #[test]
    fn test_model_size_at_half_scale() {
        let padded = Size::new(3840, 2176);
        assert_eq!(WorkingScale::Full.model_size(padded), padded);
        assert_eq!(WorkingScale::Half.model_size(padded), Size::new(1920, 1088));
    }

    #[test]
    fn test_size_parsing() {
        assert_eq!("1920x1080".parse::<Size>().unwrap(), Size::new(1920, 1080));
        assert_eq!("640,480".parse::<Size>().unwrap(), Size::new(640, 480));
        assert!("1920".parse::<Size>().is_err());
        assert!("axb".parse::<Size>().is_err());
    }
}
