//! Built-in model families and the artifacts each one ships.

use crate::backend::BackendFamily;
use crate::shape::{ShapeSource, Size};
use frame::ChannelLayout;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    ArtCnn,
    Cugan,
    Dpir,
    Rife,
    Custom,
}

/// Area ceilings for one family.
///
/// `relaxed_area` applies when the caller opts into the HD tier. `hard_area`
/// is never exceeded regardless of tier. `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolutionLimits {
    pub standard_area: Option<u64>,
    pub relaxed_area: Option<u64>,
    pub hard_area: Option<u64>,
}

impl ResolutionLimits {
    pub const UNBOUNDED: Self = Self {
        standard_area: None,
        relaxed_area: None,
        hard_area: None,
    };

    const fn tiered(standard: Size, relaxed: Size) -> Self {
        let relaxed = relaxed.width as u64 * relaxed.height as u64;
        Self {
            standard_area: Some(standard.width as u64 * standard.height as u64),
            relaxed_area: Some(relaxed),
            hard_area: Some(relaxed),
        }
    }
}

/// One shipped model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub variant: i32,
    pub file: &'static str,
    /// Ensemble artifact replacing `file` when ensembling is requested.
    pub ensemble_file: Option<&'static str>,
    pub tile: u32,
    pub channels: ChannelLayout,
    /// Working scale is pinned to 1 for this variant.
    pub force_full_scale: bool,
}

const fn entry(variant: i32, file: &'static str, tile: u32, channels: ChannelLayout) -> CatalogEntry {
    CatalogEntry {
        variant,
        file,
        ensemble_file: None,
        tile,
        channels,
        force_full_scale: false,
    }
}

const ARTCNN: &[CatalogEntry] = &[
    entry(6, "ArtCNN_R16F96", 1, ChannelLayout::Gray),
    entry(7, "ArtCNN_R8F64", 1, ChannelLayout::Gray),
    entry(8, "ArtCNN_R8F64_DS", 1, ChannelLayout::Gray),
];

const CUGAN: &[CatalogEntry] = &[
    entry(-1, "pro-no-denoise3x-up2x", 1, ChannelLayout::Rgb),
    entry(0, "pro-conservative-up2x", 1, ChannelLayout::Rgb),
    entry(3, "pro-denoise3x-up2x", 1, ChannelLayout::Rgb),
];

const DPIR: &[CatalogEntry] = &[
    entry(0, "drunet_gray", 8, ChannelLayout::Gray),
    entry(1, "drunet_color", 8, ChannelLayout::Rgb),
    entry(2, "drunet_deblocking_grayscale", 8, ChannelLayout::Gray),
    entry(3, "drunet_deblocking_color", 8, ChannelLayout::Rgb),
];

const RIFE: &[CatalogEntry] = &[
    CatalogEntry {
        ensemble_file: Some("rife_v4.6_ensemble"),
        ..entry(46, "rife_v4.6", 32, ChannelLayout::Rgb)
    },
    CatalogEntry {
        force_full_scale: true,
        ..entry(4251, "rife_v4.25_lite", 128, ChannelLayout::Rgb)
    },
    CatalogEntry {
        force_full_scale: true,
        ..entry(426, "rife_v4.26", 64, ChannelLayout::Rgb)
    },
    CatalogEntry {
        force_full_scale: true,
        ..entry(4262, "rife_v4.26_heavy", 64, ChannelLayout::Rgb)
    },
];

impl ModelFamily {
    pub const BUILT_IN: [ModelFamily; 4] = [
        ModelFamily::ArtCnn,
        ModelFamily::Cugan,
        ModelFamily::Dpir,
        ModelFamily::Rife,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::ArtCnn => "artcnn",
            ModelFamily::Cugan => "cugan",
            ModelFamily::Dpir => "dpir",
            ModelFamily::Rife => "rife",
            ModelFamily::Custom => "custom",
        }
    }

    pub fn entries(&self) -> &'static [CatalogEntry] {
        match self {
            ModelFamily::ArtCnn => ARTCNN,
            ModelFamily::Cugan => CUGAN,
            ModelFamily::Dpir => DPIR,
            ModelFamily::Rife => RIFE,
            ModelFamily::Custom => &[],
        }
    }

    pub fn lookup(&self, variant: i32) -> Option<&'static CatalogEntry> {
        self.entries().iter().find(|e| e.variant == variant)
    }

    pub fn default_variant(&self) -> Option<i32> {
        match self {
            ModelFamily::ArtCnn => Some(8),
            ModelFamily::Cugan => Some(0),
            ModelFamily::Dpir => Some(1),
            ModelFamily::Rife => Some(46),
            ModelFamily::Custom => None,
        }
    }

    /// Whether the host pads frames to the tile and picks the working scale.
    ///
    /// RIFE ships a self-aligning `rife_v2` build used in turbo mode and on
    /// backends that cannot take host alignment. Other families always align.
    pub fn host_alignment(&self, backend: BackendFamily, turbo: bool) -> bool {
        match self {
            ModelFamily::Rife => !turbo && backend.envelope().supports_host_alignment,
            _ => true,
        }
    }

    /// Directory under `<backend_dir>/models/`.
    pub fn directory(&self, host_alignment: bool) -> &'static str {
        match self {
            ModelFamily::ArtCnn => "ArtCNN",
            ModelFamily::Cugan => "cugan",
            ModelFamily::Dpir => "dpir",
            ModelFamily::Rife if host_alignment => "rife",
            ModelFamily::Rife => "rife_v2",
            ModelFamily::Custom => "",
        }
    }

    pub fn backends(&self) -> &'static [BackendFamily] {
        match self {
            ModelFamily::ArtCnn | ModelFamily::Cugan | ModelFamily::Dpir => {
                &[BackendFamily::TensorRt]
            }
            ModelFamily::Rife => &[
                BackendFamily::TensorRt,
                BackendFamily::OrtDirectMl,
                BackendFamily::OrtCoreMl,
            ],
            ModelFamily::Custom => &BackendFamily::ALL,
        }
    }

    pub fn supports(&self, backend: BackendFamily) -> bool {
        self.backends().contains(&backend)
    }

    /// Integer output scale, `None` when only the engine knows.
    pub fn output_scale(&self) -> Option<u32> {
        match self {
            ModelFamily::ArtCnn | ModelFamily::Cugan => Some(2),
            ModelFamily::Dpir | ModelFamily::Rife => Some(1),
            ModelFamily::Custom => None,
        }
    }

    pub fn limits(&self) -> ResolutionLimits {
        match self {
            ModelFamily::ArtCnn | ModelFamily::Cugan | ModelFamily::Dpir => {
                ResolutionLimits::tiered(Size::new(1280, 720), Size::new(2048, 1080))
            }
            ModelFamily::Rife => {
                ResolutionLimits::tiered(Size::new(4096, 2176), Size::new(4096, 2176))
            }
            ModelFamily::Custom => ResolutionLimits::UNBOUNDED,
        }
    }

    /// Rectangle a dynamic engine can be built for. Custom models take the
    /// maximum from the caller.
    pub fn dynamic_range(&self) -> (Size, Option<Size>) {
        match self {
            ModelFamily::ArtCnn | ModelFamily::Cugan | ModelFamily::Dpir => {
                (Size::new(64, 64), Some(Size::new(2048, 1080)))
            }
            ModelFamily::Rife => (Size::new(384, 384), Some(Size::new(4096, 2176))),
            ModelFamily::Custom => (Size::new(384, 384), None),
        }
    }

    pub fn shape_source(&self) -> ShapeSource {
        match self {
            ModelFamily::Rife => ShapeSource::TileTable,
            ModelFamily::ArtCnn | ModelFamily::Cugan | ModelFamily::Dpir => ShapeSource::Tiered,
            ModelFamily::Custom => ShapeSource::Fixed,
        }
    }

    /// Only frame interpolation can run at half the source resolution.
    pub fn supports_half_scale(&self) -> bool {
        matches!(self, ModelFamily::Rife)
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "artcnn" => Ok(ModelFamily::ArtCnn),
            "cugan" => Ok(ModelFamily::Cugan),
            "dpir" => Ok(ModelFamily::Dpir),
            "rife" => Ok(ModelFamily::Rife),
            "custom" => Ok(ModelFamily::Custom),
            other => Err(format!("unknown model family {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_variants_exist() {
        for family in ModelFamily::BUILT_IN {
            let variant = family.default_variant().unwrap();
            assert!(family.lookup(variant).is_some(), "{family} default {variant}");
        }
        assert!(ModelFamily::Custom.default_variant().is_none());
    }

    #[test]
    fn test_full_scale_override_table() {
        let pinned: Vec<i32> = ModelFamily::Rife
            .entries()
            .iter()
            .filter(|e| e.force_full_scale)
            .map(|e| e.variant)
            .collect();
        assert_eq!(pinned, [4251, 426, 4262]);

        for family in [ModelFamily::ArtCnn, ModelFamily::Cugan, ModelFamily::Dpir] {
            assert!(family.entries().iter().all(|e| !e.force_full_scale));
        }
    }

    #[test]
    fn test_only_rife_46_has_an_ensemble() {
        let with_ensemble: Vec<_> = ModelFamily::BUILT_IN
            .iter()
            .flat_map(|f| f.entries())
            .filter_map(|e| e.ensemble_file)
            .collect();
        assert_eq!(with_ensemble, ["rife_v4.6_ensemble"]);
    }

    #[test]
    fn test_backend_matrix() {
        assert!(ModelFamily::ArtCnn.supports(BackendFamily::TensorRt));
        assert!(!ModelFamily::ArtCnn.supports(BackendFamily::OrtCuda));
        assert!(ModelFamily::Rife.supports(BackendFamily::OrtCoreMl));
        assert!(!ModelFamily::Rife.supports(BackendFamily::Migraphx));
        for backend in BackendFamily::ALL {
            assert!(ModelFamily::Custom.supports(backend));
        }
    }

    #[test]
    fn test_rife_alignment_and_directory() {
        let rife = ModelFamily::Rife;
        assert!(rife.host_alignment(BackendFamily::TensorRt, false));
        assert!(!rife.host_alignment(BackendFamily::TensorRt, true));
        assert!(!rife.host_alignment(BackendFamily::OrtCoreMl, false));
        assert!(rife.host_alignment(BackendFamily::OrtDirectMl, false));

        assert_eq!(rife.directory(true), "rife");
        assert_eq!(rife.directory(false), "rife_v2");
    }

    #[test]
    fn test_other_families_always_align() {
        for family in [ModelFamily::ArtCnn, ModelFamily::Cugan, ModelFamily::Dpir] {
            for turbo in [false, true] {
                assert!(family.host_alignment(BackendFamily::TensorRt, turbo));
            }
            assert_eq!(family.directory(false), family.directory(true));
        }
    }

    #[test]
    fn test_limits_are_ordered() {
        for family in ModelFamily::BUILT_IN {
            let limits = family.limits();
            let (standard, relaxed, hard) = (
                limits.standard_area.unwrap(),
                limits.relaxed_area.unwrap(),
                limits.hard_area.unwrap(),
            );
            assert!(standard <= relaxed && relaxed <= hard, "{family}");
        }
        assert_eq!(ModelFamily::ArtCnn.limits().standard_area, Some(1280 * 720));
    }
}
