use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFamily {
    Gray,
    Rgb,
    Yuv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    Integer,
    Float,
}

/// Host pixel format: color family, sample type, bit depth and chroma subsampling.
///
/// Subsampling is expressed as log2 factors, so `YUV420` is `(1, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat {
    pub family: ColorFamily,
    pub sample: SampleType,
    pub bits: u8,
    pub subsampling_w: u8,
    pub subsampling_h: u8,
}

impl PixelFormat {
    pub const GRAY8: Self = Self::new(ColorFamily::Gray, SampleType::Integer, 8, 0, 0);
    pub const GRAY16: Self = Self::new(ColorFamily::Gray, SampleType::Integer, 16, 0, 0);
    pub const GRAYH: Self = Self::new(ColorFamily::Gray, SampleType::Float, 16, 0, 0);
    pub const GRAYS: Self = Self::new(ColorFamily::Gray, SampleType::Float, 32, 0, 0);

    pub const RGB24: Self = Self::new(ColorFamily::Rgb, SampleType::Integer, 8, 0, 0);
    pub const RGB48: Self = Self::new(ColorFamily::Rgb, SampleType::Integer, 16, 0, 0);
    pub const RGBH: Self = Self::new(ColorFamily::Rgb, SampleType::Float, 16, 0, 0);
    pub const RGBS: Self = Self::new(ColorFamily::Rgb, SampleType::Float, 32, 0, 0);

    pub const YUV420P8: Self = Self::new(ColorFamily::Yuv, SampleType::Integer, 8, 1, 1);
    pub const YUV420P10: Self = Self::new(ColorFamily::Yuv, SampleType::Integer, 10, 1, 1);
    pub const YUV422P10: Self = Self::new(ColorFamily::Yuv, SampleType::Integer, 10, 1, 0);
    pub const YUV444P8: Self = Self::new(ColorFamily::Yuv, SampleType::Integer, 8, 0, 0);
    pub const YUV444P16: Self = Self::new(ColorFamily::Yuv, SampleType::Integer, 16, 0, 0);
    pub const YUV444PH: Self = Self::new(ColorFamily::Yuv, SampleType::Float, 16, 0, 0);
    pub const YUV444PS: Self = Self::new(ColorFamily::Yuv, SampleType::Float, 32, 0, 0);

    pub const fn new(
        family: ColorFamily,
        sample: SampleType,
        bits: u8,
        subsampling_w: u8,
        subsampling_h: u8,
    ) -> Self {
        Self {
            family,
            sample,
            bits,
            subsampling_w,
            subsampling_h,
        }
    }

    /// Packed numeric identifier, stable across runs.
    pub fn id(&self) -> u32 {
        let family = match self.family {
            ColorFamily::Gray => 1u32,
            ColorFamily::Rgb => 2,
            ColorFamily::Yuv => 3,
        };
        let sample = match self.sample {
            SampleType::Integer => 0u32,
            SampleType::Float => 1,
        };
        (family << 28)
            | (sample << 24)
            | ((self.bits as u32) << 16)
            | ((self.subsampling_w as u32) << 8)
            | self.subsampling_h as u32
    }

    pub fn num_planes(&self) -> usize {
        match self.family {
            ColorFamily::Gray => 1,
            ColorFamily::Rgb | ColorFamily::Yuv => 3,
        }
    }

    pub fn is_float(&self) -> bool {
        self.sample == SampleType::Float
    }

    /// Dimensions of `plane` for a frame of `width` x `height`.
    pub fn plane_size(&self, plane: usize, width: u32, height: u32) -> (u32, u32) {
        if plane == 0 || self.family != ColorFamily::Yuv {
            (width, height)
        } else {
            (width >> self.subsampling_w, height >> self.subsampling_h)
        }
    }

    /// Right/bottom shift applied to a padding amount on `plane`.
    pub fn plane_shift(&self, plane: usize) -> (u32, u32) {
        if plane == 0 || self.family != ColorFamily::Yuv {
            (0, 0)
        } else {
            (self.subsampling_w as u32, self.subsampling_h as u32)
        }
    }

    /// True when `width` x `height` divides evenly by the chroma subsampling.
    pub fn accepts_size(&self, width: u32, height: u32) -> bool {
        let mask_w = (1u32 << self.subsampling_w) - 1;
        let mask_h = (1u32 << self.subsampling_h) - 1;
        width & mask_w == 0 && height & mask_h == 0
    }

    /// Single-plane format carrying the first plane of `self`.
    pub fn luma(&self) -> Self {
        Self::new(ColorFamily::Gray, self.sample, self.bits, 0, 0)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let float_suffix = match (self.sample, self.bits) {
            (SampleType::Float, 16) => Some("H"),
            (SampleType::Float, 32) => Some("S"),
            _ => None,
        };

        match self.family {
            ColorFamily::Gray => match float_suffix {
                Some(s) => write!(f, "GRAY{s}"),
                None => write!(f, "GRAY{}", self.bits),
            },
            ColorFamily::Rgb => match float_suffix {
                Some(s) => write!(f, "RGB{s}"),
                None => write!(f, "RGB{}", self.bits as u32 * 3),
            },
            ColorFamily::Yuv => {
                let layout = match (self.subsampling_w, self.subsampling_h) {
                    (0, 0) => "444",
                    (1, 0) => "422",
                    (1, 1) => "420",
                    (2, 0) => "411",
                    (2, 2) => "410",
                    _ => "",
                };
                if layout.is_empty() {
                    write!(f, "YUVss{}{}", self.subsampling_w, self.subsampling_h)?;
                } else {
                    write!(f, "YUV{layout}")?;
                }
                match float_suffix {
                    Some(s) => write!(f, "P{s}"),
                    None => write!(f, "P{}", self.bits),
                }
            }
        }
    }
}
