use crate::color::{ColorMatrix, ColorRange};
use crate::format::{ColorFamily, PixelFormat};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("{format} expects {expected} planes, got {actual}")]
    PlaneCount {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    #[error("plane {plane} is {actual:?}, expected {expected:?}")]
    PlaneSize {
        plane: usize,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("plane data holds {actual} samples, expected {expected}")]
    DataLength { expected: usize, actual: usize },

    #[error("{width}x{height} is not divisible by the subsampling of {format}")]
    Subsampling {
        width: u32,
        height: u32,
        format: PixelFormat,
    },
}

/// Everything the adaptation layer reads from an incoming frame without touching samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub range: ColorRange,
    pub matrix: ColorMatrix,
}

impl FrameDescriptor {
    /// Descriptor with the host defaults: RGB is full range, everything else limited;
    /// YUV is tagged BT.709, other families carry no matrix.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let (range, matrix) = match format.family {
            ColorFamily::Rgb => (ColorRange::Full, ColorMatrix::RGB),
            ColorFamily::Yuv => (ColorRange::Limited, ColorMatrix::BT709),
            ColorFamily::Gray => (ColorRange::Limited, ColorMatrix::UNSPECIFIED),
        };
        Self {
            width,
            height,
            format,
            range,
            matrix,
        }
    }

    pub fn with_range(mut self, range: ColorRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_matrix(mut self, matrix: ColorMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn plane_size(&self, plane: usize) -> (u32, u32) {
        self.format.plane_size(plane, self.width, self.height)
    }
}

/// One plane of samples, row-major, no stride padding.
///
/// Integer formats store integer-valued samples; half-float formats store
/// their values widened to `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl Plane {
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0.0)
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn from_vec(width: u32, height: u32, data: Vec<f32>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(FrameError::DataLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn row(&self, y: u32) -> &[f32] {
        let start = y as usize * self.width as usize;
        &self.data[start..start + self.width as usize]
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    desc: FrameDescriptor,
    planes: Vec<Plane>,
}

impl Frame {
    /// Zero-filled frame matching `desc`.
    pub fn new(desc: FrameDescriptor) -> Result<Self, FrameError> {
        check_subsampling(&desc)?;
        let planes = (0..desc.format.num_planes())
            .map(|i| {
                let (w, h) = desc.plane_size(i);
                Plane::new(w, h)
            })
            .collect();
        Ok(Self { desc, planes })
    }

    pub fn from_planes(desc: FrameDescriptor, planes: Vec<Plane>) -> Result<Self, FrameError> {
        check_subsampling(&desc)?;

        let expected = desc.format.num_planes();
        if planes.len() != expected {
            return Err(FrameError::PlaneCount {
                format: desc.format,
                expected,
                actual: planes.len(),
            });
        }

        for (i, plane) in planes.iter().enumerate() {
            let expected = desc.plane_size(i);
            if plane.size() != expected {
                return Err(FrameError::PlaneSize {
                    plane: i,
                    expected,
                    actual: plane.size(),
                });
            }
        }

        Ok(Self { desc, planes })
    }

    pub fn desc(&self) -> &FrameDescriptor {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn format(&self) -> PixelFormat {
        self.desc.format
    }

    pub fn plane(&self, index: usize) -> &Plane {
        &self.planes[index]
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn into_planes(self) -> Vec<Plane> {
        self.planes
    }

    pub(crate) fn into_parts(self) -> (FrameDescriptor, Vec<Plane>) {
        (self.desc, self.planes)
    }
}

fn check_subsampling(desc: &FrameDescriptor) -> Result<(), FrameError> {
    if desc.format.accepts_size(desc.width, desc.height) {
        Ok(())
    } else {
        Err(FrameError::Subsampling {
            width: desc.width,
            height: desc.height,
            format: desc.format,
        })
    }
}
