use crate::frame::Plane;
use common::span_debug;
use half::f16;
use half::slice::HalfFloatSliceExt;
use ndarray::{ArrayD, IxDyn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorPrecision {
    Fp16,
    Fp32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    Gray,
    Rgb,
}

impl ChannelLayout {
    pub fn channels(&self) -> usize {
        match self {
            ChannelLayout::Gray => 1,
            ChannelLayout::Rgb => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(ArrayD<f32>),
    F16(ArrayD<f16>),
}

/// Planar `[1, C, H, W]` tensor exchanged with an inference engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorFrame {
    data: TensorData,
}

impl TensorFrame {
    /// Wrap engine output. The array must be `[1, C, H, W]`.
    pub fn from_data(data: TensorData) -> anyhow::Result<Self> {
        let shape = match &data {
            TensorData::F32(a) => a.shape().to_vec(),
            TensorData::F16(a) => a.shape().to_vec(),
        };
        if shape.len() != 4 || shape[0] != 1 {
            anyhow::bail!("expected a [1, C, H, W] tensor, got {:?}", shape);
        }
        Ok(Self { data })
    }

    /// Stack equally sized planes into one tensor.
    pub fn from_planes(planes: &[Plane], precision: TensorPrecision) -> anyhow::Result<Self> {
        let _s = span_debug!("planes_to_tensor");

        let Some(first) = planes.first() else {
            anyhow::bail!("cannot build a tensor from zero planes");
        };
        if let Some(odd) = planes.iter().find(|p| p.size() != first.size()) {
            anyhow::bail!(
                "plane size mismatch: {:?} vs {:?}",
                odd.size(),
                first.size()
            );
        }

        let (w, h) = (first.width as usize, first.height as usize);
        let spatial = w * h;
        let shape = IxDyn(&[1, planes.len(), h, w]);

        let data = match precision {
            TensorPrecision::Fp32 => {
                let mut out = Vec::with_capacity(planes.len() * spatial);
                for plane in planes {
                    out.extend_from_slice(&plane.data);
                }
                TensorData::F32(ArrayD::from_shape_vec(shape, out)?)
            }
            TensorPrecision::Fp16 => {
                let mut out = vec![f16::ZERO; planes.len() * spatial];
                for (chunk, plane) in out.chunks_exact_mut(spatial).zip(planes) {
                    chunk.convert_from_f32_slice(&plane.data);
                }
                TensorData::F16(ArrayD::from_shape_vec(shape, out)?)
            }
        };

        Ok(Self { data })
    }

    /// Split back into `f32` planes, one per channel.
    pub fn to_planes(&self) -> Vec<Plane> {
        let _s = span_debug!("tensor_to_planes");

        let (w, h) = (self.width(), self.height());
        let spatial = w as usize * h as usize;

        let flat: Vec<f32> = match &self.data {
            TensorData::F32(a) => a.iter().copied().collect(),
            TensorData::F16(a) => {
                let halves: Vec<f16> = a.iter().copied().collect();
                let mut out = vec![0.0f32; halves.len()];
                halves.convert_to_f32_slice(&mut out);
                out
            }
        };

        flat.chunks_exact(spatial.max(1))
            .map(|chunk| Plane {
                width: w,
                height: h,
                data: chunk.to_vec(),
            })
            .collect()
    }

    /// 2x2 box downsample. Both spatial dimensions must be even.
    pub fn halved(&self) -> anyhow::Result<Self> {
        let _s = span_debug!("tensor_halved");

        let (w, h) = (self.width(), self.height());
        if w % 2 != 0 || h % 2 != 0 {
            anyhow::bail!("cannot halve a {}x{} tensor", w, h);
        }
        let (hw, hh) = (w / 2, h / 2);

        let planes: Vec<Plane> = self
            .to_planes()
            .iter()
            .map(|plane| {
                let stride = w as usize;
                let mut data = Vec::with_capacity(hw as usize * hh as usize);
                for y in 0..hh as usize {
                    let top = 2 * y * stride;
                    let bottom = top + stride;
                    for x in 0..hw as usize {
                        let sum = plane.data[top + 2 * x]
                            + plane.data[top + 2 * x + 1]
                            + plane.data[bottom + 2 * x]
                            + plane.data[bottom + 2 * x + 1];
                        data.push(sum * 0.25);
                    }
                }
                Plane {
                    width: hw,
                    height: hh,
                    data,
                }
            })
            .collect();

        Self::from_planes(&planes, self.precision())
    }

    /// Nearest-neighbour 2x upsample, the inverse extent of [`halved`](Self::halved).
    pub fn doubled(&self) -> anyhow::Result<Self> {
        let _s = span_debug!("tensor_doubled");

        let (w, h) = (self.width() as usize, self.height() as usize);
        let planes: Vec<Plane> = self
            .to_planes()
            .iter()
            .map(|plane| {
                let mut data = Vec::with_capacity(4 * w * h);
                for row in plane.data.chunks_exact(w.max(1)) {
                    let wide: Vec<f32> = row.iter().flat_map(|&v| [v, v]).collect();
                    data.extend_from_slice(&wide);
                    data.extend_from_slice(&wide);
                }
                Plane {
                    width: 2 * w as u32,
                    height: 2 * h as u32,
                    data,
                }
            })
            .collect();

        Self::from_planes(&planes, self.precision())
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    pub fn shape(&self) -> &[usize] {
        match &self.data {
            TensorData::F32(a) => a.shape(),
            TensorData::F16(a) => a.shape(),
        }
    }

    pub fn precision(&self) -> TensorPrecision {
        match self.data {
            TensorData::F32(_) => TensorPrecision::Fp32,
            TensorData::F16(_) => TensorPrecision::Fp16,
        }
    }

    pub fn channels(&self) -> usize {
        self.shape()[1]
    }

    pub fn height(&self) -> u32 {
        self.shape()[2] as u32
    }

    pub fn width(&self) -> u32 {
        self.shape()[3] as u32
    }
}
