//! Deterministic stand-in for the host resampler.
//!
//! Integer samples are normalized by `2^bits - 1`, chroma is upsampled by
//! sample repetition and downsampled by taking the top-left sample, and
//! YUV/RGB planes are passed through unchanged. This is exact for same-size
//! round trips, which is all the adaptation layer relies on.

use crate::bridge::{ResampleRequest, Resampler};
use crate::format::{ColorFamily, PixelFormat};
use crate::frame::{Frame, FrameDescriptor, Plane};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct RecordingResampler {
    requests: Mutex<Vec<ResampleRequest>>,
}

impl RecordingResampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request seen so far, in call order.
    pub fn requests(&self) -> Vec<ResampleRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

fn peak(format: PixelFormat) -> f32 {
    if format.is_float() {
        1.0
    } else {
        ((1u32 << format.bits) - 1) as f32
    }
}

fn upsample(plane: &Plane, width: u32, height: u32) -> Vec<f32> {
    let (fx, fy) = (width / plane.width.max(1), height / plane.height.max(1));
    (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| plane.get(x / fx.max(1), y / fy.max(1)))
        .collect()
}

fn downsample(data: &[f32], size: (u32, u32), target: (u32, u32)) -> Vec<f32> {
    let (fx, fy) = (size.0 / target.0.max(1), size.1 / target.1.max(1));
    (0..target.1)
        .flat_map(|y| (0..target.0).map(move |x| (x, y)))
        .map(|(x, y)| data[(y * fy * size.0 + x * fx) as usize])
        .collect()
}

impl Resampler for RecordingResampler {
    fn convert(&self, frame: &Frame, request: &ResampleRequest) -> anyhow::Result<Frame> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(*request);

        if (frame.width(), frame.height()) != (request.width, request.height) {
            anyhow::bail!("RecordingResampler does not resize");
        }

        let (w, h) = (request.width, request.height);
        let src = frame.format();
        let dst = request.format;
        let in_peak = peak(src);

        let mut full: Vec<Vec<f32>> = frame
            .planes()
            .iter()
            .map(|p| upsample(p, w, h).into_iter().map(|v| v / in_peak).collect())
            .collect();

        full = match (src.family, dst.family) {
            (a, b) if a == b => full,
            (ColorFamily::Gray, _) => vec![full[0].clone(); 3],
            (_, ColorFamily::Gray) => vec![full.swap_remove(0)],
            _ => full,
        };

        let out_peak = peak(dst);
        let planes = full
            .iter()
            .enumerate()
            .map(|(i, data)| {
                let size = dst.plane_size(i, w, h);
                let samples = downsample(data, (w, h), size)
                    .into_iter()
                    .map(|v| {
                        let v = v * out_peak;
                        if dst.is_float() { v } else { v.round() }
                    })
                    .collect();
                Plane::from_vec(size.0, size.1, samples)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let desc = FrameDescriptor::new(w, h, dst).with_range(request.range_out);
        Ok(Frame::from_planes(desc, planes)?)
    }
}
