//! Trailing-edge alignment padding.
//!
//! Frames are extended on the right and bottom only so the top-left origin
//! never moves. New samples replicate the nearest edge sample.

use crate::frame::{Frame, Plane};
use common::span_debug;
use std::borrow::Cow;
use std::num::NonZeroU32;

/// Border extension computed for one source size and tile granularity.
///
/// `left` and `top` are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingPlan {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub source_width: u32,
    pub source_height: u32,
}

impl PaddingPlan {
    pub fn is_empty(&self) -> bool {
        self.right == 0 && self.bottom == 0
    }

    pub fn padded_size(&self) -> (u32, u32) {
        (
            self.source_width + self.left + self.right,
            self.source_height + self.top + self.bottom,
        )
    }

    /// Plan describing the same padding after a model upscales by `factor`.
    pub fn scaled(&self, factor: u32) -> Self {
        Self {
            left: self.left * factor,
            top: self.top * factor,
            right: self.right * factor,
            bottom: self.bottom * factor,
            source_width: self.source_width * factor,
            source_height: self.source_height * factor,
        }
    }
}

fn pad_to(dim: u32, tile: u32) -> u32 {
    dim.div_ceil(tile) * tile - dim
}

pub fn plan_padding(width: u32, height: u32, tile: NonZeroU32) -> PaddingPlan {
    PaddingPlan {
        left: 0,
        top: 0,
        right: pad_to(width, tile.get()),
        bottom: pad_to(height, tile.get()),
        source_width: width,
        source_height: height,
    }
}

/// Extend `frame` by `plan`. Returns the input untouched when there is nothing to add.
///
/// # Panics
/// Panics if `frame` does not have the size the plan was computed for.
pub fn apply<'a>(frame: &'a Frame, plan: &PaddingPlan) -> Cow<'a, Frame> {
    assert_eq!(
        (frame.width(), frame.height()),
        (plan.source_width, plan.source_height),
        "padding plan was computed for a different frame size"
    );

    if plan.is_empty() {
        return Cow::Borrowed(frame);
    }

    let _s = span_debug!("pad_frame");

    let format = frame.format();
    let planes = frame
        .planes()
        .iter()
        .enumerate()
        .map(|(i, plane)| {
            let (sw, sh) = format.plane_shift(i);
            extend_plane(plane, plan.right >> sw, plan.bottom >> sh)
        })
        .collect();

    let (width, height) = plan.padded_size();
    let desc = frame.desc().with_size(width, height);
    // Plane sizes derive from the descriptor, so this cannot fail for a
    // plan whose padding is a multiple of the subsampling factor.
    let padded = Frame::from_planes(desc, planes)
        .unwrap_or_else(|e| panic!("padded frame is inconsistent: {e}"));

    Cow::Owned(padded)
}

/// Strip the trailing padding described by `plan`.
///
/// # Panics
/// Panics if `frame` is not exactly the padded size of `plan`: a mismatch means
/// the plan and the frame came from different requests.
pub fn revert(frame: Frame, plan: &PaddingPlan) -> Frame {
    assert_eq!(
        (frame.width(), frame.height()),
        plan.padded_size(),
        "frame does not match the padding plan it is reverted with"
    );

    if plan.is_empty() {
        return frame;
    }

    let _s = span_debug!("crop_frame");

    let (desc, planes) = frame.into_parts();
    let format = desc.format;
    let planes = planes
        .into_iter()
        .enumerate()
        .map(|(i, plane)| {
            let (w, h) = format.plane_size(i, plan.source_width, plan.source_height);
            crop_plane(plane, w, h)
        })
        .collect();

    let desc = desc.with_size(plan.source_width, plan.source_height);
    Frame::from_planes(desc, planes)
        .unwrap_or_else(|e| panic!("cropped frame is inconsistent: {e}"))
}

fn extend_plane(plane: &Plane, right: u32, bottom: u32) -> Plane {
    let width = (plane.width + right) as usize;
    let height = (plane.height + bottom) as usize;
    let mut data = Vec::with_capacity(width * height);

    for y in 0..plane.height {
        let row = plane.row(y);
        data.extend_from_slice(row);
        let edge = row.last().copied().unwrap_or_default();
        data.resize(data.len() + right as usize, edge);
    }

    if plane.height > 0 {
        let last_row = (plane.height as usize - 1) * width;
        for _ in 0..bottom {
            data.extend_from_within(last_row..last_row + width);
        }
    }

    Plane {
        width: width as u32,
        height: height as u32,
        data,
    }
}

fn crop_plane(plane: Plane, width: u32, height: u32) -> Plane {
    if plane.size() == (width, height) {
        return plane;
    }

    let mut data = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        data.extend_from_slice(&plane.row(y)[..width as usize]);
    }

    Plane {
        width,
        height,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;
    use crate::frame::FrameDescriptor;

    fn tile(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    /// Frame whose luma sample at (x, y) is `y * 1000 + x` and chroma is the plane index.
    fn gradient_frame(width: u32, height: u32, format: PixelFormat) -> Frame {
        let desc = FrameDescriptor::new(width, height, format);
        let planes = (0..format.num_planes())
            .map(|i| {
                let (w, h) = desc.plane_size(i);
                let data = (0..h)
                    .flat_map(|y| {
                        (0..w).map(move |x| {
                            if i == 0 {
                                (y * 1000 + x) as f32
                            } else {
                                i as f32
                            }
                        })
                    })
                    .collect();
                Plane::from_vec(w, h, data).unwrap()
            })
            .collect();
        Frame::from_planes(desc, planes).unwrap()
    }

    #[test]
    fn test_plan_padding_range_and_alignment() {
        for t in [1u32, 2, 8, 32, 64, 128] {
            for dim in [1u32, 7, 64, 100, 720, 1080, 1081, 2160] {
                let plan = plan_padding(dim, dim + 3, tile(t));
                assert!(plan.right < t && plan.bottom < t, "tile {t} dim {dim}");
                let (w, h) = plan.padded_size();
                assert_eq!(w % t, 0);
                assert_eq!(h % t, 0);
                assert_eq!((plan.left, plan.top), (0, 0));
            }
        }
    }

    #[test]
    fn test_1280x720_tile_scenarios() {
        let plan = plan_padding(1280, 720, tile(32));
        assert!(plan.is_empty(), "720 is a multiple of 32");

        let plan = plan_padding(1280, 720, tile(64));
        assert_eq!(
            (plan.left, plan.top, plan.right, plan.bottom),
            (0, 0, 0, 16),
            "736 - 720 = 16"
        );
    }

    #[test]
    fn test_apply_without_padding_borrows() {
        let frame = gradient_frame(64, 32, PixelFormat::YUV420P8);
        let plan = plan_padding(64, 32, tile(32));

        let padded = apply(&frame, &plan);
        assert!(matches!(padded, Cow::Borrowed(_)), "no-op padding must not copy");
    }

    #[test]
    fn test_apply_replicates_edges() {
        let frame = gradient_frame(6, 4, PixelFormat::GRAYS);
        let plan = plan_padding(6, 4, tile(8));
        let padded = apply(&frame, &plan);

        assert_eq!((padded.width(), padded.height()), (8, 8));
        let luma = padded.plane(0);
        // right edge repeats x = 5
        assert_eq!(luma.get(7, 0), 5.0);
        assert_eq!(luma.get(6, 2), 2005.0);
        // bottom rows repeat y = 3
        assert_eq!(luma.get(0, 7), 3000.0);
        assert_eq!(luma.get(7, 7), 3005.0);
    }

    #[test]
    fn test_apply_pads_chroma_by_subsampled_amount() {
        let frame = gradient_frame(1280, 720, PixelFormat::YUV420P10);
        let plan = plan_padding(1280, 720, tile(64));
        let padded = apply(&frame, &plan);

        assert_eq!(padded.plane(0).size(), (1280, 736));
        assert_eq!(padded.plane(1).size(), (640, 368));
        assert_eq!(padded.plane(2).get(639, 367), 2.0);
    }

    #[test]
    fn test_revert_restores_original() {
        for (w, h, t) in [(1280, 720, 64), (100, 62, 8), (30, 18, 32), (64, 64, 32)] {
            let frame = gradient_frame(w, h, PixelFormat::YUV420P8);
            let plan = plan_padding(w, h, tile(t));
            let padded = apply(&frame, &plan).into_owned();
            let restored = revert(padded, &plan);

            assert_eq!((restored.width(), restored.height()), (w, h));
            assert_eq!(restored, frame, "{w}x{h} tile {t}");
        }
    }

    #[test]
    fn test_scaled_plan_reverts_upscaled_output() {
        let plan = plan_padding(1280, 720, tile(64));
        let doubled = plan.scaled(2);

        assert_eq!(doubled.bottom, 32);
        assert_eq!(doubled.padded_size(), (2560, 1472));

        let upscaled = gradient_frame(2560, 1472, PixelFormat::GRAYS);
        let restored = revert(upscaled, &doubled);
        assert_eq!((restored.width(), restored.height()), (2560, 1440));
    }

    #[test]
    #[should_panic(expected = "does not match the padding plan")]
    fn test_revert_mismatch_panics() {
        let plan = plan_padding(1280, 720, tile(64));
        let wrong = gradient_frame(1280, 720, PixelFormat::GRAYS);
        let _ = revert(wrong, &plan);
    }
}
