//! Conversion between host frames and planar inference tensors.
//!
//! The colorspace math belongs to a host-supplied [`Resampler`]; this module
//! decides what to ask it for. Matrix and range are always passed explicitly
//! so that the outbound leg exactly mirrors the inbound one.

use crate::color::ColorRange;
use crate::format::{ColorFamily, PixelFormat};
use crate::frame::{Frame, FrameDescriptor, Plane};
use crate::resize::resize_plane;
use crate::tensor::{ChannelLayout, TensorFrame, TensorPrecision};
use common::span_debug;
use std::borrow::Cow;

/// Parameters for one resampler call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResampleRequest {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Matrix used for any YUV <-> RGB step.
    pub matrix: &'static str,
    pub range_in: ColorRange,
    pub range_out: ColorRange,
}

/// Host pixel-format converter. Must be deterministic and lossless for
/// same-size conversions.
pub trait Resampler {
    fn convert(&self, frame: &Frame, request: &ResampleRequest) -> anyhow::Result<Frame>;
}

/// What [`from_tensor_layout`] needs to restore the host representation.
#[derive(Debug, Clone)]
pub struct LayoutMetadata {
    pub source: FrameDescriptor,
    pub matrix: &'static str,
    pub range: ColorRange,
    pub channels: ChannelLayout,
    pub precision: TensorPrecision,
    /// Unprocessed planes 1.. of the source, kept for gray models.
    chroma: Vec<Plane>,
}

impl LayoutMetadata {
    pub fn chroma(&self) -> &[Plane] {
        &self.chroma
    }
}

fn tensor_format(channels: ChannelLayout, precision: TensorPrecision) -> PixelFormat {
    match (channels, precision) {
        (ChannelLayout::Gray, TensorPrecision::Fp16) => PixelFormat::GRAYH,
        (ChannelLayout::Gray, TensorPrecision::Fp32) => PixelFormat::GRAYS,
        (ChannelLayout::Rgb, TensorPrecision::Fp16) => PixelFormat::RGBH,
        (ChannelLayout::Rgb, TensorPrecision::Fp32) => PixelFormat::RGBS,
    }
}

fn stage<'a, R: Resampler + ?Sized>(
    frame: Cow<'a, Frame>,
    request: &ResampleRequest,
    resampler: &R,
) -> anyhow::Result<Cow<'a, Frame>> {
    let desc = frame.desc();
    let unchanged = desc.format == request.format
        && (desc.width, desc.height) == (request.width, request.height)
        && request.range_in == request.range_out;

    if unchanged {
        Ok(frame)
    } else {
        Ok(Cow::Owned(resampler.convert(&frame, request)?))
    }
}

/// Convert a host frame into a `[1, C, H, W]` tensor.
///
/// RGB tensors are full range. Gray tensors carry only the first plane and
/// keep the source range; the remaining planes travel in the metadata.
pub fn to_tensor_layout<R: Resampler + ?Sized>(
    frame: &Frame,
    channels: ChannelLayout,
    precision: TensorPrecision,
    resampler: &R,
) -> anyhow::Result<(TensorFrame, LayoutMetadata)> {
    let _s = span_debug!("to_tensor_layout");

    let source = *frame.desc();
    let matrix = source.matrix.name();
    let range = source.range;
    let target = tensor_format(channels, precision);

    let (staged, chroma) = match channels {
        ChannelLayout::Gray => {
            if source.format.family == ColorFamily::Rgb {
                anyhow::bail!(
                    "single-channel models need a gray or YUV source, got {}",
                    source.format
                );
            }
            let luma_desc = FrameDescriptor {
                format: source.format.luma(),
                ..source
            };
            let luma = Frame::from_planes(luma_desc, vec![frame.plane(0).clone()])?;
            let request = ResampleRequest {
                width: source.width,
                height: source.height,
                format: target,
                matrix,
                range_in: range,
                range_out: range,
            };
            let staged = stage(Cow::Owned(luma), &request, resampler)?;
            (staged, frame.planes()[1..].to_vec())
        }
        ChannelLayout::Rgb => {
            let request = ResampleRequest {
                width: source.width,
                height: source.height,
                format: target,
                matrix,
                range_in: range,
                range_out: ColorRange::Full,
            };
            (stage(Cow::Borrowed(frame), &request, resampler)?, Vec::new())
        }
    };

    let tensor = TensorFrame::from_planes(staged.planes(), precision)?;

    tracing::trace!(
        source = %source.format,
        tensor = %target,
        matrix,
        range = ?range,
        "Frame staged for inference"
    );

    Ok((
        tensor,
        LayoutMetadata {
            source,
            matrix,
            range,
            channels,
            precision,
            chroma,
        },
    ))
}

/// Restore the host representation of an inference result.
///
/// The output keeps the source format, range and matrix (unknown matrix codes
/// come back as BT.709, the matrix the conversion used). The size follows the
/// tensor, so upscaling models produce a larger frame.
pub fn from_tensor_layout<R: Resampler + ?Sized>(
    tensor: &TensorFrame,
    metadata: &LayoutMetadata,
    resampler: &R,
) -> anyhow::Result<Frame> {
    let _s = span_debug!("from_tensor_layout");

    if tensor.channels() != metadata.channels.channels() {
        anyhow::bail!(
            "engine returned {} channels, expected {}",
            tensor.channels(),
            metadata.channels.channels()
        );
    }

    let (width, height) = (tensor.width(), tensor.height());
    let source = metadata.source;
    let tensor_desc = FrameDescriptor::new(
        width,
        height,
        tensor_format(metadata.channels, tensor.precision()),
    );
    let out_desc = source
        .with_size(width, height)
        .with_range(metadata.range)
        .with_matrix(source.matrix.resolved());

    let planes = match metadata.channels {
        ChannelLayout::Gray => {
            let inferred = Frame::from_planes(
                tensor_desc.with_range(metadata.range),
                tensor.to_planes(),
            )?;
            let request = ResampleRequest {
                width,
                height,
                format: source.format.luma(),
                matrix: metadata.matrix,
                range_in: metadata.range,
                range_out: metadata.range,
            };
            let mut planes = stage(Cow::Owned(inferred), &request, resampler)?
                .into_owned()
                .into_planes();

            for (i, plane) in metadata.chroma.iter().enumerate() {
                let (w, h) = source.format.plane_size(i + 1, width, height);
                planes.push(resize_plane(plane, w, h)?);
            }
            planes
        }
        ChannelLayout::Rgb => {
            let inferred = Frame::from_planes(tensor_desc, tensor.to_planes())?;
            let request = ResampleRequest {
                width,
                height,
                format: source.format,
                matrix: metadata.matrix,
                range_in: ColorRange::Full,
                range_out: metadata.range,
            };
            stage(Cow::Owned(inferred), &request, resampler)?
                .into_owned()
                .into_planes()
        }
    };

    Ok(Frame::from_planes(out_desc, planes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{ColorMatrix, DEFAULT_MATRIX};
    use crate::testing::RecordingResampler;

    fn yuv_frame(width: u32, height: u32, matrix: ColorMatrix, range: ColorRange) -> Frame {
        let desc = FrameDescriptor::new(width, height, PixelFormat::YUV420P8)
            .with_matrix(matrix)
            .with_range(range);
        let planes = (0..3)
            .map(|i| {
                let (w, h) = desc.plane_size(i);
                let data = (0..w * h)
                    .map(|n| ((n * 7 + i as u32 * 40) % 256) as f32)
                    .collect();
                Plane::from_vec(w, h, data).unwrap()
            })
            .collect();
        Frame::from_planes(desc, planes).unwrap()
    }

    #[test]
    fn test_rgb_round_trip_preserves_metadata() {
        let resampler = RecordingResampler::new();
        for matrix in [ColorMatrix::BT709, ColorMatrix::BT470BG, ColorMatrix::BT2020_NCL] {
            for range in [ColorRange::Limited, ColorRange::Full] {
                let frame = yuv_frame(16, 8, matrix, range);
                let (tensor, meta) =
                    to_tensor_layout(&frame, ChannelLayout::Rgb, TensorPrecision::Fp32, &resampler)
                        .unwrap();
                assert_eq!(tensor.shape(), &[1, 3, 8, 16]);

                let restored = from_tensor_layout(&tensor, &meta, &resampler).unwrap();
                assert_eq!(restored.desc(), frame.desc());
                assert_eq!(restored, frame);
            }
        }
    }

    #[test]
    fn test_range_is_explicit_on_both_legs() {
        let resampler = RecordingResampler::new();
        let frame = yuv_frame(8, 8, ColorMatrix::BT709, ColorRange::Full);

        let (tensor, meta) =
            to_tensor_layout(&frame, ChannelLayout::Rgb, TensorPrecision::Fp16, &resampler).unwrap();
        from_tensor_layout(&tensor, &meta, &resampler).unwrap();

        let requests = resampler.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].format, PixelFormat::RGBH);
        assert_eq!(
            (requests[0].range_in, requests[0].range_out),
            (ColorRange::Full, ColorRange::Full)
        );
        assert_eq!(requests[1].format, PixelFormat::YUV420P8);
        assert_eq!(
            requests[1].range_out,
            ColorRange::Full,
            "a full-range source must stay full range"
        );
    }

    #[test]
    fn test_unknown_matrix_uses_709_on_both_legs() {
        let resampler = RecordingResampler::new();
        let frame = yuv_frame(8, 8, ColorMatrix(3), ColorRange::Limited);

        let (tensor, meta) =
            to_tensor_layout(&frame, ChannelLayout::Rgb, TensorPrecision::Fp32, &resampler).unwrap();
        let restored = from_tensor_layout(&tensor, &meta, &resampler).unwrap();

        assert_eq!(meta.matrix, DEFAULT_MATRIX);
        assert!(resampler.requests().iter().all(|r| r.matrix == DEFAULT_MATRIX));
        assert_eq!(restored.desc().matrix, ColorMatrix::BT709);
        assert_eq!(restored.desc().range, ColorRange::Limited);
    }

    #[test]
    fn test_gray_model_sees_only_luma() {
        let resampler = RecordingResampler::new();
        let frame = yuv_frame(16, 8, ColorMatrix::BT709, ColorRange::Limited);

        let (tensor, meta) =
            to_tensor_layout(&frame, ChannelLayout::Gray, TensorPrecision::Fp32, &resampler)
                .unwrap();

        assert_eq!(tensor.shape(), &[1, 1, 8, 16]);
        assert_eq!(meta.chroma(), &frame.planes()[1..]);

        let restored = from_tensor_layout(&tensor, &meta, &resampler).unwrap();
        assert_eq!(restored, frame);
    }

    #[test]
    fn test_gray_model_recombines_original_chroma_after_upscale() {
        let resampler = RecordingResampler::new();
        let desc = FrameDescriptor::new(16, 8, PixelFormat::YUV420P8);
        let frame = Frame::from_planes(
            desc,
            vec![
                Plane::filled(16, 8, 16.0),
                Plane::filled(8, 4, 60.0),
                Plane::filled(8, 4, 200.0),
            ],
        )
        .unwrap();
        let (_, meta) =
            to_tensor_layout(&frame, ChannelLayout::Gray, TensorPrecision::Fp32, &resampler)
                .unwrap();

        // stand-in for a 2x model: a flat luma plane twice the size
        let upscaled =
            TensorFrame::from_planes(&[Plane::filled(32, 16, 0.5)], TensorPrecision::Fp32)
                .unwrap();
        let restored = from_tensor_layout(&upscaled, &meta, &resampler).unwrap();

        assert_eq!((restored.width(), restored.height()), (32, 16));
        assert_eq!(restored.plane(1).size(), (16, 8));
        assert_eq!(restored.plane(0).get(0, 0), 128.0, "luma comes from the model");
        for (plane, expected) in [(1, 60.0f32), (2, 200.0)] {
            assert!(
                restored.plane(plane).data.iter().all(|v| (v - expected).abs() < 1e-3),
                "plane {plane} should be the resized source chroma"
            );
        }
    }

    #[test]
    fn test_gray_model_rejects_rgb_source() {
        let resampler = RecordingResampler::new();
        let frame = Frame::new(FrameDescriptor::new(8, 8, PixelFormat::RGBS)).unwrap();

        let err = to_tensor_layout(&frame, ChannelLayout::Gray, TensorPrecision::Fp32, &resampler)
            .unwrap_err();
        assert!(err.to_string().contains("gray or YUV"), "got: {err}");
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let resampler = RecordingResampler::new();
        let frame = yuv_frame(8, 8, ColorMatrix::BT709, ColorRange::Limited);
        let (_, meta) =
            to_tensor_layout(&frame, ChannelLayout::Rgb, TensorPrecision::Fp32, &resampler).unwrap();

        let gray = TensorFrame::from_planes(&[Plane::new(8, 8)], TensorPrecision::Fp32).unwrap();
        assert!(from_tensor_layout(&gray, &meta, &resampler).is_err());
    }
}
