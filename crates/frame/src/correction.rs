use crate::frame::Plane;
use crate::resize::resize_plane;
use crate::tensor::TensorFrame;
use common::span_debug;

pub const DEFAULT_RADIUS: usize = 10;
pub const DEFAULT_PASSES: usize = 5;

/// Pull the low-frequency colour of `output` back toward `reference`.
///
/// The reference is resized to the output extent, both are box blurred, and
/// the blurred difference is added to the output:
/// `out = output + blur(reference) - blur(output)`.
/// Channel count and precision of `output` are kept.
pub fn color_correct(
    output: &TensorFrame,
    reference: &TensorFrame,
    radius: usize,
    passes: usize,
) -> anyhow::Result<TensorFrame> {
    let _s = span_debug!("color_correct");

    if output.channels() != reference.channels() {
        anyhow::bail!(
            "channel mismatch: output has {}, reference has {}",
            output.channels(),
            reference.channels()
        );
    }

    let (w, h) = (output.width(), output.height());
    let corrected = output
        .to_planes()
        .iter()
        .zip(reference.to_planes().iter())
        .map(|(out, reference)| {
            let reference = resize_plane(reference, w, h)?;
            let blur_ref = box_blur(&reference, radius, passes);
            let blur_out = box_blur(out, radius, passes);
            let data = out
                .data
                .iter()
                .zip(blur_ref.data.iter().zip(blur_out.data.iter()))
                .map(|(v, (r, o))| v + r - o)
                .collect();
            Ok(Plane {
                width: w,
                height: h,
                data,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    TensorFrame::from_planes(&corrected, output.precision())
}

/// Separable mean filter repeated `passes` times in each direction.
/// Samples outside the plane repeat the nearest edge.
pub fn box_blur(plane: &Plane, radius: usize, passes: usize) -> Plane {
    let (w, h) = (plane.width as usize, plane.height as usize);
    if radius == 0 || w == 0 || h == 0 {
        return plane.clone();
    }
    let mut data = plane.data.clone();

    let mut line = Vec::new();
    for _ in 0..passes {
        for y in 0..h {
            let row = &mut data[y * w..(y + 1) * w];
            line.clear();
            line.extend_from_slice(row);
            blur_line(&line, row, radius);
        }
    }
    let mut column = vec![0.0f32; h];
    let mut blurred = vec![0.0f32; h];
    for _ in 0..passes {
        for x in 0..w {
            for y in 0..h {
                column[y] = data[y * w + x];
            }
            blur_line(&column, &mut blurred, radius);
            for y in 0..h {
                data[y * w + x] = blurred[y];
            }
        }
    }

    Plane {
        width: plane.width,
        height: plane.height,
        data,
    }
}

fn blur_line(src: &[f32], dst: &mut [f32], radius: usize) {
    let n = src.len();
    let last = n - 1;
    let r = radius as isize;
    let at = |i: isize| src[i.clamp(0, last as isize) as usize];
    let norm = 1.0 / (2 * radius + 1) as f32;

    let mut sum: f32 = (-r..=r).map(at).sum();
    for (i, out) in dst.iter_mut().enumerate() {
        *out = sum * norm;
        let i = i as isize;
        sum += at(i + r + 1) - at(i - r);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorPrecision;

    fn tensor(planes: &[Plane]) -> TensorFrame {
        TensorFrame::from_planes(planes, TensorPrecision::Fp32).unwrap()
    }

    fn textured(width: u32, height: u32) -> Plane {
        let data = (0..width * height)
            .map(|i| ((i * 7) % 13) as f32 / 13.0)
            .collect();
        Plane::from_vec(width, height, data).unwrap()
    }

    #[test]
    fn test_box_blur_keeps_flat_plane() {
        let plane = Plane::filled(24, 16, 0.5);
        let blurred = box_blur(&plane, DEFAULT_RADIUS, DEFAULT_PASSES);
        assert!(blurred.data.iter().all(|v| (v - 0.5).abs() < 1e-5));
    }

    #[test]
    fn test_box_blur_preserves_mean_of_interior_step() {
        let mut plane = Plane::filled(9, 1, 0.0);
        plane.data[4] = 9.0;
        let blurred = box_blur(&plane, 1, 1);
        for v in &blurred.data[3..6] {
            assert!((v - 3.0).abs() < 1e-5);
        }
        assert!(blurred.data[0].abs() < 1e-6);
    }

    #[test]
    fn test_correction_is_identity_against_itself() {
        let frame = tensor(&[textured(32, 24)]);
        let corrected = color_correct(&frame, &frame, DEFAULT_RADIUS, DEFAULT_PASSES).unwrap();

        for (a, b) in corrected.to_planes()[0]
            .data
            .iter()
            .zip(frame.to_planes()[0].data.iter())
        {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_correction_restores_reference_tint() {
        // a 2x output whose colour drifted by +0.25 against a half-size source
        let reference = tensor(&[Plane::filled(16, 12, 0.4), Plane::filled(16, 12, 0.6)]);
        let drifted = tensor(&[Plane::filled(32, 24, 0.65), Plane::filled(32, 24, 0.85)]);
        let corrected = color_correct(&drifted, &reference, DEFAULT_RADIUS, DEFAULT_PASSES).unwrap();

        assert_eq!(corrected.shape(), &[1, 2, 24, 32]);
        for (plane, target) in corrected.to_planes().iter().zip([0.4f32, 0.6]) {
            assert!(plane.data.iter().all(|v| (v - target).abs() < 1e-4));
        }
    }

    #[test]
    fn test_correction_rejects_channel_mismatch() {
        let gray = tensor(&[Plane::filled(8, 8, 0.0)]);
        let rgb = tensor(&[
            Plane::filled(8, 8, 0.0),
            Plane::filled(8, 8, 0.0),
            Plane::filled(8, 8, 0.0),
        ]);
        assert!(color_correct(&gray, &rgb, 2, 1).is_err());
    }
}
