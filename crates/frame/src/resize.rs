use crate::frame::Plane;
use common::span_debug;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};

/// Bilinear resize of a single `f32` plane.
///
/// Used to bring untouched chroma planes to the size of an upscaled luma plane.
pub fn resize_plane(plane: &Plane, width: u32, height: u32) -> anyhow::Result<Plane> {
    if plane.size() == (width, height) {
        return Ok(plane.clone());
    }

    let _s = span_debug!("resize_plane");

    let src = ImageRef::new(
        plane.width,
        plane.height,
        bytemuck::cast_slice(&plane.data),
        PixelType::F32,
    )?;
    let mut dst = Image::new(width, height, PixelType::F32);

    Resizer::new().resize(
        &src,
        &mut dst,
        &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
    )?;

    // the destination buffer is bytes with no alignment guarantee
    let data: Vec<f32> = bytemuck::pod_collect_to_vec(dst.buffer());

    Ok(Plane {
        width,
        height,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_doubles_constant_plane() {
        let plane = Plane::filled(16, 8, 0.25);
        let resized = resize_plane(&plane, 32, 16).unwrap();

        assert_eq!(resized.size(), (32, 16));
        assert_eq!(resized.data.len(), 32 * 16);
        assert!(
            resized.data.iter().all(|v| (v - 0.25).abs() < 1e-6),
            "a flat plane should stay flat"
        );
    }

    #[test]
    fn test_same_size_is_a_copy() {
        let plane = Plane::filled(4, 4, 3.0);
        assert_eq!(resize_plane(&plane, 4, 4).unwrap(), plane);
    }
}
