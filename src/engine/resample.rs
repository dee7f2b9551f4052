// src/engine/resample.rs
//
// Resampling on top of fast_image_resize: integral shrink, reduce, affine
// scale and zoom. One `fir::Resizer` is kept per thread and released by
// `release_thread_resizer`.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::MAX_DIMENSION;
use crate::error::ResizeError;
use crate::ops::Interpolator;
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeAlg, ResizeOptions};
use image::{DynamicImage, GenericImageView, RgbImage, RgbaImage};
use std::cell::RefCell;

thread_local! {
    static RESIZER: RefCell<Option<fir::Resizer>> = const { RefCell::new(None) };
}

/// Drop this thread's cached resizer and its scratch buffers.
pub fn release_thread_resizer() {
    RESIZER.with(|cell| {
        cell.borrow_mut().take();
    });
}

#[cfg(test)]
fn thread_resizer_cached() -> bool {
    RESIZER.with(|cell| cell.borrow().is_some())
}

fn interpolator_alg(interpolator: Interpolator) -> ResizeAlg {
    match interpolator {
        Interpolator::Bicubic => ResizeAlg::Convolution(fir::FilterType::CatmullRom),
        Interpolator::Bilinear => ResizeAlg::Convolution(fir::FilterType::Bilinear),
        Interpolator::Nohalo => ResizeAlg::Convolution(fir::FilterType::Lanczos3),
        Interpolator::Nearest => ResizeAlg::Nearest,
    }
}

/// `round(dim * scale)`, at least one pixel.
fn scaled_dimension(dim: u32, scale: f64) -> EngineResult<u32> {
    let value = (dim as f64 * scale).round();
    if !value.is_finite() {
        return Err(ResizeError::invalid_argument(
            "scale",
            scale.to_string(),
            "scale must be finite",
        ));
    }
    if value > MAX_DIMENSION as f64 {
        return Err(ResizeError::dimension_exceeds_limit(
            value.min(u32::MAX as f64) as u32,
            MAX_DIMENSION,
        ));
    }
    Ok((value as u32).max(1))
}

/// Integral box shrink by `factor` on both axes.
pub fn shrink(img: &DynamicImage, factor: u32) -> EngineResult<DynamicImage> {
    if factor <= 1 {
        return Ok(img.clone());
    }
    let scale = 1.0 / factor as f64;
    let (w, h) = img.dimensions();
    let dst = (scaled_dimension(w, scale)?, scaled_dimension(h, scale)?);
    resize_to(img, dst, ResizeAlg::Convolution(fir::FilterType::Box))
}

/// Lanczos3 downscale by `xfactor` / `yfactor` (both >= 1).
pub fn reduce(img: &DynamicImage, xfactor: f64, yfactor: f64) -> EngineResult<DynamicImage> {
    if !(xfactor > 0.0 && yfactor > 0.0) {
        return Err(ResizeError::invalid_argument(
            "reduce",
            format!("{xfactor}x{yfactor}"),
            "factors must be positive",
        ));
    }
    let (w, h) = img.dimensions();
    let dst = (
        scaled_dimension(w, 1.0 / xfactor)?,
        scaled_dimension(h, 1.0 / yfactor)?,
    );
    resize_to(img, dst, ResizeAlg::Convolution(fir::FilterType::Lanczos3))
}

/// Scale by `xscale` / `yscale` with the interpolator's kernel.
pub fn affine(
    img: &DynamicImage,
    xscale: f64,
    yscale: f64,
    interpolator: Interpolator,
) -> EngineResult<DynamicImage> {
    let (w, h) = img.dimensions();
    let dst = (scaled_dimension(w, xscale)?, scaled_dimension(h, yscale)?);
    resize_to(img, dst, interpolator_alg(interpolator))
}

/// Replicate each pixel `factor` times on both axes.
pub fn zoom(img: &DynamicImage, factor: u32) -> EngineResult<DynamicImage> {
    if factor <= 1 {
        return Ok(img.clone());
    }
    let (w, h) = img.dimensions();
    let dst = (
        scaled_dimension(w, factor as f64)?,
        scaled_dimension(h, factor as f64)?,
    );
    resize_to(img, dst, ResizeAlg::Nearest)
}

/// Resize to exactly `dst`. Same-size requests are plain copies.
pub fn resize_to(
    img: &DynamicImage,
    dst: (u32, u32),
    alg: ResizeAlg,
) -> EngineResult<DynamicImage> {
    let src = img.dimensions();
    if src == dst {
        return Ok(img.clone());
    }
    if src.0 == 0 || src.1 == 0 || dst.0 == 0 || dst.1 == 0 {
        return Err(ResizeError::resize_failed(src, dst, "invalid dimensions for resize"));
    }

    run_with_panic_policy("resample", || {
        let (pixel_type, mut pixels) = match img {
            DynamicImage::ImageRgb8(rgb) => (PixelType::U8x3, rgb.as_raw().clone()),
            DynamicImage::ImageRgba8(rgba) => (PixelType::U8x4, rgba.as_raw().clone()),
            other if other.color().has_alpha() => (PixelType::U8x4, other.to_rgba8().into_raw()),
            other => (PixelType::U8x3, other.to_rgb8().into_raw()),
        };

        let out = match fir::images::Image::from_slice_u8(src.0, src.1, &mut pixels, pixel_type)
        {
            Ok(src_image) => resize_image(src_image, pixel_type, dst, alg),
            Err(ImageBufferError::InvalidBufferAlignment) => {
                let mut aligned = fir::images::Image::new(src.0, src.1, pixel_type);
                aligned.buffer_mut().copy_from_slice(&pixels);
                resize_image(aligned, pixel_type, dst, alg)
            }
            Err(other) => Err(format!("fir source image error: {other:?}")),
        };
        out.map_err(|message| ResizeError::resize_failed(src, dst, message))
    })
}

fn resize_image(
    mut src_image: fir::images::Image<'_>,
    pixel_type: PixelType,
    dst: (u32, u32),
    alg: ResizeAlg,
) -> std::result::Result<DynamicImage, String> {
    let mut dst_image = fir::images::Image::new(dst.0, dst.1, pixel_type);
    let options = ResizeOptions::new().resize_alg(alg);

    let premultiply = pixel_type == PixelType::U8x4
        && src_image.buffer().iter().skip(3).step_by(4).any(|&a| a != 255);
    let mul_div = MulDiv::default();
    if premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    RESIZER.with(|cell| {
        let mut slot = cell.borrow_mut();
        let resizer = slot.get_or_insert_with(fir::Resizer::new);
        resizer
            .resize(&src_image, &mut dst_image, &options)
            .map_err(|e| format!("fir resize error: {e:?}"))
    })?;

    if premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    let pixels = dst_image.into_vec();
    match pixel_type {
        PixelType::U8x3 => RgbImage::from_raw(dst.0, dst.1, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| "failed to create rgb image from resized data".to_string()),
        PixelType::U8x4 => RgbaImage::from_raw(dst.0, dst.1, pixels)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| "failed to create rgba image from resized data".to_string()),
        _ => Err("unsupported pixel type after resize".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba};

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn shrink_rounds_output() {
        let img = create_test_image(4000, 3000);
        assert_eq!(shrink(&img, 6).unwrap().dimensions(), (667, 500));
        assert_eq!(shrink(&img, 1).unwrap().dimensions(), (4000, 3000));
    }

    #[test]
    fn reduce_and_affine_dimensions() {
        let img = create_test_image(200, 100);
        assert_eq!(reduce(&img, 2.0, 4.0).unwrap().dimensions(), (100, 25));
        assert_eq!(
            affine(&img, 1.5, 0.5, Interpolator::Bilinear).unwrap().dimensions(),
            (300, 50)
        );
        assert_eq!(
            affine(&img, 1.0, 1.0, Interpolator::Bicubic).unwrap().dimensions(),
            (200, 100)
        );
    }

    #[test]
    fn output_never_collapses() {
        let img = create_test_image(3, 3);
        assert_eq!(reduce(&img, 100.0, 100.0).unwrap().dimensions(), (1, 1));
    }

    #[test]
    fn reduce_rejects_bad_factor() {
        let img = create_test_image(3, 3);
        assert!(reduce(&img, 0.0, 1.0).is_err());
        assert!(reduce(&img, f64::NAN, 1.0).is_err());
    }

    #[test]
    fn oversized_scale_is_rejected() {
        let img = create_test_image(100, 100);
        let err = affine(&img, 1000.0, 1.0, Interpolator::Nearest).unwrap_err();
        assert!(matches!(err, ResizeError::DimensionExceedsLimit { .. }));
    }

    #[test]
    fn zoom_replicates_pixels() {
        let img = create_test_image(4, 2);
        let out = zoom(&img, 3).unwrap().to_rgb8();
        assert_eq!(out.dimensions(), (12, 6));
        assert_eq!(out.get_pixel(2, 2).0, [0, 0, 128]);
        assert_eq!(out.get_pixel(3, 3).0, [1, 1, 128]);
    }

    #[test]
    fn transparent_edges_do_not_bleed() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(8, 8, |x, _| {
            if x < 4 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 255, 0, 0])
            }
        }));
        let out = reduce(&img, 2.0, 2.0).unwrap().to_rgba8();
        assert_eq!(out.dimensions(), (4, 4));
        let edge = out.get_pixel(1, 0);
        assert!(edge[1] < 32, "green leaked into opaque area: {edge:?}");
    }

    #[test]
    fn thread_resizer_is_released() {
        let img = create_test_image(20, 20);
        reduce(&img, 2.0, 2.0).unwrap();
        assert!(thread_resizer_cached());
        release_thread_resizer();
        assert!(!thread_resizer_cached());
    }

    #[test]
    fn grey_input_is_resized_as_rgb() {
        let img = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(10, 10, image::Luma([9])));
        let out = reduce(&img, 2.0, 2.0).unwrap();
        assert_eq!(out.dimensions(), (5, 5));
        assert_eq!(out.to_rgb8().get_pixel(2, 2).0, [9, 9, 9]);
    }
}
