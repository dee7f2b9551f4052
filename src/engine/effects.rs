// src/engine/effects.rs
//
// Gaussian blur and luminance unsharp mask.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::ops::{GaussianBlur, Sharpen};
use image::{DynamicImage, Pixel};

/// Blur with the given sigma. Non-positive sigmas leave the image untouched.
pub fn gaussian_blur(img: &DynamicImage, blur: &GaussianBlur) -> EngineResult<DynamicImage> {
    if blur.sigma.is_nan() || blur.sigma <= 0.0 {
        return Ok(img.clone());
    }
    let sigma = blur.sigma as f32;
    run_with_panic_policy("gaussian_blur", || Ok(img.blur(sigma)))
}

fn sharpen_sigma(radius: i32) -> f32 {
    if radius <= 0 {
        0.5
    } else {
        1.0 + radius as f32 / 2.0
    }
}

/// Map a lightness difference (0..100 scale) through the flat/jaggy curve.
fn sharpen_curve(delta: f64, s: &Sharpen) -> f64 {
    let magnitude = delta.abs();
    let shaped = if magnitude <= s.x1 {
        magnitude * s.m1
    } else {
        s.x1 * s.m1 + (magnitude - s.x1) * s.m2
    };
    let signed = if delta < 0.0 { -shaped } else { shaped };
    signed.clamp(-s.y3, s.y2)
}

fn luma(rgb: [u8; 3]) -> f64 {
    0.299 * rgb[0] as f64 + 0.587 * rgb[1] as f64 + 0.114 * rgb[2] as f64
}

/// Unsharp mask on luminance. Alpha is preserved.
pub fn sharpen(img: &DynamicImage, sharpen: &Sharpen) -> EngineResult<DynamicImage> {
    let sigma = sharpen_sigma(sharpen.radius);
    let params = *sharpen;

    run_with_panic_policy("sharpen", || {
        let has_alpha = img.color().has_alpha();
        let mut out = img.to_rgba8();
        let blurred = DynamicImage::ImageRgba8(out.clone()).blur(sigma).to_rgba8();

        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let original = pixel.to_rgb().0;
            let soft = blurred.get_pixel(x, y).to_rgb().0;
            let delta = (luma(original) - luma(soft)) * 100.0 / 255.0;
            let boost = sharpen_curve(delta, &params) * 2.55;
            for c in 0..3 {
                pixel[c] = (pixel[c] as f64 + boost).round().clamp(0.0, 255.0) as u8;
            }
        }

        Ok(if has_alpha {
            DynamicImage::ImageRgba8(out)
        } else {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(out).to_rgb8())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn step_edge() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(20, 4, |x, _| {
            if x < 10 {
                Rgb([60, 60, 60])
            } else {
                Rgb([180, 180, 180])
            }
        }))
    }

    fn sharpen_params() -> Sharpen {
        Sharpen {
            radius: 1,
            x1: 2.0,
            y2: 10.0,
            y3: 20.0,
            m1: 0.0,
            m2: 3.0,
        }
    }

    #[test]
    fn zero_sigma_is_identity() {
        let img = step_edge();
        let out = gaussian_blur(&img, &GaussianBlur::default()).unwrap();
        assert_eq!(out.to_rgb8(), img.to_rgb8());
    }

    #[test]
    fn blur_softens_edges() {
        let img = step_edge();
        let blur = GaussianBlur { sigma: 2.0, min_ampl: 0.2 };
        let out = gaussian_blur(&img, &blur).unwrap().to_rgb8();
        let px = out.get_pixel(9, 2).0[0];
        assert!(px > 60 && px < 180, "edge pixel {px}");
    }

    #[test]
    fn curve_is_flat_below_threshold_and_capped() {
        let s = sharpen_params();
        assert_eq!(sharpen_curve(1.0, &s), 0.0);
        assert_eq!(sharpen_curve(4.0, &s), 6.0);
        assert_eq!(sharpen_curve(100.0, &s), 10.0);
        assert_eq!(sharpen_curve(-100.0, &s), -20.0);
    }

    #[test]
    fn sharpen_raises_edge_contrast() {
        let img = step_edge();
        let out = sharpen(&img, &sharpen_params()).unwrap();
        assert!(matches!(out, DynamicImage::ImageRgb8(_)));
        let rgb = out.to_rgb8();
        assert!(rgb.get_pixel(9, 2).0[0] < 60);
        assert!(rgb.get_pixel(10, 2).0[0] > 180);
        // flat regions far from the edge stay put
        assert_eq!(rgb.get_pixel(0, 2).0[0], 60);
    }

    #[test]
    fn sigma_from_radius() {
        assert_eq!(sharpen_sigma(0), 0.5);
        assert_eq!(sharpen_sigma(2), 2.0);
    }
}
