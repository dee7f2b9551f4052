// src/engine/compose.rs
//
// Spatial and compositing primitives over decoded pixels:
// extract, embed (with extend modes), trim detection, smart crop,
// background flatten and image overlay.

use crate::engine::backend::Rect;
use crate::engine::common::EngineResult;
use crate::engine::MAX_DIMENSION;
use crate::error::ResizeError;
use crate::ops::{Color, Extend};
use image::{DynamicImage, GenericImageView, ImageBuffer, Pixel, Rgb, RgbImage, Rgba, RgbaImage};

/// Copy out `area`. Fails when it does not fit inside the image.
pub fn extract(img: &DynamicImage, area: Rect) -> EngineResult<DynamicImage> {
    let (width, height) = img.dimensions();
    if !area.fits_within(width, height) {
        return Err(ResizeError::extract_out_of_bounds(
            area.left,
            area.top,
            area.width,
            area.height,
            width,
            height,
        ));
    }
    Ok(img.crop_imm(area.left, area.top, area.width, area.height))
}

/// Place `img` at (`left`, `top`) on a `width` x `height` canvas, generating
/// uncovered pixels according to `extend`.
pub fn embed(
    img: &DynamicImage,
    left: i64,
    top: i64,
    width: u32,
    height: u32,
    extend: Extend,
    background: Color,
) -> EngineResult<DynamicImage> {
    if width == 0 || height == 0 {
        return Err(ResizeError::invalid_argument(
            "embed",
            format!("{width}x{height}"),
            "canvas must not be empty",
        ));
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ResizeError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }

    let canvas = Canvas {
        left,
        top,
        width,
        height,
        extend,
        background,
    };
    Ok(if img.color().has_alpha() {
        DynamicImage::ImageRgba8(canvas.fill(&img.to_rgba8()))
    } else {
        DynamicImage::ImageRgb8(canvas.fill(&img.to_rgb8()))
    })
}

struct Canvas {
    left: i64,
    top: i64,
    width: u32,
    height: u32,
    extend: Extend,
    background: Color,
}

impl Canvas {
    fn fill<P>(&self, src: &ImageBuffer<P, Vec<u8>>) -> ImageBuffer<P, Vec<u8>>
    where
        P: Pixel<Subpixel = u8>,
    {
        let (src_w, src_h) = (src.width() as i64, src.height() as i64);
        let solid: Option<P> = match self.extend {
            Extend::Black => Some(solid_pixel([0, 0, 0], 0)),
            Extend::White => Some(solid_pixel([255, 255, 255], 255)),
            Extend::Background => Some(solid_pixel(
                [self.background.r, self.background.g, self.background.b],
                255,
            )),
            Extend::Copy | Extend::Last | Extend::Repeat | Extend::Mirror => None,
        };

        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let sx = x as i64 - self.left;
            let sy = y as i64 - self.top;
            if (0..src_w).contains(&sx) && (0..src_h).contains(&sy) {
                return *src.get_pixel(sx as u32, sy as u32);
            }
            if let Some(pixel) = solid {
                return pixel;
            }
            let mx = self.map_coordinate(sx, src_w);
            let my = self.map_coordinate(sy, src_h);
            *src.get_pixel(mx as u32, my as u32)
        })
    }

    fn map_coordinate(&self, v: i64, len: i64) -> i64 {
        match self.extend {
            Extend::Repeat => v.rem_euclid(len),
            Extend::Mirror => {
                let m = v.rem_euclid(2 * len);
                if m >= len {
                    2 * len - 1 - m
                } else {
                    m
                }
            }
            _ => v.clamp(0, len - 1),
        }
    }
}

fn solid_pixel<P: Pixel<Subpixel = u8>>(rgb: [u8; 3], alpha: u8) -> P {
    let channels = [rgb[0], rgb[1], rgb[2], alpha];
    *P::from_slice(&channels[..P::CHANNEL_COUNT as usize])
}

/// Bounding box of pixels whose RGB differs from `background` by more than
/// `threshold` on any channel. Transparent pixels are judged after
/// flattening onto the background.
pub fn find_trim(img: &DynamicImage, background: Color, threshold: f64) -> EngineResult<Rect> {
    let rgb = if img.color().has_alpha() {
        flatten_rgba(&img.to_rgba8(), background)
    } else {
        img.to_rgb8()
    };
    let bg = [background.r, background.g, background.b];

    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let differs = pixel
            .0
            .iter()
            .zip(bg)
            .any(|(&c, b)| (c as f64 - b as f64).abs() > threshold);
        if differs {
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }

    let (x0, y0, x1, y1) = bounds
        .ok_or_else(|| ResizeError::operation_failed("trim", "no content differs from background"))?;
    Ok(Rect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Crop to the `width` x `height` window with the most detail.
///
/// Saliency is local luma gradient plus chroma saturation. Windows larger
/// than the image are capped to it.
pub fn smart_crop(img: &DynamicImage, width: u32, height: u32) -> EngineResult<DynamicImage> {
    let (in_w, in_h) = img.dimensions();
    let crop_w = width.min(in_w).max(1);
    let crop_h = height.min(in_h).max(1);
    let (left, top) = best_window(&img.to_rgb8(), crop_w, crop_h);
    extract(img, Rect::new(left, top, crop_w, crop_h))
}

fn saliency_table(rgb: &RgbImage) -> Vec<u64> {
    let (w, h) = rgb.dimensions();
    let luma = |x: u32, y: u32| -> i32 {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        (r as i32 * 299 + g as i32 * 587 + b as i32 * 114) / 1000
    };

    let stride = w as usize + 1;
    let mut table = vec![0u64; stride * (h as usize + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            let l = luma(x, y);
            let right = if x + 1 < w { luma(x + 1, y) } else { l };
            let below = if y + 1 < h { luma(x, y + 1) } else { l };
            let edge = (l - right).unsigned_abs() + (l - below).unsigned_abs();

            let [r, g, b] = rgb.get_pixel(x, y).0;
            let saturation = r.max(g).max(b) - r.min(g).min(b);

            row_sum += edge as u64 + saturation as u64;
            let idx = (y as usize + 1) * stride + x as usize + 1;
            table[idx] = table[idx - stride] + row_sum;
        }
    }
    table
}

fn best_window(rgb: &RgbImage, crop_w: u32, crop_h: u32) -> (u32, u32) {
    let (w, h) = rgb.dimensions();
    let table = saliency_table(rgb);
    let stride = w as usize + 1;
    let sum = |x: u32, y: u32| -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + crop_w as usize, y0 + crop_h as usize);
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    };

    let centre = ((w - crop_w) as i64, (h - crop_h) as i64);
    let distance = |x: u32, y: u32| -> i64 {
        (2 * x as i64 - centre.0).abs() + (2 * y as i64 - centre.1).abs()
    };

    let mut best = (centre.0 as u32 / 2, centre.1 as u32 / 2);
    let mut best_score = sum(best.0, best.1);
    for y in 0..=(h - crop_h) {
        for x in 0..=(w - crop_w) {
            let score = sum(x, y);
            if score > best_score
                || (score == best_score && distance(x, y) < distance(best.0, best.1))
            {
                best = (x, y);
                best_score = score;
            }
        }
    }
    best
}

fn flatten_rgba(rgba: &RgbaImage, background: Color) -> RgbImage {
    let bg = [background.r as f32, background.g as f32, background.b as f32];
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = a as f32 / 255.0;
        let mix = |c: u8, bg: f32| (c as f32 * alpha + bg * (1.0 - alpha)).round() as u8;
        Rgb([mix(r, bg[0]), mix(g, bg[1]), mix(b, bg[2])])
    })
}

/// Composite onto a solid colour. Images without alpha pass through.
pub fn flatten(img: &DynamicImage, background: Color) -> DynamicImage {
    if !img.color().has_alpha() {
        return img.clone();
    }
    DynamicImage::ImageRgb8(flatten_rgba(&img.to_rgba8(), background))
}

/// Porter-Duff "over" with an extra opacity on the foreground.
pub(crate) fn blend_pixels(background: Rgba<u8>, foreground: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let fg_alpha = (foreground[3] as f32 / 255.0) * opacity.clamp(0.0, 1.0);
    let bg_alpha = background[3] as f32 / 255.0;
    let out_alpha = fg_alpha + bg_alpha * (1.0 - fg_alpha);

    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend_channel = |fg: u8, bg: u8| -> u8 {
        let fg = fg as f32 / 255.0;
        let bg = bg as f32 / 255.0;
        let result = (fg * fg_alpha + bg * bg_alpha * (1.0 - fg_alpha)) / out_alpha;
        (result * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend_channel(foreground[0], background[0]),
        blend_channel(foreground[1], background[1]),
        blend_channel(foreground[2], background[2]),
        (out_alpha * 255.0).round() as u8,
    ])
}

/// Draw `overlay` at (`left`, `top`), clipped to the base image.
pub fn overlay(
    img: &DynamicImage,
    overlay: &DynamicImage,
    left: u32,
    top: u32,
    opacity: f32,
) -> DynamicImage {
    let mut base = img.to_rgba8();
    let top_layer = overlay.to_rgba8();
    let (w, h) = base.dimensions();

    for (x, y, fg) in top_layer.enumerate_pixels() {
        let (bx, by) = (left as u64 + x as u64, top as u64 + y as u64);
        if bx >= w as u64 || by >= h as u64 {
            continue;
        }
        let (bx, by) = (bx as u32, by as u32);
        let blended = blend_pixels(*base.get_pixel(bx, by), *fg, opacity);
        base.put_pixel(bx, by, blended);
    }

    if img.color().has_alpha() {
        DynamicImage::ImageRgba8(base)
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(base).to_rgb8())
    }
}
