// src/engine/text.rs
//
// Text watermark rendering on ab_glyph.
//
// Fonts are looked up by family in a process-wide registry seeded with an
// embedded DejaVu Sans under the name "sans". Text is laid out at
// `points * dpi / 72` pixels, word-wrapped to the watermark width and
// either drawn once or tiled across the image.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::compose::blend_pixels;
use crate::error::ResizeError;
use crate::ops::Watermark;
use ab_glyph::{Font, FontArc, GlyphId, PxScale, ScaleFont};
use image::{DynamicImage, Rgba, RgbaImage};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

const EMBEDDED_FONT_DATA: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Family used when a requested one is not registered.
pub const FALLBACK_FAMILY: &str = "sans";

static FONTS: OnceLock<RwLock<HashMap<String, FontArc>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, FontArc>> {
    FONTS.get_or_init(|| {
        let mut fonts = HashMap::new();
        match FontArc::try_from_slice(EMBEDDED_FONT_DATA) {
            Ok(font) => {
                fonts.insert(FALLBACK_FAMILY.to_string(), font);
            }
            Err(e) => warn!(error = %e, "embedded watermark font failed to load"),
        }
        RwLock::new(fonts)
    })
}

/// Register a TrueType/OpenType font under `family` (case-insensitive).
pub fn register_font(family: &str, data: Vec<u8>) -> EngineResult<()> {
    let font = FontArc::try_from_vec(data).map_err(|e| {
        ResizeError::invalid_argument("font", family.to_string(), format!("invalid font data: {e}"))
    })?;
    registry().write().insert(family.to_ascii_lowercase(), font);
    Ok(())
}

fn lookup_font(family: &str) -> EngineResult<FontArc> {
    let fonts = registry().read();
    if let Some(font) = fonts.get(&family.to_ascii_lowercase()) {
        return Ok(font.clone());
    }
    warn!(family, fallback = FALLBACK_FAMILY, "unknown watermark font family");
    fonts
        .get(FALLBACK_FAMILY)
        .cloned()
        .ok_or_else(|| ResizeError::operation_failed("watermark", "no fonts available"))
}

/// Split `"<family> <points>"`. A missing or unparsable size means 10pt.
pub(crate) fn parse_font_spec(spec: &str) -> (String, f32) {
    let spec = spec.trim();
    if let Some((family, size)) = spec.rsplit_once(' ') {
        if let Ok(points) = size.parse::<f32>() {
            if points > 0.0 {
                return (family.trim().to_string(), points);
            }
        }
    }
    let family = if spec.is_empty() { FALLBACK_FAMILY } else { spec };
    (family.to_string(), 10.0)
}

struct Layout<F> {
    font: F,
    scale: PxScale,
}

impl<F: Font> Layout<F> {
    fn line_width(&self, line: &str) -> f32 {
        let scaled = self.font.as_scaled(self.scale);
        let mut width = 0.0f32;
        let mut prev: Option<GlyphId> = None;
        for c in line.chars() {
            let id = scaled.glyph_id(c);
            if let Some(p) = prev {
                width += scaled.kern(p, id);
            }
            width += scaled.h_advance(id);
            prev = Some(id);
        }
        width
    }

    /// Greedy word wrap. A single word wider than `max_width` gets its own line.
    fn wrap(&self, text: &str, max_width: u32) -> Vec<String> {
        let mut lines = Vec::new();
        for paragraph in text.lines() {
            if max_width == 0 {
                lines.push(paragraph.to_string());
                continue;
            }
            let mut current = String::new();
            for word in paragraph.split_whitespace() {
                let candidate = if current.is_empty() {
                    word.to_string()
                } else {
                    format!("{current} {word}")
                };
                if !current.is_empty() && self.line_width(&candidate) > max_width as f32 {
                    lines.push(std::mem::replace(&mut current, word.to_string()));
                } else {
                    current = candidate;
                }
            }
            lines.push(current);
        }
        lines
    }

    /// Coverage mask of the wrapped text block, ink colour with alpha.
    fn render(&self, lines: &[String], ink: Rgba<u8>) -> RgbaImage {
        let scaled = self.font.as_scaled(self.scale);
        let line_height = scaled.height() + scaled.line_gap();
        let width = lines
            .iter()
            .map(|l| self.line_width(l).ceil() as u32)
            .max()
            .unwrap_or(0)
            .max(1);
        let height = ((line_height * lines.len() as f32).ceil() as u32).max(1);

        let mut block = RgbaImage::new(width, height);
        for (row, line) in lines.iter().enumerate() {
            let baseline = scaled.ascent() + line_height * row as f32;
            let mut cursor = 0.0f32;
            let mut prev: Option<GlyphId> = None;
            for c in line.chars() {
                let id = scaled.glyph_id(c);
                if let Some(p) = prev {
                    cursor += scaled.kern(p, id);
                }
                let glyph = id.with_scale_and_position(self.scale, ab_glyph::point(cursor, baseline));
                if let Some(outlined) = self.font.outline_glyph(glyph) {
                    let bounds = outlined.px_bounds();
                    outlined.draw(|px, py, coverage| {
                        let x = px as i64 + bounds.min.x as i64;
                        let y = py as i64 + bounds.min.y as i64;
                        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                            return;
                        }
                        let existing = block.get_pixel_mut(x as u32, y as u32);
                        let a = (coverage.clamp(0.0, 1.0) * ink[3] as f32).round() as u8;
                        if a > existing[3] {
                            *existing = Rgba([ink[0], ink[1], ink[2], a]);
                        }
                    });
                }
                cursor += scaled.h_advance(id);
                prev = Some(id);
            }
        }
        block
    }
}

/// Top-left corners at which the text block is stamped.
fn tile_positions(
    image: (u32, u32),
    block: (u32, u32),
    margin: u32,
    replicate: bool,
) -> Vec<(u32, u32)> {
    if !replicate {
        return vec![(margin, margin)];
    }
    let step_x = (block.0 + margin).max(1) as usize;
    let step_y = (block.1 + margin).max(1) as usize;
    let mut positions = Vec::new();
    for y in (margin..image.1).step_by(step_y) {
        for x in (margin..image.0).step_by(step_x) {
            positions.push((x, y));
        }
    }
    positions
}

/// Draw `watermark` (defaults already resolved) over `img`.
pub fn draw_text_watermark(img: &DynamicImage, watermark: &Watermark) -> EngineResult<DynamicImage> {
    if watermark.text.is_empty() {
        return Ok(img.clone());
    }
    let (family, points) = parse_font_spec(&watermark.font);
    let font = lookup_font(&family)?;
    let px = points * watermark.dpi.max(1) as f32 / 72.0;

    run_with_panic_policy("watermark", || {
        let layout = Layout {
            font,
            scale: PxScale::from(px),
        };
        let lines = layout.wrap(&watermark.text, watermark.width);
        let ink = Rgba([
            watermark.background.r,
            watermark.background.g,
            watermark.background.b,
            255,
        ]);
        let block = layout.render(&lines, ink);

        let mut base = img.to_rgba8();
        let (w, h) = base.dimensions();
        let opacity = watermark.opacity.clamp(0.0, 1.0);
        for (left, top) in tile_positions((w, h), block.dimensions(), watermark.margin, !watermark.no_replicate) {
            for (bx, by, fg) in block.enumerate_pixels() {
                if fg[3] == 0 {
                    continue;
                }
                let (x, y) = (left as u64 + bx as u64, top as u64 + by as u64);
                if x >= w as u64 || y >= h as u64 {
                    continue;
                }
                let (x, y) = (x as u32, y as u32);
                let blended = blend_pixels(*base.get_pixel(x, y), *fg, opacity);
                base.put_pixel(x, y, blended);
            }
        }

        Ok(if img.color().has_alpha() {
            DynamicImage::ImageRgba8(base)
        } else {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(base).to_rgb8())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Color;
    use image::{Rgb, RgbImage};

    fn white(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])))
    }

    fn inked_pixels(img: &DynamicImage) -> usize {
        img.to_rgb8().pixels().filter(|p| p.0 != [255, 255, 255]).count()
    }

    fn mark(text: &str) -> Watermark {
        Watermark {
            width: 100,
            dpi: 72,
            margin: 10,
            opacity: 1.0,
            no_replicate: true,
            text: text.to_string(),
            font: "sans 16".to_string(),
            background: Color::BLACK,
        }
    }

    #[test]
    fn font_spec_parsing() {
        assert_eq!(parse_font_spec("sans 10"), ("sans".to_string(), 10.0));
        assert_eq!(
            parse_font_spec("DejaVu Sans Bold 12"),
            ("DejaVu Sans Bold".to_string(), 12.0)
        );
        assert_eq!(parse_font_spec("serif"), ("serif".to_string(), 10.0));
        assert_eq!(parse_font_spec(""), ("sans".to_string(), 10.0));
    }

    #[test]
    fn empty_text_is_noop() {
        let img = white(50, 50);
        let out = draw_text_watermark(&img, &mark("")).unwrap();
        assert_eq!(inked_pixels(&out), 0);
    }

    #[test]
    fn single_stamp_stays_near_margin() {
        let img = white(200, 200);
        let out = draw_text_watermark(&img, &mark("Hi")).unwrap().to_rgb8();
        assert_eq!(out.dimensions(), (200, 200));
        let inked: Vec<_> = out
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0 != [255, 255, 255])
            .collect();
        assert!(!inked.is_empty());
        assert!(inked.iter().all(|(x, y, _)| *x >= 10 && *y >= 10 && *x < 60 && *y < 60));
    }

    #[test]
    fn replication_covers_more_area() {
        let img = white(300, 300);
        let once = draw_text_watermark(&img, &mark("Hi")).unwrap();
        let tiled = draw_text_watermark(&img, &Watermark { no_replicate: false, ..mark("Hi") }).unwrap();
        assert!(inked_pixels(&tiled) > inked_pixels(&once) * 4);
    }

    #[test]
    fn opacity_lightens_ink() {
        let img = white(200, 200);
        let solid = draw_text_watermark(&img, &mark("W")).unwrap().to_rgb8();
        let faint = draw_text_watermark(&img, &Watermark { opacity: 0.25, ..mark("W") })
            .unwrap()
            .to_rgb8();
        let darkest = |i: &RgbImage| i.pixels().map(|p| p.0[0]).min().unwrap_or(255);
        assert!(darkest(&faint) > darkest(&solid));
        assert!(darkest(&faint) >= 180);
    }

    #[test]
    fn unknown_family_falls_back() {
        let img = white(200, 200);
        let out = draw_text_watermark(&img, &Watermark { font: "nosuchfont 16".into(), ..mark("A") })
            .unwrap();
        assert!(inked_pixels(&out) > 0);
    }

    #[test]
    fn wrap_breaks_long_text() {
        let layout = Layout {
            font: lookup_font("sans").unwrap(),
            scale: PxScale::from(16.0),
        };
        let lines = layout.wrap("one two three four five six", 60);
        assert!(lines.len() > 1);
        assert_eq!(lines.join(" "), "one two three four five six");
        assert_eq!(layout.wrap("one two", 0), vec!["one two".to_string()]);
    }

    #[test]
    fn tiles_start_at_margin() {
        assert_eq!(tile_positions((100, 100), (20, 10), 5, false), vec![(5, 5)]);
        let tiles = tile_positions((60, 30), (20, 10), 5, true);
        assert_eq!(tiles, vec![(5, 5), (30, 5), (55, 5), (5, 20), (30, 20), (55, 20)]);
    }

    #[test]
    fn register_rejects_garbage() {
        assert!(register_font("broken", vec![0, 1, 2, 3]).is_err());
    }
}
