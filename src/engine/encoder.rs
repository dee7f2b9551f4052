// src/engine/encoder.rs
//
// Encoder operations: JPEG (mozjpeg), PNG (image + oxipng), WebP (libwebp),
// GIF/TIFF (image crate), output interpretation and metadata policy.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::io::{embed_metadata, load_icc_profile, reset_exif_orientation, Metadata};
use crate::engine::MAX_DIMENSION;
use crate::error::ResizeError;
use crate::ops::{ImageType, Interpretation, SaveOptions};
use image::{DynamicImage, GenericImageView, ImageFormat};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;
use std::io::Cursor;
use tracing::trace;

/// Quality (0-100) to per-codec tuning. Bands:
/// High >= 85, Balanced 70-84, Fast 50-69, Fastest < 50.
#[derive(Debug, Clone, Copy)]
pub struct QualitySettings {
    quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityBand {
    High,
    Balanced,
    Fast,
    Fastest,
}

impl QualitySettings {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100) as f32,
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    fn band(&self) -> QualityBand {
        if self.quality >= 85.0 {
            QualityBand::High
        } else if self.quality >= 70.0 {
            QualityBand::Balanced
        } else if self.quality >= 50.0 {
            QualityBand::Fast
        } else {
            QualityBand::Fastest
        }
    }

    pub fn jpeg_smoothing(&self) -> u8 {
        if self.quality >= 90.0 {
            0
        } else if self.quality >= 70.0 {
            5
        } else if self.quality >= 60.0 {
            10
        } else {
            18
        }
    }

    pub fn webp_method(&self) -> i32 {
        4
    }

    pub fn webp_sns_strength(&self) -> i32 {
        match self.band() {
            QualityBand::High => 50,
            QualityBand::Balanced => 70,
            QualityBand::Fast | QualityBand::Fastest => 80,
        }
    }

    pub fn webp_filter_strength(&self) -> i32 {
        if self.quality >= 80.0 {
            20
        } else if self.quality >= 60.0 {
            30
        } else {
            40
        }
    }

    pub fn webp_filter_sharpness(&self) -> i32 {
        match self.band() {
            QualityBand::High => 2,
            QualityBand::Balanced | QualityBand::Fast | QualityBand::Fastest => 0,
        }
    }
}

/// Map a zlib-style compression level (0-9) to an oxipng preset (0-6).
pub fn png_preset(compression: u8) -> u8 {
    compression.min(9) * 6 / 9
}

/// Convert to the requested output colour interpretation.
pub fn apply_interpretation(
    img: &DynamicImage,
    interpretation: Interpretation,
) -> EngineResult<Cow<'_, DynamicImage>> {
    let alpha = img.color().has_alpha();
    Ok(match interpretation {
        Interpretation::Srgb | Interpretation::Rgb => Cow::Borrowed(img),
        Interpretation::Bw if alpha => Cow::Owned(DynamicImage::ImageLumaA8(img.to_luma_alpha8())),
        Interpretation::Bw => Cow::Owned(DynamicImage::ImageLuma8(img.to_luma8())),
        Interpretation::Grey16 if alpha => {
            Cow::Owned(DynamicImage::ImageLumaA16(img.to_luma_alpha16()))
        }
        Interpretation::Grey16 => Cow::Owned(DynamicImage::ImageLuma16(img.to_luma16())),
        other @ (Interpretation::Cmyk | Interpretation::Lab) => {
            return Err(ResizeError::unsupported_interpretation(other.name()));
        }
    })
}

fn check_encodable(img: &DynamicImage) -> EngineResult<()> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(ResizeError::invalid_argument(
            "image",
            format!("{w}x{h}"),
            "cannot encode an empty image",
        ));
    }
    if w > MAX_DIMENSION || h > MAX_DIMENSION {
        return Err(ResizeError::dimension_exceeds_limit(w.max(h), MAX_DIMENSION));
    }
    Ok(())
}

/// Encode to JPEG using mozjpeg. Greyscale input stays single-channel.
pub fn encode_jpeg(img: &DynamicImage, quality: u8, progressive: bool) -> EngineResult<Vec<u8>> {
    check_encodable(img)?;
    run_with_panic_policy("encode:jpeg", || {
        let settings = QualitySettings::new(quality);
        let grey = !img.color().has_color();
        let (w, h) = img.dimensions();

        let (pixels, in_space, out_space, components): (Cow<'_, [u8]>, _, _, usize) = if grey {
            let luma: Cow<'_, [u8]> = match img {
                DynamicImage::ImageLuma8(l) => Cow::Borrowed(l.as_raw()),
                _ => Cow::Owned(img.to_luma8().into_raw()),
            };
            (luma, ColorSpace::JCS_GRAYSCALE, ColorSpace::JCS_GRAYSCALE, 1)
        } else {
            let rgb: Cow<'_, [u8]> = match img {
                DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb.as_raw()),
                _ => Cow::Owned(img.to_rgb8().into_raw()),
            };
            (rgb, ColorSpace::JCS_RGB, ColorSpace::JCS_YCbCr, 3)
        };

        let mut comp = Compress::new(in_space);
        if !progressive {
            // mozjpeg's default profile is progressive
            comp.set_fastest_defaults();
        }
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(out_space);
        comp.set_quality(settings.quality());
        if !grey {
            comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        }
        comp.set_optimize_coding(true);
        if progressive {
            comp.set_progressive_mode();
            comp.set_optimize_scans(true);
            comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        }
        comp.set_smoothing_factor(settings.jpeg_smoothing());

        let mut output = Vec::with_capacity((w as usize * h as usize * components / 10).max(4096));
        let mut writer = comp.start_compress(&mut output).map_err(|e| {
            ResizeError::encode_failed("jpeg", format!("mozjpeg: failed to start compress: {e:?}"))
        })?;
        for row in pixels.chunks(w as usize * components) {
            writer.write_scanlines(row).map_err(|e| {
                ResizeError::encode_failed("jpeg", format!("mozjpeg: failed to write scanlines: {e:?}"))
            })?;
        }
        writer.finish().map_err(|e| {
            ResizeError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
        })?;
        Ok(output)
    })
}

/// Encode to PNG with the image crate, then recompress losslessly with oxipng.
pub fn encode_png(img: &DynamicImage, compression: u8, interlace: bool) -> EngineResult<Vec<u8>> {
    check_encodable(img)?;
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| ResizeError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        let mut options = oxipng::Options::from_preset(png_preset(compression));
        options.strip = oxipng::StripChunks::None;
        options.interlace = Some(interlace);

        oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            ResizeError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })
    })
}

/// Encode to WebP. Alpha is kept only when the image has it.
pub fn encode_webp(img: &DynamicImage, quality: u8, lossless: bool) -> EngineResult<Vec<u8>> {
    check_encodable(img)?;
    run_with_panic_policy("encode:webp", || {
        let (w, h) = img.dimensions();
        let pixels: Cow<'_, [u8]>;
        let encoder = if img.color().has_alpha() {
            pixels = match img {
                DynamicImage::ImageRgba8(rgba) => Cow::Borrowed(rgba.as_raw()),
                _ => Cow::Owned(img.to_rgba8().into_raw()),
            };
            webp::Encoder::from_rgba(&pixels, w, h)
        } else {
            pixels = match img {
                DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb.as_raw()),
                _ => Cow::Owned(img.to_rgb8().into_raw()),
            };
            webp::Encoder::from_rgb(&pixels, w, h)
        };

        if lossless {
            return Ok(encoder.encode_lossless().to_vec());
        }

        let settings = QualitySettings::new(quality);
        let mut config = webp::WebPConfig::new()
            .map_err(|_| ResizeError::encode_failed("webp", "failed to create WebPConfig"))?;
        config.quality = settings.quality();
        config.method = settings.webp_method();
        config.pass = 1;
        config.preprocessing = 0;
        config.sns_strength = settings.webp_sns_strength();
        config.autofilter = 1;
        config.filter_strength = settings.webp_filter_strength();
        config.filter_sharpness = settings.webp_filter_sharpness();

        let mem = encoder
            .encode_advanced(&config)
            .map_err(|e| ResizeError::encode_failed("webp", format!("WebP encode failed: {e:?}")))?;
        Ok(mem.to_vec())
    })
}

fn encode_with_image_crate(img: &DynamicImage, format: ImageFormat, name: &'static str) -> EngineResult<Vec<u8>> {
    check_encodable(img)?;
    run_with_panic_policy("encode:image", || {
        let converted: Cow<'_, DynamicImage> = match (format, img) {
            (ImageFormat::Gif, DynamicImage::ImageRgba8(_)) => Cow::Borrowed(img),
            (ImageFormat::Gif, _) => Cow::Owned(DynamicImage::ImageRgba8(img.to_rgba8())),
            _ => Cow::Borrowed(img),
        };
        let mut buf = Vec::new();
        converted
            .write_to(&mut Cursor::new(&mut buf), format)
            .map_err(|e| ResizeError::encode_failed(name, format!("{name} encode failed: {e}")))?;
        Ok(buf)
    })
}

/// Encode pixels (and carry-over metadata) according to `options`.
///
/// `orientation_applied` resets the EXIF Orientation tag so viewers do not
/// rotate an already upright image a second time.
pub fn encode(
    img: &DynamicImage,
    metadata: &Metadata,
    options: &SaveOptions,
    orientation_applied: bool,
) -> EngineResult<Vec<u8>> {
    let interpretation = options.interpretation;
    let pixels = apply_interpretation(img, interpretation)?;

    let encoded = match options.image_type {
        ImageType::Jpeg => encode_jpeg(&pixels, options.quality, options.interlace)?,
        ImageType::Png => encode_png(&pixels, options.compression, options.interlace)?,
        ImageType::Webp => encode_webp(&pixels, options.quality, options.lossless)?,
        ImageType::Gif => encode_with_image_crate(&pixels, ImageFormat::Gif, "gif")?,
        ImageType::Tiff => encode_with_image_crate(&pixels, ImageFormat::Tiff, "tiff")?,
        other => return Err(ResizeError::unsupported_output_type(other.name())),
    };

    let grey_output = matches!(interpretation, Interpretation::Bw | Interpretation::Grey16);
    let icc: Option<Cow<'_, [u8]>> = if options.strip_metadata || options.no_profile {
        None
    } else if let Some(path) = &options.output_icc {
        Some(Cow::Owned(load_icc_profile(path)?))
    } else if grey_output {
        // an RGB source profile does not describe grey pixels
        None
    } else {
        metadata.icc.as_deref().map(|icc| Cow::Borrowed(icc.as_slice()))
    };

    let exif: Option<Cow<'_, [u8]>> = match metadata.exif.as_deref() {
        Some(_) if options.strip_metadata => None,
        Some(raw) if orientation_applied => reset_exif_orientation(raw).map(Cow::Owned),
        Some(raw) => Some(Cow::Borrowed(raw.as_slice())),
        None => None,
    };

    trace!(
        target: "image_resizer::encode",
        format = options.image_type.name(),
        bytes = encoded.len(),
        icc = icc.is_some(),
        exif = exif.is_some(),
        "encoded"
    );

    embed_metadata(encoded, options.image_type, icc.as_deref(), exif.as_deref())
}
