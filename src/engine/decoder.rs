// src/engine/decoder.rs
//
// Decoder operations: JPEG (mozjpeg), PNG (zune-png), WebP (libwebp),
// GIF/TIFF (image crate), plus container sniffing and EXIF orientation.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::ResizeError;
use crate::ops::ImageType;
use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, ImageReader, RgbImage, RgbaImage};
use mozjpeg::Decompress;
use std::io::Cursor;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

/// Detect the container type from magic bytes. Returns None if unknown.
pub fn detect_image_type(bytes: &[u8]) -> Option<ImageType> {
    if bytes.starts_with(b"%PDF") {
        return Some(ImageType::Pdf);
    }
    if let Some(brand) = isobmff_brand(bytes) {
        return match brand {
            b"avif" | b"avis" => Some(ImageType::Avif),
            b"heic" | b"heix" | b"hevc" | b"hevx" | b"mif1" | b"msf1" => Some(ImageType::Heif),
            _ => None,
        };
    }
    if looks_like_svg(bytes) {
        return Some(ImageType::Svg);
    }
    match image::guess_format(bytes).ok()? {
        ImageFormat::Jpeg => Some(ImageType::Jpeg),
        ImageFormat::Png => Some(ImageType::Png),
        ImageFormat::WebP => Some(ImageType::Webp),
        ImageFormat::Gif => Some(ImageType::Gif),
        ImageFormat::Tiff => Some(ImageType::Tiff),
        ImageFormat::Avif => Some(ImageType::Avif),
        // decodable by ImageMagick-class loaders only
        ImageFormat::Bmp | ImageFormat::Ico | ImageFormat::Tga | ImageFormat::Pnm => {
            Some(ImageType::Magick)
        }
        _ => None,
    }
}

fn isobmff_brand(bytes: &[u8]) -> Option<&[u8; 4]> {
    if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
        return None;
    }
    bytes[8..12].try_into().ok()
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    let Ok(text) = std::str::from_utf8(head) else {
        return false;
    };
    let text = text.trim_start_matches('\u{feff}').trim_start();
    (text.starts_with("<?xml") || text.starts_with("<svg") || text.starts_with("<!DOCTYPE svg"))
        && text.contains("<svg")
}

/// Decode JPEG using mozjpeg, downscaling by `8 / scale_num` in the IDCT.
/// `scale_num` of 8 decodes at full size.
fn decode_jpeg_with_scale(data: &[u8], scale_num: u8) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(ResizeError::decode_failed("mozjpeg: missing JPEG EOI marker"));
        }

        let mut decompress = Decompress::new_mem(data).map_err(|e| {
            ResizeError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        // header dimensions are checked before any pixel buffer exists
        let (src_w, src_h) = decompress.size();
        check_dimensions(src_w as u32, src_h as u32)?;

        if scale_num != 8 {
            decompress.scale(scale_num);
        }

        let mut decompress = decompress.rgb().map_err(|e| {
            ResizeError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = decompress.width() as u32;
        let height = decompress.height() as u32;
        check_dimensions(width, height)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            ResizeError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;
        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        RgbImage::from_raw(width, height, flat_pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| ResizeError::decode_failed("mozjpeg: failed to create image from raw data"))
    })
}

pub fn decode_jpeg_mozjpeg(data: &[u8]) -> EngineResult<DynamicImage> {
    decode_jpeg_with_scale(data, 8)
}

/// Decode JPEG at 1/`level` size (`level` is 2, 4 or 8).
pub fn decode_jpeg_scaled(data: &[u8], level: u32) -> EngineResult<DynamicImage> {
    match level {
        1 => decode_jpeg_with_scale(data, 8),
        2 | 4 | 8 => decode_jpeg_with_scale(data, (8 / level) as u8),
        other => Err(ResizeError::invalid_argument(
            "shrink_on_load",
            other.to_string(),
            "level must be 2, 4 or 8",
        )),
    }
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8-bit.
pub fn decode_png_zune(data: &[u8]) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(Cursor::new(data), options);
        decoder
            .decode_headers()
            .map_err(|e| ResizeError::decode_failed(format!("png: header decode failed: {e}")))?;
        let (w, h) = decoder
            .info()
            .map(|info| (info.width, info.height))
            .ok_or_else(|| ResizeError::decode_failed("png: missing header info"))?;
        check_dimensions(w as u32, h as u32)?;

        let pixels = decoder
            .decode()
            .map_err(|e| ResizeError::decode_failed(format!("png: decode failed: {e}")))?;
        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => return Err(ResizeError::decode_failed("png: unexpected non-U8 pixel buffer")),
        };

        let (width, height) = (w as u32, h as u32);
        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| ResizeError::decode_failed("png: missing colorspace"))?;

        match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| ResizeError::decode_failed("png: failed to build RGB image")),
            ColorSpace::RGBA => RgbaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(|| ResizeError::decode_failed("png: failed to build RGBA image")),
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| ResizeError::decode_failed("png: failed to build Luma image")),
            ColorSpace::LumaA => GrayAlphaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLumaA8)
                .ok_or_else(|| ResizeError::decode_failed("png: failed to build LumaA image")),
            other => Err(ResizeError::decode_failed(format!(
                "png: unsupported colorspace {other:?}"
            ))),
        }
    })
}

/// Decode WebP using libwebp. Animated files fall back to the image crate
/// and yield their first frame.
pub fn decode_webp_libwebp(data: &[u8]) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:webp", || {
        let features = BitstreamFeatures::new(data)
            .ok_or_else(|| ResizeError::decode_failed("webp: failed to read bitstream features"))?;
        check_dimensions(features.width(), features.height())?;

        if features.has_animation() {
            return image::load_from_memory_with_format(data, ImageFormat::WebP).map_err(|e| {
                ResizeError::decode_failed(format!("webp (animated) decode failed: {e}"))
            });
        }

        let decoded = WebPDecoder::new(data)
            .decode()
            .ok_or_else(|| ResizeError::decode_failed("webp: decode failed"))?;
        Ok(decoded.to_image())
    })
}

fn decode_with_image_crate(data: &[u8], format: ImageFormat) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        ensure_dimensions_safe(data)?;
        image::load_from_memory_with_format(data, format)
            .map_err(|e| ResizeError::decode_failed(format!("decode failed: {e}")))
    })
}

/// Decode `bytes`, routing by detected type.
pub fn decode_image(bytes: &[u8]) -> EngineResult<(DynamicImage, ImageType)> {
    if bytes.is_empty() {
        return Err(ResizeError::empty_buffer());
    }
    let detected = detect_image_type(bytes)
        .ok_or_else(|| ResizeError::unsupported_format("unknown"))?;
    let img = match detected {
        ImageType::Jpeg => decode_jpeg_mozjpeg(bytes)?,
        ImageType::Png => decode_png_zune(bytes)?,
        ImageType::Webp => decode_webp_libwebp(bytes)?,
        ImageType::Gif => decode_with_image_crate(bytes, ImageFormat::Gif)?,
        ImageType::Tiff => decode_with_image_crate(bytes, ImageFormat::Tiff)?,
        other => return Err(ResizeError::unsupported_format(other.name())),
    };
    Ok((img, detected))
}

/// Reject images larger than MAX_DIMENSION on a side or MAX_PIXELS overall.
pub fn check_dimensions(width: u32, height: u32) -> EngineResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ResizeError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(ResizeError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

/// Header-only dimensions, if the image crate can read them.
pub fn read_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Inspect encoded bytes and ensure the image dimensions are safe before decoding.
pub fn ensure_dimensions_safe(bytes: &[u8]) -> EngineResult<()> {
    match read_dimensions(bytes) {
        Some((width, height)) => check_dimensions(width, height),
        None => Ok(()),
    }
}

/// Extract EXIF Orientation tag (1-8). Returns None if missing or invalid.
pub fn detect_exif_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    orientation_from_exif(&exif)
}

/// Orientation from a raw TIFF-structured EXIF payload.
pub fn exif_orientation_from_raw(raw: &[u8]) -> Option<u16> {
    let exif = exif::Reader::new().read_raw(raw.to_vec()).ok()?;
    orientation_from_exif(&exif)
}

fn orientation_from_exif(exif: &exif::Exif) -> Option<u16> {
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let orientation = field.value.get_uint(0)? as u16;
    (1..=8).contains(&orientation).then_some(orientation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb};

    fn encode_webp(width: u32, height: u32) -> Vec<u8> {
        let rgb: Vec<u8> = std::iter::repeat([10u8, 20u8, 30u8])
            .take((width * height) as usize)
            .flatten()
            .collect();
        webp::Encoder::from_rgb(&rgb, width, height)
            .encode_lossless()
            .to_vec()
    }

    fn encode_with(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), format)
            .unwrap();
        buffer
    }

    #[test]
    fn detects_container_types() {
        assert_eq!(detect_image_type(&encode_with(ImageFormat::Png, 2, 2)), Some(ImageType::Png));
        assert_eq!(detect_image_type(&encode_with(ImageFormat::Jpeg, 2, 2)), Some(ImageType::Jpeg));
        assert_eq!(detect_image_type(&encode_with(ImageFormat::Gif, 2, 2)), Some(ImageType::Gif));
        assert_eq!(detect_image_type(&encode_webp(2, 2)), Some(ImageType::Webp));
        assert_eq!(detect_image_type(b"%PDF-1.7 rest"), Some(ImageType::Pdf));
        assert_eq!(
            detect_image_type(b"<?xml version=\"1.0\"?><svg xmlns=\"x\"></svg>"),
            Some(ImageType::Svg)
        );
        assert_eq!(
            detect_image_type(b"\0\0\0\x1cftypheic\0\0\0\0"),
            Some(ImageType::Heif)
        );
        assert_eq!(
            detect_image_type(b"\0\0\0\x1cftypavif\0\0\0\0"),
            Some(ImageType::Avif)
        );
        assert_eq!(detect_image_type(b"not an image"), None);
    }

    #[test]
    fn decode_routes_by_type() {
        let (img, ty) = decode_image(&encode_with(ImageFormat::Png, 3, 1)).unwrap();
        assert_eq!(ty, ImageType::Png);
        assert_eq!(img.to_rgb8().get_pixel(2, 0).0, [2, 0, 128]);

        let (img, ty) = decode_image(&encode_with(ImageFormat::Jpeg, 16, 8)).unwrap();
        assert_eq!(ty, ImageType::Jpeg);
        assert_eq!(img.dimensions(), (16, 8));

        let (img, ty) = decode_image(&encode_webp(3, 2)).unwrap();
        assert_eq!(ty, ImageType::Webp);
        assert_eq!(img.to_rgb8().get_pixel(0, 0).0, [10, 20, 30]);

        let (img, ty) = decode_image(&encode_with(ImageFormat::Tiff, 5, 4)).unwrap();
        assert_eq!(ty, ImageType::Tiff);
        assert_eq!(img.dimensions(), (5, 4));
    }

    #[test]
    fn decode_rejects_unloadable_input() {
        assert!(matches!(decode_image(&[]).unwrap_err(), ResizeError::EmptyBuffer));
        assert!(matches!(
            decode_image(b"%PDF-1.4").unwrap_err(),
            ResizeError::UnsupportedFormat { .. }
        ));
        assert!(matches!(
            decode_image(b"garbage bytes").unwrap_err(),
            ResizeError::UnsupportedFormat { .. }
        ));
    }

    #[test]
    fn truncated_jpeg_fails() {
        let jpeg = encode_with(ImageFormat::Jpeg, 16, 16);
        let err = decode_image(&jpeg[..jpeg.len() / 2]).unwrap_err();
        assert!(matches!(err, ResizeError::DecodeFailed { .. }));
    }

    #[test]
    fn scaled_jpeg_decode() {
        let jpeg = encode_with(ImageFormat::Jpeg, 64, 32);
        assert_eq!(decode_jpeg_scaled(&jpeg, 2).unwrap().dimensions(), (32, 16));
        assert_eq!(decode_jpeg_scaled(&jpeg, 8).unwrap().dimensions(), (8, 4));
        assert!(decode_jpeg_scaled(&jpeg, 3).is_err());
    }

    #[test]
    fn dimension_limits() {
        assert!(check_dimensions(100, 100).is_ok());
        assert!(matches!(
            check_dimensions(MAX_DIMENSION + 1, 1).unwrap_err(),
            ResizeError::DimensionExceedsLimit { .. }
        ));
        assert!(matches!(
            check_dimensions(20_000, 20_000).unwrap_err(),
            ResizeError::PixelCountExceedsLimit { .. }
        ));
    }

    #[test]
    fn oversized_png_rejected_before_decode() {
        let data = encode_with(ImageFormat::Png, MAX_DIMENSION + 1, 1);
        let err = ensure_dimensions_safe(&data).unwrap_err();
        assert!(matches!(err, ResizeError::DimensionExceedsLimit { .. }));
    }

    #[test]
    fn no_exif_means_no_orientation() {
        assert_eq!(detect_exif_orientation(&encode_with(ImageFormat::Jpeg, 4, 4)), None);
    }
}
