// lib.rs
//
// image-resizer: resize / crop / rotate / watermark pipeline driven by a
// single declarative `Options` value.
//
// Design goals:
// - Deterministic output dimensions for every option combination
// - Decoder-native shrink-on-load for large JPEGs
// - Explicit ownership of every intermediate image
// - Pluggable imaging backend, pure-Rust by default

// Memory allocator optimization - jemalloc for better performance
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod engine;
pub mod error;
pub mod ops;

use engine::{FormatCaps, ImagingBackend, Resizer, RustBackend, Source};
use std::path::Path;

pub use engine::{BatchResult, Image, LimitPolicy, Limits};
pub use error::{ErrorCategory, ResizeError, Result};
pub use ops::{
    Angle, Color, Direction, Extend, GaussianBlur, Gravity, ImageType, Interpolator,
    Interpretation, Options, Preset, SaveOptions, Sharpen, Watermark, WatermarkImage,
};

/// Every type the engine knows about, in detection order.
const ALL_TYPES: [ImageType; 10] = [
    ImageType::Jpeg,
    ImageType::Webp,
    ImageType::Png,
    ImageType::Tiff,
    ImageType::Gif,
    ImageType::Pdf,
    ImageType::Svg,
    ImageType::Magick,
    ImageType::Heif,
    ImageType::Avif,
];

/// Resize `buf` with the default pure-Rust backend and no input limits.
pub fn resize(buf: &[u8], options: &Options) -> Result<Vec<u8>> {
    Resizer::new(RustBackend).resize(buf, options)
}

/// Header-level facts about an encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectMetadata {
    pub width: u32,
    pub height: u32,
    /// Detected container type, if recognised.
    pub format: Option<ImageType>,
    /// EXIF Orientation (1..=8), if present.
    pub orientation: Option<u16>,
}

/// Inspect image metadata WITHOUT decoding pixels.
/// Only the header is read, so this is cheap enough to run before deciding
/// whether to process an image at all.
pub fn inspect(bytes: &[u8]) -> Result<InspectMetadata> {
    if bytes.is_empty() {
        return Err(ResizeError::empty_buffer());
    }
    let (width, height) = engine::read_dimensions(bytes)
        .ok_or_else(|| ResizeError::decode_failed("failed to read image header"))?;
    Ok(InspectMetadata {
        width,
        height,
        format: engine::detect_image_type(bytes),
        orientation: engine::detect_exif_orientation(bytes),
    })
}

/// Inspect a file through a memory map, without copying it onto the heap.
pub fn inspect_path(path: impl AsRef<Path>) -> Result<InspectMetadata> {
    let source = Source::map(path)?;
    match source.as_bytes() {
        Some(bytes) => inspect(bytes),
        None => inspect(&source.load()?),
    }
}

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Types the default backend can decode.
pub fn supported_input_formats() -> Vec<ImageType> {
    supported_with(FormatCaps::LOAD)
}

/// Types the default backend can encode.
pub fn supported_output_formats() -> Vec<ImageType> {
    supported_with(FormatCaps::SAVE)
}

fn supported_with(caps: FormatCaps) -> Vec<ImageType> {
    ALL_TYPES
        .into_iter()
        .filter(|t| RustBackend.capabilities(*t).contains(caps))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn create_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn inspect_reads_header() {
        let meta = inspect(&create_png(30, 20)).unwrap();
        assert_eq!((meta.width, meta.height), (30, 20));
        assert_eq!(meta.format, Some(ImageType::Png));
        assert_eq!(meta.orientation, None);
    }

    #[test]
    fn inspect_rejects_garbage() {
        assert!(matches!(inspect(&[]), Err(ResizeError::EmptyBuffer)));
        assert!(inspect(b"not an image at all").is_err());
    }

    #[test]
    fn inspect_path_reports_missing_file() {
        let err = inspect_path("/nonexistent/image.png").unwrap_err();
        assert!(matches!(err, ResizeError::FileNotFound { .. }));
    }

    #[test]
    fn supported_formats_follow_backend() {
        let inputs = supported_input_formats();
        assert!(inputs.contains(&ImageType::Jpeg));
        assert!(!inputs.contains(&ImageType::Svg));
        assert!(!supported_output_formats().contains(&ImageType::Avif));
    }

    #[test]
    fn version_matches_manifest() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }
}
