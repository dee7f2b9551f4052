// src/engine/native.rs
//
// Pure-Rust imaging backend: mozjpeg / zune-png / libwebp / image-rs for
// codecs, fast_image_resize for resampling, ab_glyph for text.

use crate::engine::backend::{FormatCaps, ImageHandle, ImagingBackend, Rect};
use crate::engine::common::EngineResult;
use crate::engine::io::Metadata;
use crate::engine::{compose, decoder, effects, encoder, resample, text};
use crate::error::ResizeError;
use crate::ops::{
    Angle, Color, Direction, Extend, GaussianBlur, ImageType, Interpolator, SaveOptions, Sharpen,
    Watermark, WatermarkImage,
};
use image::{DynamicImage, GenericImageView};
use tracing::trace;

/// Quality used when re-encoding a rotated JPEG for shrink-on-load.
const MATERIALIZE_QUALITY: u8 = 90;

/// Decoded pixels plus what the encoder needs to carry over from the source.
#[derive(Clone, Debug)]
pub struct NativeImage {
    pixels: DynamicImage,
    format: ImageType,
    orientation: Option<u16>,
    metadata: Metadata,
    orientation_applied: bool,
}

impl NativeImage {
    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> DynamicImage {
        self.pixels
    }

    /// Container type the pixels were decoded from.
    pub fn format(&self) -> ImageType {
        self.format
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn with_pixels(&self, pixels: DynamicImage) -> Self {
        Self {
            pixels,
            format: self.format,
            orientation: self.orientation,
            metadata: self.metadata.clone(),
            orientation_applied: self.orientation_applied,
        }
    }

    fn reoriented(&self, pixels: DynamicImage) -> Self {
        Self {
            orientation_applied: true,
            ..self.with_pixels(pixels)
        }
    }
}

impl ImageHandle for NativeImage {
    fn width(&self) -> u32 {
        self.pixels.width()
    }

    fn height(&self) -> u32 {
        self.pixels.height()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }

    /// Wrap already decoded pixels, e.g. from another library.
    pub fn from_pixels(&self, pixels: DynamicImage, format: ImageType) -> NativeImage {
        NativeImage {
            pixels,
            format,
            orientation: None,
            metadata: Metadata::default(),
            orientation_applied: false,
        }
    }
}

impl ImagingBackend for RustBackend {
    type Image = NativeImage;

    fn capabilities(&self, format: ImageType) -> FormatCaps {
        match format {
            ImageType::Jpeg => FormatCaps::LOAD | FormatCaps::SAVE | FormatCaps::SHRINK_ON_LOAD,
            ImageType::Png | ImageType::Webp | ImageType::Gif | ImageType::Tiff => {
                FormatCaps::LOAD | FormatCaps::SAVE
            }
            _ => FormatCaps::empty(),
        }
    }

    fn decode(&self, buf: &[u8]) -> EngineResult<(NativeImage, ImageType)> {
        let (pixels, format) = decoder::decode_image(buf)?;
        let orientation = decoder::detect_exif_orientation(buf);
        let image = NativeImage {
            pixels,
            format,
            orientation,
            metadata: Metadata::read(buf),
            orientation_applied: false,
        };
        Ok((image, format))
    }

    fn encode(&self, image: &NativeImage, options: &SaveOptions) -> EngineResult<Vec<u8>> {
        encoder::encode(
            &image.pixels,
            &image.metadata,
            options,
            image.orientation_applied,
        )
    }

    fn materialize(&self, image: &NativeImage, format: ImageType) -> EngineResult<Vec<u8>> {
        match format {
            ImageType::Jpeg => encoder::encode_jpeg(&image.pixels, MATERIALIZE_QUALITY, false),
            ImageType::Png => encoder::encode_png(&image.pixels, 1, false),
            ImageType::Webp => encoder::encode_webp(&image.pixels, MATERIALIZE_QUALITY, true),
            other => Err(ResizeError::unsupported_output_type(other.name())),
        }
    }

    fn read_exif_orientation(&self, image: &NativeImage) -> Option<u16> {
        image.orientation
    }

    fn rotate(&self, image: &NativeImage, angle: Angle) -> EngineResult<NativeImage> {
        let pixels = match angle {
            Angle::D0 => return Ok(image.clone()),
            Angle::D90 => image.pixels.rotate90(),
            Angle::D180 => image.pixels.rotate180(),
            Angle::D270 => image.pixels.rotate270(),
        };
        Ok(image.reoriented(pixels))
    }

    fn flip(&self, image: &NativeImage, direction: Direction) -> EngineResult<NativeImage> {
        let pixels = match direction {
            Direction::Horizontal => image.pixels.fliph(),
            Direction::Vertical => image.pixels.flipv(),
        };
        Ok(image.reoriented(pixels))
    }

    fn shrink_on_load(
        &self,
        buf: &[u8],
        image: &NativeImage,
        format: ImageType,
        level: u32,
    ) -> EngineResult<NativeImage> {
        if format != ImageType::Jpeg {
            return Err(ResizeError::shrink_on_load_unsupported(format.name()));
        }
        // An empty buffer means the pixels were rotated or flipped since
        // decode; reloading the source would undo that.
        if buf.is_empty() || decoder::read_dimensions(buf) != Some(image.dimensions()) {
            trace!(
                target: "image_resizer::pipeline",
                level,
                "source buffer is stale, shrinking decoded pixels"
            );
            return resample::shrink(&image.pixels, level).map(|p| image.with_pixels(p));
        }
        let pixels = decoder::decode_jpeg_scaled(buf, level)?;
        Ok(image.with_pixels(pixels))
    }

    fn zoom(&self, image: &NativeImage, factor: u32) -> EngineResult<NativeImage> {
        resample::zoom(&image.pixels, factor).map(|p| image.with_pixels(p))
    }

    fn shrink(&self, image: &NativeImage, factor: u32) -> EngineResult<NativeImage> {
        resample::shrink(&image.pixels, factor).map(|p| image.with_pixels(p))
    }

    fn reduce(&self, image: &NativeImage, xfactor: f64, yfactor: f64) -> EngineResult<NativeImage> {
        resample::reduce(&image.pixels, xfactor, yfactor).map(|p| image.with_pixels(p))
    }

    fn affine(
        &self,
        image: &NativeImage,
        xscale: f64,
        yscale: f64,
        interpolator: Interpolator,
    ) -> EngineResult<NativeImage> {
        resample::affine(&image.pixels, xscale, yscale, interpolator).map(|p| image.with_pixels(p))
    }

    fn extract(&self, image: &NativeImage, area: Rect) -> EngineResult<NativeImage> {
        compose::extract(&image.pixels, area).map(|p| image.with_pixels(p))
    }

    fn embed(
        &self,
        image: &NativeImage,
        left: i64,
        top: i64,
        width: u32,
        height: u32,
        extend: Extend,
        background: Color,
    ) -> EngineResult<NativeImage> {
        compose::embed(&image.pixels, left, top, width, height, extend, background)
            .map(|p| image.with_pixels(p))
    }

    fn smart_crop(&self, image: &NativeImage, width: u32, height: u32) -> EngineResult<NativeImage> {
        compose::smart_crop(&image.pixels, width, height).map(|p| image.with_pixels(p))
    }

    fn find_trim(&self, image: &NativeImage, background: Color, threshold: f64) -> EngineResult<Rect> {
        compose::find_trim(&image.pixels, background, threshold)
    }

    fn gaussian_blur(&self, image: &NativeImage, blur: &GaussianBlur) -> EngineResult<NativeImage> {
        effects::gaussian_blur(&image.pixels, blur).map(|p| image.with_pixels(p))
    }

    fn sharpen(&self, image: &NativeImage, sharpen: &Sharpen) -> EngineResult<NativeImage> {
        effects::sharpen(&image.pixels, sharpen).map(|p| image.with_pixels(p))
    }

    fn draw_text_watermark(
        &self,
        image: &NativeImage,
        watermark: &Watermark,
    ) -> EngineResult<NativeImage> {
        text::draw_text_watermark(&image.pixels, watermark).map(|p| image.with_pixels(p))
    }

    fn draw_image_watermark(
        &self,
        image: &NativeImage,
        overlay: &WatermarkImage,
    ) -> EngineResult<NativeImage> {
        let (layer, _) = decoder::decode_image(&overlay.buf)?;
        let pixels = compose::overlay(
            &image.pixels,
            &layer,
            overlay.left,
            overlay.top,
            overlay.opacity,
        );
        Ok(image.with_pixels(pixels))
    }

    fn flatten(&self, image: &NativeImage, background: Color) -> EngineResult<NativeImage> {
        Ok(image.with_pixels(compose::flatten(&image.pixels, background)))
    }

    fn thread_shutdown(&self) {
        resample::release_thread_resizer();
    }
}
