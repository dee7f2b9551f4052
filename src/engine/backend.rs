// src/engine/backend.rs
//
// Capability surface of the imaging backend.
//
// The pipeline only ever talks to pixels through this trait. Every operation
// borrows its input handle and returns a fresh owned handle, so the caller
// decides when the superseded one is released.

use crate::engine::common::EngineResult;
use crate::ops::{
    Angle, Color, Direction, Extend, GaussianBlur, ImageType, Interpolator, SaveOptions, Sharpen,
    Watermark, WatermarkImage,
};
use bitflags::bitflags;

bitflags! {
    /// What a backend can do with a given container format.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FormatCaps: u8 {
        const LOAD = 1;
        const SAVE = 1 << 1;
        /// Decoder-native downscale during load.
        const SHRINK_ON_LOAD = 1 << 2;
    }
}

/// Rectangle in pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// True when the rectangle is non-empty and lies inside `width` x `height`.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && (self.left as u64 + self.width as u64) <= width as u64
            && (self.top as u64 + self.height as u64) <= height as u64
    }
}

/// Opaque decoded image owned by a backend.
pub trait ImageHandle {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
}

/// Native imaging adapter.
///
/// Implementations must be shareable across threads so independent
/// invocations can run in parallel; any per-thread scratch state is released
/// by [`ImagingBackend::thread_shutdown`].
pub trait ImagingBackend: Send + Sync {
    type Image: ImageHandle + Send;

    fn capabilities(&self, format: ImageType) -> FormatCaps;

    /// Decode `buf`, returning the handle and the detected container type.
    fn decode(&self, buf: &[u8]) -> EngineResult<(Self::Image, ImageType)>;

    fn encode(&self, image: &Self::Image, options: &SaveOptions) -> EngineResult<Vec<u8>>;

    /// Re-encode the current pixels as `format` so later stages that read raw
    /// bytes (shrink-on-load) see the rotated image.
    fn materialize(&self, image: &Self::Image, format: ImageType) -> EngineResult<Vec<u8>>;

    /// EXIF orientation (1..=8) of the source, if any.
    fn read_exif_orientation(&self, image: &Self::Image) -> Option<u16>;

    fn rotate(&self, image: &Self::Image, angle: Angle) -> EngineResult<Self::Image>;

    fn flip(&self, image: &Self::Image, direction: Direction) -> EngineResult<Self::Image>;

    /// Reload `buf` with the decoder downscaling by `level` (2, 4 or 8).
    /// `buf` is empty when no encoded copy of the current pixels exists;
    /// the live pixels are then shrunk instead.
    fn shrink_on_load(
        &self,
        buf: &[u8],
        image: &Self::Image,
        format: ImageType,
        level: u32,
    ) -> EngineResult<Self::Image>;

    /// Pixel replication by an integer factor.
    fn zoom(&self, image: &Self::Image, factor: u32) -> EngineResult<Self::Image>;

    /// Integral box shrink on both axes.
    fn shrink(&self, image: &Self::Image, factor: u32) -> EngineResult<Self::Image>;

    /// Quality-oriented downscale; factors are >= 1.
    fn reduce(&self, image: &Self::Image, xfactor: f64, yfactor: f64)
        -> EngineResult<Self::Image>;

    fn affine(
        &self,
        image: &Self::Image,
        xscale: f64,
        yscale: f64,
        interpolator: Interpolator,
    ) -> EngineResult<Self::Image>;

    /// Fails when `area` does not fit inside the image.
    fn extract(&self, image: &Self::Image, area: Rect) -> EngineResult<Self::Image>;

    /// Place the image at (`left`, `top`) on a `width` x `height` canvas.
    /// Offsets may be negative.
    #[allow(clippy::too_many_arguments)]
    fn embed(
        &self,
        image: &Self::Image,
        left: i64,
        top: i64,
        width: u32,
        height: u32,
        extend: Extend,
        background: Color,
    ) -> EngineResult<Self::Image>;

    fn smart_crop(&self, image: &Self::Image, width: u32, height: u32)
        -> EngineResult<Self::Image>;

    /// Bounding box of everything that differs from `background` by more
    /// than `threshold`.
    fn find_trim(&self, image: &Self::Image, background: Color, threshold: f64)
        -> EngineResult<Rect>;

    fn gaussian_blur(&self, image: &Self::Image, blur: &GaussianBlur)
        -> EngineResult<Self::Image>;

    fn sharpen(&self, image: &Self::Image, sharpen: &Sharpen) -> EngineResult<Self::Image>;

    /// `watermark` arrives with every default already resolved.
    fn draw_text_watermark(&self, image: &Self::Image, watermark: &Watermark)
        -> EngineResult<Self::Image>;

    fn draw_image_watermark(
        &self,
        image: &Self::Image,
        overlay: &WatermarkImage,
    ) -> EngineResult<Self::Image>;

    fn flatten(&self, image: &Self::Image, background: Color) -> EngineResult<Self::Image>;

    /// Release per-thread resources. Called once at the end of every
    /// invocation on the invoking thread.
    fn thread_shutdown(&self) {}
}
