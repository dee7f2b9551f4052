// src/engine/pipeline.rs
//
// Pipeline orchestrator.
// Runs the fixed stage order over one decoded image:
//   rotate/flip -> buffer refresh -> geometry -> shrink-on-load -> zoom
//   -> transform (shrink + reduce/affine + spatial op) -> effects
//   -> text watermark -> image watermark -> flatten
//
// Each stage consumes the live handle and hands back exactly one handle:
// the new one on success, the last good one inside `StageFailure` on error.

use crate::engine::backend::{FormatCaps, ImageHandle, ImagingBackend};
use crate::engine::common::EngineResult;
use crate::engine::geometry::{
    calculate_rotation_and_flip, get_angle, should_apply_effects, should_blur, should_sharpen,
    should_transform_image, Geometry,
};
use crate::engine::selector::extract_or_embed;
use crate::error::ResizeError;
use crate::ops::{
    Angle, Color, Direction, ImageType, Options, Watermark, WatermarkImage, WATERMARK_DPI,
    WATERMARK_FONT,
};
use std::borrow::Cow;
use std::fmt;
use tracing::{debug, trace};

/// A failed stage: the error plus the last successfully produced handle,
/// returned to the caller for release.
pub struct StageFailure<I> {
    pub image: I,
    pub error: ResizeError,
}

impl<I> StageFailure<I> {
    /// Release the handle and keep only the error.
    pub fn into_error(self) -> ResizeError {
        self.error
    }

    pub fn into_parts(self) -> (I, ResizeError) {
        (self.image, self.error)
    }
}

impl<I> fmt::Debug for StageFailure<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageFailure")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<I> fmt::Display for StageFailure<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<I> From<StageFailure<I>> for ResizeError {
    fn from(failure: StageFailure<I>) -> Self {
        failure.into_error()
    }
}

pub type StageResult<I> = std::result::Result<I, StageFailure<I>>;

/// Run one backend operation. On success the input handle is dropped here;
/// on failure it travels back inside the `StageFailure`.
pub fn step<I, F>(image: I, op: F) -> StageResult<I>
where
    F: FnOnce(&I) -> EngineResult<I>,
{
    match op(&image) {
        Ok(next) => Ok(next),
        Err(error) => Err(StageFailure { image, error }),
    }
}

/// Transform a decoded image according to `options`.
///
/// `options` should already have defaults applied. `buf` holds the encoded
/// source; it is replaced by a re-encoded copy when a JPEG is physically
/// rotated, so shrink-on-load reads the rotated pixels. Any other rotation
/// or flip empties it.
pub fn process<B: ImagingBackend>(
    backend: &B,
    image: B::Image,
    source_type: ImageType,
    options: &Options,
    buf: &mut Cow<'_, [u8]>,
) -> StageResult<B::Image> {
    let mut o = options.clone();

    let output_type = o.image_type.unwrap_or(source_type);
    if !backend.capabilities(output_type).contains(FormatCaps::SAVE) {
        return Err(StageFailure {
            image,
            error: ResizeError::unsupported_output_type(output_type.name()),
        });
    }

    let (image, rotated) = rotate_and_flip(backend, image, &o)?;

    if rotated {
        if source_type == ImageType::Jpeg && !o.no_auto_rotate {
            match backend.materialize(&image, source_type) {
                Ok(bytes) => {
                    trace!(target: "image_resizer::pipeline", len = bytes.len(), "source buffer refreshed");
                    *buf = Cow::Owned(bytes);
                }
                Err(error) => return Err(StageFailure { image, error }),
            }
        } else {
            // the encoded source no longer matches the live pixels
            *buf = Cow::Borrowed(&[][..]);
        }
    }

    let (in_width, in_height) = image.dimensions();
    let mut geometry = Geometry::compute(&mut o, in_width, in_height);
    debug!(
        target: "image_resizer::pipeline",
        in_width,
        in_height,
        width = o.width,
        height = o.height,
        factor = geometry.factor,
        shrink = geometry.shrink,
        residual = geometry.residual,
        force = o.force,
        "geometry"
    );

    let mut image = image;

    if backend
        .capabilities(source_type)
        .contains(FormatCaps::SHRINK_ON_LOAD)
    {
        if let Some(plan) = geometry.shrink_on_load() {
            image = step(image, |img| {
                backend.shrink_on_load(&**buf, img, source_type, plan.level)
            })?;
            geometry = plan.geometry();
            debug!(
                target: "image_resizer::pipeline",
                level = plan.level,
                width = image.width(),
                height = image.height(),
                factor = geometry.factor,
                shrink = geometry.shrink,
                residual = geometry.residual,
                "shrink on load"
            );
        }
    }

    if o.zoom != 0 {
        let factor = o.zoom.saturating_add(1);
        debug!(target: "image_resizer::pipeline", factor, "zoom");
        image = step(image, |img| backend.zoom(img, factor))?;
    }

    if should_transform_image(&o, in_width, in_height) {
        image = transform_image(backend, image, &mut o, geometry)?;
    } else {
        trace!(target: "image_resizer::pipeline", "transform skipped");
    }

    if should_apply_effects(&o) {
        image = apply_effects(backend, image, &o)?;
    }

    image = watermark_with_text(backend, image, &o.watermark)?;
    image = watermark_with_image(backend, image, &o.watermark_image)?;
    flatten_background(backend, image, source_type, &o)
}

fn rotate_and_flip<B: ImagingBackend>(
    backend: &B,
    image: B::Image,
    o: &Options,
) -> std::result::Result<(B::Image, bool), StageFailure<B::Image>> {
    let mut rotate = o.rotate;
    let mut mirror = false;

    if !o.no_auto_rotate {
        let orientation = backend.read_exif_orientation(&image);
        let (angle, flip) = calculate_rotation_and_flip(orientation, o.rotate);
        mirror = flip;
        if angle != Angle::D0 && rotate == 0 {
            rotate = angle.degrees();
        }
        if orientation.is_some_and(|v| v != 1) {
            debug!(
                target: "image_resizer::pipeline",
                orientation = orientation.unwrap_or(1),
                angle = angle.degrees(),
                mirror,
                "exif orientation"
            );
        }
    }

    let mut image = image;
    let mut rotated = false;

    if rotate > 0 {
        rotated = true;
        let angle = get_angle(rotate);
        image = step(image, |img| backend.rotate(img, angle))?;
    }

    // EXIF mirroring is always left/right.
    if mirror {
        rotated = true;
        image = step(image, |img| backend.flip(img, Direction::Horizontal))?;
    }

    if o.flip {
        rotated = true;
        image = step(image, |img| backend.flip(img, Direction::Vertical))?;
    }

    if o.flop {
        rotated = true;
        image = step(image, |img| backend.flip(img, Direction::Horizontal))?;
    }

    Ok((image, rotated))
}

fn transform_image<B: ImagingBackend>(
    backend: &B,
    image: B::Image,
    o: &mut Options,
    geometry: Geometry,
) -> StageResult<B::Image> {
    let mut image = image;
    let mut residual = geometry.residual;

    if geometry.shrink > 1 {
        image = step(image, |img| backend.shrink(img, geometry.shrink))?;
        let (width, height) = image.dimensions();
        let residual_x = o.width as f64 / width as f64;
        let residual_y = o.height as f64 / height as f64;
        residual = if o.crop {
            residual_x.max(residual_y)
        } else {
            residual_x.min(residual_y)
        };
    }

    let (mut residual_x, mut residual_y) = (residual, residual);
    if o.force {
        let (width, height) = image.dimensions();
        residual_x = o.width as f64 / width as f64;
        residual_y = o.height as f64 / height as f64;
    }

    if o.force || residual != 0.0 {
        if residual_x < 1.0 && residual_y < 1.0 {
            debug!(target: "image_resizer::pipeline", residual_x, residual_y, "reduce");
            image = step(image, |img| {
                backend.reduce(img, 1.0 / residual_x, 1.0 / residual_y)
            })?;
        } else {
            debug!(
                target: "image_resizer::pipeline",
                residual_x,
                residual_y,
                interpolator = o.interpolator.name(),
                "affine"
            );
            image = step(image, |img| {
                backend.affine(img, residual_x, residual_y, o.interpolator)
            })?;
        }
    }

    // an exact forced resize leaves nothing for crop or embed to do
    if o.force {
        o.crop = false;
        o.embed = false;
    }

    extract_or_embed(backend, image, o)
}

fn apply_effects<B: ImagingBackend>(
    backend: &B,
    image: B::Image,
    o: &Options,
) -> StageResult<B::Image> {
    let mut image = image;

    if should_blur(o) {
        debug!(
            target: "image_resizer::pipeline",
            sigma = o.gaussian_blur.sigma,
            min_ampl = o.gaussian_blur.min_ampl,
            "gaussian blur"
        );
        image = step(image, |img| backend.gaussian_blur(img, &o.gaussian_blur))?;
    }

    if should_sharpen(o) {
        debug!(
            target: "image_resizer::pipeline",
            radius = o.sharpen.radius,
            y2 = o.sharpen.y2,
            y3 = o.sharpen.y3,
            "sharpen"
        );
        image = step(image, |img| backend.sharpen(img, &o.sharpen))?;
    }

    Ok(image)
}

/// Fill unset text watermark fields for an image `image_width` pixels wide.
pub fn resolve_watermark_defaults(watermark: &Watermark, image_width: u32) -> Watermark {
    let mut w = watermark.clone();
    if w.font.is_empty() {
        w.font = WATERMARK_FONT.to_string();
    }
    if w.width == 0 {
        w.width = image_width / 6;
    }
    if w.dpi == 0 {
        w.dpi = WATERMARK_DPI;
    }
    if w.margin == 0 {
        w.margin = w.width;
    }
    if w.opacity == 0.0 {
        w.opacity = 0.25;
    } else if w.opacity > 1.0 {
        w.opacity = 1.0;
    }
    w
}

fn watermark_with_text<B: ImagingBackend>(
    backend: &B,
    image: B::Image,
    watermark: &Watermark,
) -> StageResult<B::Image> {
    if watermark.text.is_empty() {
        return Ok(image);
    }

    let w = resolve_watermark_defaults(watermark, image.width());
    debug!(
        target: "image_resizer::pipeline",
        font = %w.font,
        width = w.width,
        dpi = w.dpi,
        margin = w.margin,
        opacity = w.opacity,
        "text watermark"
    );
    step(image, |img| backend.draw_text_watermark(img, &w))
}

fn watermark_with_image<B: ImagingBackend>(
    backend: &B,
    image: B::Image,
    overlay: &WatermarkImage,
) -> StageResult<B::Image> {
    if overlay.buf.is_empty() {
        return Ok(image);
    }

    let mut overlay = overlay.clone();
    if overlay.opacity == 0.0 {
        overlay.opacity = 1.0;
    }
    debug!(
        target: "image_resizer::pipeline",
        left = overlay.left,
        top = overlay.top,
        opacity = overlay.opacity,
        "image watermark"
    );
    step(image, |img| backend.draw_image_watermark(img, &overlay))
}

fn flatten_background<B: ImagingBackend>(
    backend: &B,
    image: B::Image,
    source_type: ImageType,
    o: &Options,
) -> StageResult<B::Image> {
    if source_type != ImageType::Png || o.background == Color::BLACK {
        return Ok(image);
    }
    debug!(
        target: "image_resizer::pipeline",
        r = o.background.r,
        g = o.background.g,
        b = o.background.b,
        "flatten"
    );
    step(image, |img| backend.flatten(img, o.background))
}
