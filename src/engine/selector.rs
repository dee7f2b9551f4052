// src/engine/selector.rs
//
// Operation selector: picks the one spatial operation that finishes the
// transform stage. Multiple flags may be set at once; the first match in
// priority order wins (smart crop, crop, embed, trim, area extract).

use crate::engine::backend::{ImageHandle, ImagingBackend, Rect};
use crate::engine::common::EngineResult;
use crate::engine::geometry::calculate_crop;
use crate::engine::pipeline::{step, StageFailure, StageResult};
use crate::error::ResizeError;
use crate::ops::{Gravity, Options};
use tracing::debug;

/// Spatial operation chosen for the current image size and options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpatialOp {
    SmartCrop { width: u32, height: u32 },
    Crop(Rect),
    /// Offsets are negative when the canvas is larger than the image.
    Embed {
        left: i64,
        top: i64,
        width: u32,
        height: u32,
    },
    /// Bounding box is only known once pixels are inspected.
    Trim,
    Extract(Rect),
    None,
}

impl SpatialOp {
    pub fn name(&self) -> &'static str {
        match self {
            SpatialOp::SmartCrop { .. } => "smart_crop",
            SpatialOp::Crop(_) => "crop",
            SpatialOp::Embed { .. } => "embed",
            SpatialOp::Trim => "trim",
            SpatialOp::Extract(_) => "extract",
            SpatialOp::None => "none",
        }
    }
}

/// Decide the spatial operation for an image of `in_width` x `in_height`.
///
/// `o.width` / `o.height` must already be the authoritative target size.
pub fn select_operation(o: &Options, in_width: u32, in_height: u32) -> EngineResult<SpatialOp> {
    if o.gravity == Gravity::Smart || o.smart_crop {
        return Ok(SpatialOp::SmartCrop {
            width: o.width,
            height: o.height,
        });
    }

    if o.crop {
        let width = in_width.min(o.width);
        let height = in_height.min(o.height);
        let (left, top) = calculate_crop(in_width, in_height, o.width, o.height, o.gravity);
        return Ok(SpatialOp::Crop(Rect::new(
            left.max(0) as u32,
            top.max(0) as u32,
            width,
            height,
        )));
    }

    if o.embed {
        return Ok(SpatialOp::Embed {
            left: (o.width as i64 - in_width as i64) / 2,
            top: (o.height as i64 - in_height as i64) / 2,
            width: o.width,
            height: o.height,
        });
    }

    if o.trim {
        return Ok(SpatialOp::Trim);
    }

    if o.top != 0 || o.left != 0 || o.area_width != 0 || o.area_height != 0 {
        let area_width = if o.area_width == 0 { o.width } else { o.area_width };
        let area_height = if o.area_height == 0 { o.height } else { o.area_height };
        if area_width == 0 || area_height == 0 {
            return Err(ResizeError::extract_area_params_required());
        }
        return Ok(SpatialOp::Extract(Rect::new(
            o.left,
            o.top,
            area_width,
            area_height,
        )));
    }

    Ok(SpatialOp::None)
}

/// Select and run the spatial operation. On failure the input handle is
/// handed back untouched.
pub fn extract_or_embed<B: ImagingBackend>(
    backend: &B,
    image: B::Image,
    o: &Options,
) -> StageResult<B::Image> {
    let (in_width, in_height) = image.dimensions();
    let op = match select_operation(o, in_width, in_height) {
        Ok(op) => op,
        Err(error) => {
            return Err(StageFailure { image, error });
        }
    };

    debug!(
        target: "image_resizer::pipeline",
        op = op.name(),
        in_width,
        in_height,
        target_width = o.width,
        target_height = o.height,
        "spatial operation selected"
    );

    match op {
        SpatialOp::SmartCrop { width, height } => {
            step(image, |img| backend.smart_crop(img, width, height))
        }
        SpatialOp::Crop(area) | SpatialOp::Extract(area) => {
            step(image, |img| backend.extract(img, area))
        }
        SpatialOp::Embed {
            left,
            top,
            width,
            height,
        } => step(image, |img| {
            backend.embed(img, left, top, width, height, o.extend, o.background)
        }),
        SpatialOp::Trim => step(image, |img| {
            let area = backend.find_trim(img, o.background, o.threshold)?;
            debug!(
                target: "image_resizer::pipeline",
                left = area.left,
                top = area.top,
                width = area.width,
                height = area.height,
                "trim bounds"
            );
            backend.extract(img, area)
        }),
        SpatialOp::None => Ok(image),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(width: u32, height: u32) -> Options {
        Options {
            width,
            height,
            ..Options::default()
        }
    }

    #[test]
    fn smart_gravity_wins_over_everything() {
        let o = Options {
            gravity: Gravity::Smart,
            crop: true,
            embed: true,
            trim: true,
            ..opts(100, 80)
        };
        assert_eq!(
            select_operation(&o, 400, 300).unwrap(),
            SpatialOp::SmartCrop { width: 100, height: 80 }
        );

        let o = Options { smart_crop: true, ..opts(100, 80) };
        assert_eq!(
            select_operation(&o, 400, 300).unwrap(),
            SpatialOp::SmartCrop { width: 100, height: 80 }
        );
    }

    #[test]
    fn crop_beats_embed() {
        let o = Options { crop: true, embed: true, ..opts(30, 30) };
        assert_eq!(
            select_operation(&o, 100, 100).unwrap(),
            SpatialOp::Crop(Rect::new(35, 35, 30, 30))
        );
    }

    #[test]
    fn crop_caps_to_input_and_clamps_offsets() {
        let o = Options { crop: true, ..opts(200, 50) };
        assert_eq!(
            select_operation(&o, 100, 100).unwrap(),
            SpatialOp::Crop(Rect::new(0, 25, 100, 50))
        );
    }

    #[test]
    fn crop_respects_gravity() {
        let o = Options { crop: true, gravity: Gravity::South, ..opts(50, 50) };
        assert_eq!(
            select_operation(&o, 100, 100).unwrap(),
            SpatialOp::Crop(Rect::new(25, 50, 50, 50))
        );
    }

    #[test]
    fn embed_centres_with_truncating_offsets() {
        let o = Options { embed: true, ..opts(101, 60) };
        assert_eq!(
            select_operation(&o, 50, 50).unwrap(),
            SpatialOp::Embed { left: 25, top: 5, width: 101, height: 60 }
        );

        // canvas smaller than image gives negative offsets
        let o = Options { embed: true, ..opts(40, 40) };
        assert_eq!(
            select_operation(&o, 50, 50).unwrap(),
            SpatialOp::Embed { left: -5, top: -5, width: 40, height: 40 }
        );
    }

    #[test]
    fn trim_before_area_extract() {
        let o = Options { trim: true, top: 4, area_width: 10, ..opts(20, 20) };
        assert_eq!(select_operation(&o, 100, 100).unwrap(), SpatialOp::Trim);
    }

    #[test]
    fn area_extract_defaults_to_target_size() {
        let o = Options { top: 10, left: 5, ..opts(40, 30) };
        assert_eq!(
            select_operation(&o, 100, 100).unwrap(),
            SpatialOp::Extract(Rect::new(5, 10, 40, 30))
        );

        let o = Options { area_width: 20, area_height: 10, ..opts(40, 30) };
        assert_eq!(
            select_operation(&o, 100, 100).unwrap(),
            SpatialOp::Extract(Rect::new(0, 0, 20, 10))
        );
    }

    #[test]
    fn area_extract_without_size_fails() {
        let o = Options { top: 10, ..Options::default() };
        let err = select_operation(&o, 100, 100).unwrap_err();
        assert!(matches!(err, ResizeError::ExtractAreaParamsRequired));
        assert_eq!(err.to_string(), "extract area width/height params are required");
    }

    #[test]
    fn nothing_requested_passes_through() {
        assert_eq!(select_operation(&opts(100, 100), 100, 100).unwrap(), SpatialOp::None);
    }
}
