// src/engine.rs
//
// The core of image-resizer. One invocation:
// 1. Decodes the source through an `ImagingBackend`
// 2. Runs the fixed stage pipeline over the decoded handle
// 3. Encodes the result with the requested output settings
//
// This file is a facade over the modules in engine/.

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Larger images are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod backend;
mod common;
mod compose;
mod decoder;
mod effects;
mod encoder;
mod geometry;
mod image;
mod io;
mod limits;
mod native;
mod pipeline;
mod pool;
mod resample;
mod resizer;
mod selector;
mod text;

pub use backend::{FormatCaps, ImageHandle, ImagingBackend, Rect};
pub use common::EngineResult;
pub use decoder::{
    check_dimensions, detect_exif_orientation, detect_image_type, read_dimensions,
};
pub use encoder::QualitySettings;
pub use geometry::{
    calculate_crop, calculate_residual, calculate_rotation_and_flip, calculate_shrink, get_angle,
    image_calculations, normalize_operation, Geometry, ShrinkOnLoad,
};
pub use self::image::Image;
pub use io::{load_icc_profile, Metadata, Source};
pub use limits::{LimitPolicy, Limits};
pub use native::{NativeImage, RustBackend};
pub use pipeline::{process, resolve_watermark_defaults, step, StageFailure, StageResult};
pub use pool::{get_pool, MAX_CONCURRENCY};
pub use resizer::{BatchResult, Resizer};
pub use selector::{extract_or_embed, select_operation, SpatialOp};
pub use text::{register_font, FALLBACK_FAMILY};
