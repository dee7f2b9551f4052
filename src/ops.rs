// src/ops.rs
//
// Declarative transformation options.
// Zero values mean "unset". The engine fills defaults and rewrites the
// target geometry per invocation; the caller's copy is never mutated.

use crate::error::ResizeError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Default output quality when `Options::quality` is zero.
pub const QUALITY: u8 = 75;

/// Default zlib compression level for PNG output.
pub const DEFAULT_COMPRESSION: u8 = 6;

/// Font used for text watermarks when none is given.
pub const WATERMARK_FONT: &str = "sans 10";

/// Text watermark rendering resolution when none is given.
pub const WATERMARK_DPI: u32 = 150;

/// Anchor used to choose which region survives a crop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Gravity {
    #[default]
    Center,
    North,
    East,
    South,
    West,
    /// Content-aware: routes to smart crop.
    Smart,
}

/// Right-angle rotation. Arbitrary degrees are snapped by `engine::get_angle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Angle {
    #[default]
    D0,
    D90,
    D180,
    D270,
}

impl Angle {
    pub fn degrees(self) -> u32 {
        match self {
            Angle::D0 => 0,
            Angle::D90 => 90,
            Angle::D180 => 180,
            Angle::D270 => 270,
        }
    }
}

/// Mirror axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Swap columns (left becomes right).
    Horizontal,
    /// Swap rows (top becomes bottom).
    Vertical,
}

/// How pixels outside the source are generated when embedding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Extend {
    #[default]
    Black,
    Copy,
    Repeat,
    Mirror,
    White,
    Background,
    Last,
}

/// Resampling kernel used by the affine stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Interpolator {
    #[default]
    Bicubic,
    Bilinear,
    Nohalo,
    Nearest,
}

impl Interpolator {
    /// Support window of the kernel in taps.
    pub fn window_size(self) -> f64 {
        match self {
            Interpolator::Bicubic => 4.0,
            Interpolator::Bilinear => 2.0,
            Interpolator::Nohalo => 6.0,
            Interpolator::Nearest => 1.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Interpolator::Bicubic => "bicubic",
            Interpolator::Bilinear => "bilinear",
            Interpolator::Nohalo => "nohalo",
            Interpolator::Nearest => "nearest",
        }
    }
}

/// Image container formats known to the engine.
///
/// Whether a type can be loaded, saved or shrunk on load is a backend
/// capability, see `engine::FormatCaps`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageType {
    Jpeg,
    Webp,
    Png,
    Tiff,
    Gif,
    Pdf,
    Svg,
    Magick,
    Heif,
    Avif,
}

impl ImageType {
    pub fn name(self) -> &'static str {
        match self {
            ImageType::Jpeg => "jpeg",
            ImageType::Webp => "webp",
            ImageType::Png => "png",
            ImageType::Tiff => "tiff",
            ImageType::Gif => "gif",
            ImageType::Pdf => "pdf",
            ImageType::Svg => "svg",
            ImageType::Magick => "magick",
            ImageType::Heif => "heif",
            ImageType::Avif => "avif",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImageType {
    type Err = ResizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageType::Jpeg),
            "webp" => Ok(ImageType::Webp),
            "png" => Ok(ImageType::Png),
            "tiff" | "tif" => Ok(ImageType::Tiff),
            "gif" => Ok(ImageType::Gif),
            "pdf" => Ok(ImageType::Pdf),
            "svg" => Ok(ImageType::Svg),
            "magick" => Ok(ImageType::Magick),
            "heif" | "heic" => Ok(ImageType::Heif),
            "avif" => Ok(ImageType::Avif),
            other => Err(ResizeError::unsupported_format(other.to_string())),
        }
    }
}

/// Output colour interpretation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Interpretation {
    #[default]
    Srgb,
    Rgb,
    /// 8-bit greyscale
    Bw,
    /// 16-bit greyscale
    Grey16,
    Cmyk,
    Lab,
}

impl Interpretation {
    pub fn name(self) -> &'static str {
        match self {
            Interpretation::Srgb => "srgb",
            Interpretation::Rgb => "rgb",
            Interpretation::Bw => "b-w",
            Interpretation::Grey16 => "grey16",
            Interpretation::Cmyk => "cmyk",
            Interpretation::Lab => "lab",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GaussianBlur {
    pub sigma: f64,
    pub min_ampl: f64,
}

/// Unsharp-mask parameters.
///
/// `x1` is the flat/jaggy threshold, `y2`/`y3` cap brightening and
/// darkening, `m1`/`m2` are the flat and jaggy slopes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sharpen {
    pub radius: i32,
    pub x1: f64,
    pub y2: f64,
    pub y3: f64,
    pub m1: f64,
    pub m2: f64,
}

/// Text watermark. Skipped when `text` is empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Watermark {
    pub width: u32,
    pub dpi: u32,
    pub margin: u32,
    pub opacity: f32,
    pub no_replicate: bool,
    pub text: String,
    /// `"<family> <points>"`, e.g. `"sans 10"`.
    pub font: String,
    /// Ink colour.
    pub background: Color,
}

/// Image overlay. Skipped when `buf` is empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WatermarkImage {
    pub left: u32,
    pub top: u32,
    pub buf: Arc<Vec<u8>>,
    pub opacity: f32,
}

/// Declarative configuration for a single transformation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Options {
    // target geometry
    pub width: u32,
    pub height: u32,
    pub area_width: u32,
    pub area_height: u32,
    pub top: u32,
    pub left: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub zoom: u32,

    // mode flags
    pub force: bool,
    pub crop: bool,
    pub enlarge: bool,
    pub embed: bool,
    pub trim: bool,
    pub smart_crop: bool,
    pub gravity: Gravity,

    // rotation / flip
    /// Degrees; snapped down to a right angle.
    pub rotate: u32,
    pub flip: bool,
    pub flop: bool,
    pub no_auto_rotate: bool,

    // visual params
    pub background: Color,
    pub extend: Extend,
    pub threshold: f64,
    pub interpolator: Interpolator,

    // effects
    pub gaussian_blur: GaussianBlur,
    pub sharpen: Sharpen,
    pub watermark: Watermark,
    pub watermark_image: WatermarkImage,

    // output
    pub quality: u8,
    pub compression: u8,
    pub image_type: Option<ImageType>,
    pub interlace: bool,
    pub no_profile: bool,
    pub interpretation: Option<Interpretation>,
    pub output_icc: Option<PathBuf>,
    pub strip_metadata: bool,
    pub lossless: bool,
}

impl Options {
    /// Options for a named preset (`thumbnail`, `avatar`, `hero`, `social`).
    pub fn preset(name: &str) -> Result<Self, ResizeError> {
        name.parse::<Preset>().map(Preset::options)
    }

    /// Fill zero-valued output settings. Total; never fails.
    pub fn apply_defaults(mut self, detected: ImageType) -> Self {
        if self.quality == 0 {
            self.quality = QUALITY;
        }
        if self.compression == 0 {
            self.compression = DEFAULT_COMPRESSION;
        }
        if self.image_type.is_none() {
            self.image_type = Some(detected);
        }
        if self.interpretation.is_none() {
            self.interpretation = Some(Interpretation::Srgb);
        }
        self
    }

    /// Encoder settings with defaults resolved against the detected input type.
    pub fn save_options(&self, detected: ImageType) -> SaveOptions {
        SaveOptions {
            quality: if self.quality == 0 { QUALITY } else { self.quality },
            compression: if self.compression == 0 {
                DEFAULT_COMPRESSION
            } else {
                self.compression
            },
            image_type: self.image_type.unwrap_or(detected),
            interlace: self.interlace,
            no_profile: self.no_profile,
            interpretation: self.interpretation.unwrap_or_default(),
            output_icc: self.output_icc.clone(),
            strip_metadata: self.strip_metadata,
            lossless: self.lossless,
        }
    }
}

/// Output-side settings passed to the backend encoder.
#[derive(Clone, Debug, PartialEq)]
pub struct SaveOptions {
    pub quality: u8,
    pub compression: u8,
    pub image_type: ImageType,
    pub interlace: bool,
    pub no_profile: bool,
    pub interpretation: Interpretation,
    pub output_icc: Option<PathBuf>,
    pub strip_metadata: bool,
    pub lossless: bool,
}

// =============================================================================
// PRESETS - Common configurations for web image delivery
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preset {
    /// 150x150 centre crop, WebP quality 75
    Thumbnail,
    /// 200x200 smart crop, WebP quality 80
    Avatar,
    /// 1920 wide, progressive JPEG quality 85
    Hero,
    /// 1200x630 (OGP / Twitter card), JPEG quality 80
    Social,
}

impl Preset {
    pub fn options(self) -> Options {
        match self {
            Preset::Thumbnail => Options {
                width: 150,
                height: 150,
                crop: true,
                image_type: Some(ImageType::Webp),
                quality: 75,
                ..Options::default()
            },
            Preset::Avatar => Options {
                width: 200,
                height: 200,
                crop: true,
                gravity: Gravity::Smart,
                image_type: Some(ImageType::Webp),
                quality: 80,
                ..Options::default()
            },
            Preset::Hero => Options {
                width: 1920,
                image_type: Some(ImageType::Jpeg),
                quality: 85,
                interlace: true,
                ..Options::default()
            },
            Preset::Social => Options {
                width: 1200,
                height: 630,
                crop: true,
                image_type: Some(ImageType::Jpeg),
                quality: 80,
                ..Options::default()
            },
        }
    }
}

impl FromStr for Preset {
    type Err = ResizeError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "thumbnail" => Ok(Preset::Thumbnail),
            "avatar" => Ok(Preset::Avatar),
            "hero" => Ok(Preset::Hero),
            "social" => Ok(Preset::Social),
            _ => Err(ResizeError::invalid_preset(name.to_string())),
        }
    }
}
