// src/error.rs
//
// Unified error handling for image-resizer
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - InputError: empty/invalid buffer, file access, limits, bad arguments
// - UnsupportedFormat: decode or requested output type not supported
// - Geometry: invalid extract-area parameters
// - NativeOperation: any failure inside the imaging backend

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used by callers to decide whether to retry with adjusted options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Empty or invalid input buffer, unreadable file, limit violation
    InputError,
    /// Input format or requested output type is not supported
    UnsupportedFormat,
    /// Extract-area parameters could not be resolved
    Geometry,
    /// The imaging backend failed (decode, encode, transform, effect, watermark, trim)
    NativeOperation,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InputError => "InputError",
            ErrorCategory::UnsupportedFormat => "UnsupportedFormat",
            ErrorCategory::Geometry => "Geometry",
            ErrorCategory::NativeOperation => "NativeOperation",
        }
    }
}

/// image-resizer error types
#[derive(Debug, Error)]
pub enum ResizeError {
    // Input Errors
    #[error("image buffer is empty")]
    EmptyBuffer,

    #[error("File not found: {path}")]
    FileNotFound { path: Cow<'static, str> },

    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to memory-map file '{path}': {source}")]
    MmapFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    #[error("Input limit exceeded: {reason}")]
    LimitExceeded { reason: Cow<'static, str> },

    #[error("Unknown preset: '{name}'. Available: thumbnail, avatar, hero, social")]
    InvalidPreset { name: Cow<'static, str> },

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Format Errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("unsupported image output type: {format}")]
    UnsupportedOutputType { format: Cow<'static, str> },

    #[error("{format} doesn't support shrink on load")]
    ShrinkOnLoadUnsupported { format: Cow<'static, str> },

    #[error("Unsupported interpretation: {interpretation}")]
    UnsupportedInterpretation { interpretation: Cow<'static, str> },

    // Geometry Errors
    #[error("extract area width/height params are required")]
    ExtractAreaParamsRequired,

    // Native Operation Errors
    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("bad extract area ({left}+{width}, {top}+{height}) for {img_width}x{img_height} image")]
    ExtractOutOfBounds {
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    #[error("{operation} failed: {message}")]
    OperationFailed {
        operation: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

impl Clone for ResizeError {
    fn clone(&self) -> Self {
        fn copy_io(source: &std::io::Error) -> std::io::Error {
            std::io::Error::new(source.kind(), source.to_string())
        }

        match self {
            Self::EmptyBuffer => Self::EmptyBuffer,
            Self::FileNotFound { path } => Self::FileNotFound { path: path.clone() },
            Self::FileReadFailed { path, source } => Self::FileReadFailed {
                path: path.clone(),
                source: copy_io(source),
            },
            Self::MmapFailed { path, source } => Self::MmapFailed {
                path: path.clone(),
                source: copy_io(source),
            },
            Self::FileWriteFailed { path, source } => Self::FileWriteFailed {
                path: path.clone(),
                source: copy_io(source),
            },
            Self::DimensionExceedsLimit { dimension, max } => Self::DimensionExceedsLimit {
                dimension: *dimension,
                max: *max,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::LimitExceeded { reason } => Self::LimitExceeded {
                reason: reason.clone(),
            },
            Self::InvalidPreset { name } => Self::InvalidPreset { name: name.clone() },
            Self::InvalidArgument {
                name,
                value,
                reason,
            } => Self::InvalidArgument {
                name: name.clone(),
                value: value.clone(),
                reason: reason.clone(),
            },
            Self::UnsupportedFormat { format } => Self::UnsupportedFormat {
                format: format.clone(),
            },
            Self::UnsupportedOutputType { format } => Self::UnsupportedOutputType {
                format: format.clone(),
            },
            Self::ShrinkOnLoadUnsupported { format } => Self::ShrinkOnLoadUnsupported {
                format: format.clone(),
            },
            Self::UnsupportedInterpretation { interpretation } => {
                Self::UnsupportedInterpretation {
                    interpretation: interpretation.clone(),
                }
            }
            Self::ExtractAreaParamsRequired => Self::ExtractAreaParamsRequired,
            Self::DecodeFailed { message } => Self::DecodeFailed {
                message: message.clone(),
            },
            Self::EncodeFailed { format, message } => Self::EncodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::ExtractOutOfBounds {
                left,
                top,
                width,
                height,
                img_width,
                img_height,
            } => Self::ExtractOutOfBounds {
                left: *left,
                top: *top,
                width: *width,
                height: *height,
                img_width: *img_width,
                img_height: *img_height,
            },
            Self::ResizeFailed {
                source_width,
                source_height,
                target_width,
                target_height,
                message,
            } => Self::ResizeFailed {
                source_width: *source_width,
                source_height: *source_height,
                target_width: *target_width,
                target_height: *target_height,
                message: message.clone(),
            },
            Self::OperationFailed { operation, message } => Self::OperationFailed {
                operation: operation.clone(),
                message: message.clone(),
            },
            Self::InternalPanic { message } => Self::InternalPanic {
                message: message.clone(),
            },
        }
    }
}

// Constructor Helpers
impl ResizeError {
    pub fn empty_buffer() -> Self {
        Self::EmptyBuffer
    }

    pub fn file_not_found(path: impl Into<Cow<'static, str>>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn mmap_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::MmapFailed {
            path: path.into(),
            source,
        }
    }

    pub fn file_write_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn limit_exceeded(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::LimitExceeded {
            reason: reason.into(),
        }
    }

    pub fn invalid_preset(name: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidPreset { name: name.into() }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn unsupported_output_type(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedOutputType {
            format: format.into(),
        }
    }

    pub fn shrink_on_load_unsupported(format: impl Into<Cow<'static, str>>) -> Self {
        Self::ShrinkOnLoadUnsupported {
            format: format.into(),
        }
    }

    pub fn unsupported_interpretation(interpretation: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedInterpretation {
            interpretation: interpretation.into(),
        }
    }

    pub fn extract_area_params_required() -> Self {
        Self::ExtractAreaParamsRequired
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn extract_out_of_bounds(
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    ) -> Self {
        Self::ExtractOutOfBounds {
            left,
            top,
            width,
            height,
            img_width,
            img_height,
        }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn operation_failed(
        operation: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if the caller can fix this error by changing the input or options.
    ///
    /// Consistent with category(): only backend failures are treated as final.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.category(), ErrorCategory::NativeOperation)
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EmptyBuffer
            | Self::FileNotFound { .. }
            | Self::FileReadFailed { .. }
            | Self::MmapFailed { .. }
            | Self::FileWriteFailed { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::LimitExceeded { .. }
            | Self::InvalidPreset { .. }
            | Self::InvalidArgument { .. } => ErrorCategory::InputError,

            Self::UnsupportedFormat { .. }
            | Self::UnsupportedOutputType { .. }
            | Self::ShrinkOnLoadUnsupported { .. }
            | Self::UnsupportedInterpretation { .. } => ErrorCategory::UnsupportedFormat,

            Self::ExtractAreaParamsRequired => ErrorCategory::Geometry,

            Self::DecodeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::ExtractOutOfBounds { .. }
            | Self::ResizeFailed { .. }
            | Self::OperationFailed { .. }
            | Self::InternalPanic { .. } => ErrorCategory::NativeOperation,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, ResizeError>;
