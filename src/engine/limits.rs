// src/engine/limits.rs
//
// Input limits: caps on encoded byte length and decoded pixel count,
// applied before any pixel work. The global MAX_DIMENSION / MAX_PIXELS
// checks in the decoder always apply on top of these.

use crate::error::ResizeError;

const STRICT_MAX_PIXELS: u64 = 40_000_000; // ~8K x 5K
const LENIENT_MAX_PIXELS: u64 = 75_000_000;
const STRICT_MAX_BYTES: u64 = 32 * 1024 * 1024;
const LENIENT_MAX_BYTES: u64 = 48 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LimitPolicy {
    #[default]
    Disabled,
    Strict,
    Lenient,
    Custom,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Limits {
    pub policy: LimitPolicy,
    pub max_pixels: Option<u64>,
    pub max_bytes: Option<u64>,
}

impl Limits {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self {
            policy: LimitPolicy::Strict,
            max_pixels: Some(STRICT_MAX_PIXELS),
            max_bytes: Some(STRICT_MAX_BYTES),
        }
    }

    pub fn lenient() -> Self {
        Self {
            policy: LimitPolicy::Lenient,
            max_pixels: Some(LENIENT_MAX_PIXELS),
            max_bytes: Some(LENIENT_MAX_BYTES),
        }
    }

    /// Caller-chosen caps. `None` leaves that dimension unbounded.
    pub fn custom(max_pixels: Option<u64>, max_bytes: Option<u64>) -> Self {
        Self {
            policy: LimitPolicy::Custom,
            max_pixels,
            max_bytes,
        }
    }

    pub fn from_policy(policy: LimitPolicy) -> Self {
        match policy {
            LimitPolicy::Disabled => Self::disabled(),
            LimitPolicy::Strict => Self::strict(),
            LimitPolicy::Lenient => Self::lenient(),
            LimitPolicy::Custom => Self::custom(None, None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.policy != LimitPolicy::Disabled
    }

    pub fn enforce_source_len(&self, len: usize) -> Result<(), ResizeError> {
        if !self.is_enabled() {
            return Ok(());
        }
        match self.max_bytes {
            Some(limit) if len as u64 > limit => Err(ResizeError::limit_exceeded(format!(
                "input size {len} bytes exceeds limit of {limit} bytes"
            ))),
            _ => Ok(()),
        }
    }

    pub fn enforce_pixels(&self, width: u32, height: u32) -> Result<(), ResizeError> {
        if !self.is_enabled() {
            return Ok(());
        }
        let pixels = width as u64 * height as u64;
        match self.max_pixels {
            Some(limit) if pixels > limit => Err(ResizeError::limit_exceeded(format!(
                "{width}x{height} ({pixels} pixels) exceeds limit of {limit} pixels"
            ))),
            _ => Ok(()),
        }
    }
}
