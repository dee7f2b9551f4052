// src/engine/common.rs
//
// Common utilities shared across engine modules.

use crate::error::ResizeError;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub type EngineResult<T> = std::result::Result<T, ResizeError>;

/// Run a codec or pixel operation, turning a panic inside third-party code
/// into a `NativeOperation` error tagged with `label`.
pub fn run_with_panic_policy<T, F>(label: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            tracing::warn!(stage = label, %message, "panic caught in native operation");
            Err(ResizeError::internal_panic(format!("{label}: {message}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_ok_and_err() {
        assert_eq!(run_with_panic_policy("ok", || Ok(3)).unwrap(), 3);
        let err = run_with_panic_policy::<(), _>("err", || Err(ResizeError::empty_buffer()))
            .unwrap_err();
        assert!(matches!(err, ResizeError::EmptyBuffer));
    }

    #[test]
    fn converts_panic_to_error() {
        let err = run_with_panic_policy::<(), _>("boom", || panic!("kaboom")).unwrap_err();
        match err {
            ResizeError::InternalPanic { message } => {
                assert!(message.contains("boom"));
                assert!(message.contains("kaboom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
