// src/engine/common.rs
//
// Common utilities shared across engine modules.

use crate::error::{ImgBatchError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Run a fallible closure, converting panics into an InternalPanic error.
/// Codec code occasionally panics on malformed input; a panicking item must
/// surface as that item's error, not tear down the whole batch.
pub(crate) fn run_with_panic_policy<T>(
    label: &str,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ImgBatchError::internal_panic(format!(
                "panic in {label}: {message}"
            )))
        }
    }
}

/// Milliseconds since the Unix epoch, for progress timestamps.
pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
