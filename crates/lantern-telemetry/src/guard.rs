//! Failure suppression at the public API boundary.
//!
//! Telemetry must degrade to "stop reporting", never to "crash the host".
//! Public entry points run their body through [`guard`], which turns both
//! `Err` results and panics into a default value and records the failure
//! under this crate's own log target, which [`crate::interceptor::CaptureLayer`]
//! ignores.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::TelemetryError;

/// Run `operation`, swallowing errors and panics.
pub(crate) fn guard<T, F>(operation: &'static str, f: F) -> T
where
    T: Default,
    F: FnOnce() -> Result<T, TelemetryError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            tracing::debug!(operation, error = %e, "Telemetry operation failed, suppressed");
            T::default()
        }
        Err(_) => {
            tracing::debug!(operation, "Telemetry operation panicked, suppressed");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_success() {
        assert_eq!(guard("ok", || Ok::<_, TelemetryError>(7)), 7);
    }

    #[test]
    fn error_becomes_default() {
        let id: String = guard("fail", || Err(TelemetryError::Destroyed));
        assert!(id.is_empty());
    }

    #[test]
    fn panic_becomes_default() {
        let value: Option<u32> = guard("panic", || -> Result<Option<u32>, TelemetryError> {
            panic!("lantern-telemetry internal failure")
        });
        assert!(value.is_none());
    }
}
