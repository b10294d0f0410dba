//! Typed error surface for the RHI.
//!
//! Creation functions return `Result<_, RhiError>`. Recording functions assert
//! preconditions and never fail at runtime; only creation, submission, and
//! presentation can fail.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RhiError {
    /// A resource this call depends on (e.g. a pipeline still compiling in the
    /// background) isn't ready yet. Callers should retry next frame.
    #[error("not ready: {0}")]
    NotReady(String),

    /// The swapchain is stale (resized, minimized, surface lost) and must be
    /// recreated before presenting again.
    #[error("swapchain out of date: {0}")]
    OutOfDate(String),

    /// A caller precondition was violated. Fatal: indicates a programming error.
    #[error("validation failure: {0}")]
    ValidationFailure(String),

    /// The GPU device was lost. Fatal, surfaced from any wait on device work.
    #[error("device lost: {0}")]
    DeviceLost(String),

    /// A single allocation failed (host or device out of memory). The device
    /// as a whole remains usable; the caller should handle this allocation's
    /// failure without assuming every future allocation will also fail.
    #[error("allocation failure: {0}")]
    AllocationFailure(String),
}

impl RhiError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RhiError::NotReady(_) | RhiError::OutOfDate(_))
    }
}
