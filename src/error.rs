//! Error taxonomy for capture sessions
//!
//! Setup failures carry the step that failed plus the underlying driver code so a caller can
//! decide on remediation (e.g. re-picking an output). Timeouts are never errors; see
//! [`crate::frame::CaptureOutcome::NoNewFrame`].

use thiserror::Error;

/// Errors surfaced by [`crate::session::CaptureSession`] and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// No compatible GPU device could be created. Retrying without environment changes is pointless.
    #[error("Failed to create graphics device ({step}): {detail}")]
    DeviceCreation { step: &'static str, detail: String },

    /// The requested output does not exist on the chosen adapter.
    #[error("Output index {index} out of range ({available} outputs attached to adapter)")]
    InvalidOutputIndex { index: u32, available: u32 },

    /// Duplication is held by another process or not supported by the driver.
    #[error("Desktop duplication unavailable ({step}): {detail}")]
    DuplicationUnavailable { step: &'static str, detail: String },

    /// The CPU-readable staging surface could not be allocated.
    #[error("Failed to allocate {width}x{height} staging surface: {detail}")]
    StagingAllocation {
        width: u32,
        height: u32,
        detail: String,
    },

    /// `capture_frame` was called before a successful `initialize`.
    #[error("Capture session not initialized. Call initialize() first")]
    NotInitialized,

    /// The duplication feed is gone; only `reinitialize` recovers.
    #[error("Desktop duplication access lost. Call reinitialize()")]
    AccessLost,

    /// A single capture attempt failed; the session stays usable.
    #[error("Frame capture failed ({step}): {detail}")]
    Capture { step: &'static str, detail: String },

    /// A capture is already in flight on this worker.
    #[error("A capture is already in flight for this session")]
    Busy,

    /// The capture worker thread has shut down.
    #[error("Capture worker is no longer running")]
    WorkerClosed,
}

impl CaptureError {
    /// Whether calling `capture_frame` again as-is may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaptureError::Capture { .. } | CaptureError::Busy)
    }

    /// Whether the error came out of `initialize`/`reinitialize`.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            CaptureError::DeviceCreation { .. }
                | CaptureError::InvalidOutputIndex { .. }
                | CaptureError::DuplicationUnavailable { .. }
                | CaptureError::StagingAllocation { .. }
        )
    }

    pub(crate) fn capture(step: &'static str, detail: impl Into<String>) -> Self {
        CaptureError::Capture {
            step,
            detail: detail.into(),
        }
    }
}

/// Render a Windows error with its HRESULT for inclusion in a `detail` string.
#[cfg(target_os = "windows")]
pub(crate) fn describe_hresult(err: &windows::core::Error) -> String {
    format!("{} (HRESULT 0x{:08X})", err.message(), err.code().0 as u32)
}
