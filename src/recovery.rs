//! Access-loss recovery policy
//!
//! Distinguishes "the feed is gone" (needs a full reinitialize) from "this one attempt
//! failed" (safe to retry as-is). A run of transient failures is escalated to a loss once it
//! reaches the configured threshold.

/// Kind of failure observed on the capture path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Duplication channel reported access lost
    Lost,
    /// Any other acquire/copy/map/release failure
    Transient,
}

/// What the session must do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Stay ready; the caller may simply call again
    Retry,
    /// Lock the session until reinitialize
    LockUntilReinitialize,
}

#[derive(Debug, Clone)]
pub struct RecoveryController {
    max_consecutive_errors: u32,
    consecutive_errors: u32,
}

impl RecoveryController {
    /// `max_consecutive_errors == 0` disables escalation of transient failures
    pub fn new(max_consecutive_errors: u32) -> Self {
        Self {
            max_consecutive_errors,
            consecutive_errors: 0,
        }
    }

    /// A frame or a timeout came through cleanly
    pub fn on_success(&mut self) {
        self.consecutive_errors = 0;
    }

    pub fn on_failure(&mut self, kind: FailureKind) -> RecoveryAction {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);

        match kind {
            FailureKind::Lost => RecoveryAction::LockUntilReinitialize,
            FailureKind::Transient
                if self.max_consecutive_errors > 0
                    && self.consecutive_errors >= self.max_consecutive_errors =>
            {
                RecoveryAction::LockUntilReinitialize
            }
            FailureKind::Transient => RecoveryAction::Retry,
        }
    }

    /// Forget the current failure streak (new channel)
    pub fn reset(&mut self) {
        self.consecutive_errors = 0;
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }
}
