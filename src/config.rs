//! Capture Configuration Constants
//!
//! Centralized defaults for timeouts, recovery thresholds, and environment keys.

/// Capture Session Configuration
pub mod capture {
    /// Output captured when the caller doesn't pick one (0 = primary)
    pub const DEFAULT_OUTPUT_INDEX: u32 = 0;

    /// Default wait for a new frame (milliseconds)
    pub const DEFAULT_TIMEOUT_MS: u32 = 100;

    /// Bytes per BGRA pixel
    pub const BYTES_PER_PIXEL: u32 = 4;

    /// Consecutive transient errors before a session is treated as lost (0 = never)
    pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;

    /// Emit a progress log line every N captured frames
    pub const LOG_EVERY_N_FRAMES: u64 = 300;
}

/// Logging Configuration
pub mod logging {
    /// Log retention period in days
    pub const LOG_RETENTION_DAYS: u32 = 14;

    /// Default log level when nothing is configured
    pub const DEFAULT_LOG_LEVEL: &str = "Info";

    /// File name prefix for the rolling log
    pub const LOG_FILE_NAME: &str = "deskdup.log";
}

/// Environment Overrides
pub mod env {
    /// Overrides the configured log level, e.g. `DESKDUP_LOG=debug`
    pub const LOG_LEVEL_ENV: &str = "DESKDUP_LOG";

    /// Overrides the configured output index, e.g. `DESKDUP_OUTPUT=1`
    pub const OUTPUT_INDEX_ENV: &str = "DESKDUP_OUTPUT";
}
