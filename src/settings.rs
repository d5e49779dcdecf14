use serde::{Deserialize, Serialize};

use deskdup_capture::config;
use deskdup_capture::session::SessionConfig;

use crate::logging::LogLevel;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    // Capture
    #[serde(default = "default_output_index")]
    pub output_index: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u32,
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    // Logging
    #[serde(default = "default_log_level")]
    pub log_level: String, // "Off", "Error", "Warn", "Info", "Debug", "Trace"
    #[serde(default = "default_log_to_file")]
    pub log_to_file: bool,
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
}

// Default functions for serde
fn default_output_index() -> u32 {
    config::capture::DEFAULT_OUTPUT_INDEX
}

fn default_timeout_ms() -> u32 {
    config::capture::DEFAULT_TIMEOUT_MS
}

fn default_max_consecutive_errors() -> u32 {
    config::capture::MAX_CONSECUTIVE_ERRORS
}

fn default_log_level() -> String {
    config::logging::DEFAULT_LOG_LEVEL.to_string()
}

fn default_log_to_file() -> bool {
    false // Console only unless asked
}

fn default_log_retention_days() -> u32 {
    config::logging::LOG_RETENTION_DAYS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_index: default_output_index(),
            timeout_ms: default_timeout_ms(),
            max_consecutive_errors: default_max_consecutive_errors(),
            log_level: default_log_level(),
            log_to_file: default_log_to_file(),
            log_retention_days: default_log_retention_days(),
        }
    }
}

impl Settings {
    /// Parsed log level, falling back to Info on garbage
    pub fn log_level(&self) -> LogLevel {
        self.log_level.parse().unwrap_or_else(|e| {
            eprintln!("{}, using Info", e);
            LogLevel::Info
        })
    }

    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_consecutive_errors: self.max_consecutive_errors,
        }
    }
}
