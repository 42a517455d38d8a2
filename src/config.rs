//! Runner configuration
//!
//! Collected from CLI flags and their `SECTOOLBOX_*` environment fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use crate::results::SaveFormat;

/// Default per-test time budget in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default directory for saved results
pub const DEFAULT_RESULTS_DIR: &str = "results";

/// Settings shared by the interactive and headless runners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Wall-clock budget for a single test run
    pub timeout: Duration,
    /// Save every result in this format without asking
    pub save: Option<SaveFormat>,
    /// Where file sinks write
    pub results_dir: PathBuf,
    /// Whether console output uses ANSI colors
    pub color: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            save: None,
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            color: true,
        }
    }
}

impl RunnerConfig {
    /// Create a new config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-test time budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Save every result in `format`
    pub fn with_save(mut self, format: Option<SaveFormat>) -> Self {
        self.save = format;
        self
    }

    /// Set the results directory
    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }
}
