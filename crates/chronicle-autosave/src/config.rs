use crate::patterns::WatchPatterns;
use chronicle_core::{ChronicleError, ChronicleResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Autosave settings, read from the `[auto_save]` table of `chronicle.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoSaveConfig {
    /// Whether `start()` actually starts the loop.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minutes between ticks.
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// When non-empty, only files under one of these directories are captured.
    #[serde(default)]
    pub watch_directories: Vec<PathBuf>,
    /// Glob patterns; a file is eligible if its name matches at least one.
    #[serde(default = "default_file_patterns")]
    pub file_patterns: Vec<String>,
    /// Minutes of inactivity. Currently informational only.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

fn default_enabled() -> bool {
    true
}
fn default_interval() -> u64 {
    5
}
fn default_file_patterns() -> Vec<String> {
    vec!["*.md".to_string(), "*.txt".to_string()]
}
fn default_idle_timeout() -> u64 {
    30
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval: default_interval(),
            watch_directories: Vec::new(),
            file_patterns: default_file_patterns(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

impl AutoSaveConfig {
    /// Tick period derived from [`interval`](Self::interval).
    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs(self.interval.saturating_mul(60))
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> ChronicleResult<()> {
        if self.interval == 0 {
            return Err(ChronicleError::Config(
                "auto_save.interval must be at least 1 minute".to_string(),
            ));
        }
        WatchPatterns::new(self.file_patterns.as_slice())?;
        Ok(())
    }
}
