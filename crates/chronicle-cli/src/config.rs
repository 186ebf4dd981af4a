//! `chronicle.toml` loading.

use chronicle_autosave::AutoSaveConfig;
use chronicle_core::{ChronicleError, ChronicleResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "chronicle.toml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChronicleConfig {
    /// Location of the persisted session collection.
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    /// Autosave loop settings.
    #[serde(default)]
    pub auto_save: AutoSaveConfig,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/sessions.json")
}

impl Default for ChronicleConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            auto_save: AutoSaveConfig::default(),
        }
    }
}

/// Resolve the config to use.
///
/// An explicitly requested file must exist; the default file is optional and
/// its absence yields [`ChronicleConfig::default`]. Relative paths inside the
/// file are resolved against the file's directory.
pub fn load_config(explicit: Option<&Path>) -> ChronicleResult<ChronicleConfig> {
    let path = explicit.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    if explicit.is_none() && !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(ChronicleConfig::default());
    }

    let mut config = parse_config(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.storage_path = resolve(base, &config.storage_path);
    config.auto_save.watch_directories = config
        .auto_save
        .watch_directories
        .iter()
        .map(|dir| resolve(base, dir))
        .collect();
    config.auto_save.validate()?;
    Ok(config)
}

/// Read and parse a TOML config file.
pub fn parse_config(path: &Path) -> ChronicleResult<ChronicleConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ChronicleError::Config(format!(
            "Failed to read config '{}': {}",
            path.display(),
            e
        ))
    })?;
    toml::from_str(&content).map_err(|e| {
        ChronicleError::Config(format!(
            "Failed to parse config '{}': {}",
            path.display(),
            e
        ))
    })
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
