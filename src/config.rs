//! Service configuration.
//!
//! Settings come from an optional `config.toml`, layered on top of stock
//! defaults: the defaults are serialized to a TOML table, the user file is
//! merged over it key by key, and the result is deserialized and validated.
//! A config file only needs the keys it changes.
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! storage_root = "uploads"   # Where session directories live
//!
//! [processing]
//! max_workers = 4            # Parallel conversions (omit for auto = CPU cores)
//!
//! [output]
//! quality = 90               # JPEG/AVIF quality (1-100)
//! compression = "deflated"   # Archive entries: "deflated" or "stored"
//!
//! [formats]
//! enabled = ["png", "jpeg", "webp", "tiff", "bmp", "gif", "avif"]
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::archive::ArchiveCompression;
use crate::format::ImageKind;
use crate::imaging::{ConversionOptions, Quality};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File picked up from the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Directory holding one subdirectory per session.
    pub storage_root: PathBuf,
    pub processing: ProcessingConfig,
    pub output: OutputConfig,
    pub formats: FormatsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("uploads"),
            processing: ProcessingConfig::default(),
            output: OutputConfig::default(),
            formats: FormatsConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.output.quality) {
            return Err(ConfigError::Validation(
                "output.quality must be 1-100".into(),
            ));
        }
        if self.processing.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_workers must be at least 1".into(),
            ));
        }
        if self.formats.enabled.is_empty() {
            return Err(ConfigError::Validation(
                "formats.enabled must not be empty".into(),
            ));
        }
        if let Some(kind) = self.formats.enabled.iter().find(|k| !k.has_encoder()) {
            return Err(ConfigError::Validation(format!(
                "formats.enabled: no encoder available for {kind}"
            )));
        }
        if self.storage_root.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "storage_root must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Default per-request options derived from `[output]`.
    pub fn conversion_options(&self) -> ConversionOptions {
        ConversionOptions {
            quality: Quality::new(self.output.quality),
            resize: None,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of files converted at the same time.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_workers: Option<usize>,
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_workers.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Encoder and archive settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Quality for lossy encoders.
    pub quality: u32,
    pub compression: ArchiveCompression,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            quality: Quality::default().value(),
            compression: ArchiveCompression::default(),
        }
    }
}

/// Which target formats the service accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatsConfig {
    pub enabled: Vec<ImageKind>,
}

impl Default for FormatsConfig {
    fn default() -> Self {
        Self {
            enabled: ImageKind::ALL
                .into_iter()
                .filter(|kind| kind.has_encoder())
                .collect(),
        }
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(AppConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<AppConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AppConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration.
///
/// With an explicit `path` the file must exist. Without one,
/// [`DEFAULT_CONFIG_FILE`] in the working directory is used when present,
/// and the stock defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let overlay = match path {
        Some(path) => Some(read_toml(path)?),
        None => {
            let fallback = Path::new(DEFAULT_CONFIG_FILE);
            if fallback.is_file() {
                Some(read_toml(fallback)?)
            } else {
                None
            }
        }
    };
    resolve_config(overlay)
}

fn read_toml(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Returns a fully-commented stock `config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# batch-convert configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Directory holding one subdirectory per session:
#   <storage_root>/<session>/uploads/      originals
#   <storage_root>/<session>/converted/    artifacts
#   <storage_root>/<session>/<session>.zip archive of the latest conversion
storage_root = "uploads"

# ---------------------------------------------------------------------------
# Parallel processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of files converted at the same time.
# Omit to use all CPU cores. Values above the core count are clamped down.
# max_workers = 4

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
# Quality for lossy encoders (JPEG, AVIF), 1-100.
quality = 90

# How files are stored in the archive: "deflated" or "stored".
compression = "deflated"

# ---------------------------------------------------------------------------
# Formats
# ---------------------------------------------------------------------------
[formats]
# Target formats conversions may be requested in.
# Accepted names: png, jpeg (jpg), webp, tiff (tif), bmp, gif, avif.
# HEIC can be recognized as a source but has no encoder.
enabled = ["png", "jpeg", "webp", "tiff", "bmp", "gif", "avif"]
"##
}
