//! Watcher configuration.
//!
//! Handles loading, merging and validating `webp-watch.toml`. The file is
//! optional: stock defaults describe the conventional setup (an `index.ts`
//! with an `export const Img = {` block, PNG/JPEG sources), and a config file
//! only needs the keys it wants to change.
//!
//! ## Config File Location
//!
//! ```text
//! assets/
//! ├── webp-watch.toml        # Optional, read from the watched directory
//! ├── index.ts               # The manifest (must exist)
//! ├── hero.png
//! └── hero.webp
//! ```
//!
//! A different file can be passed with `--config`.
//!
//! ## Configuration Options
//!
//! ```toml
//! # Every key may be omitted; the values below are the defaults
//!
//! [manifest]
//! file = "index.ts"                   # Manifest file inside the watched directory
//! export_marker = "export const Img =" # Opening line of the export block
//! indent = "    "                     # Entry indent when the block is empty
//! identifiers = "sanitize"            # or "reject"
//!
//! [convert]
//! extensions = ["png", "jpg", "jpeg"] # Source extensions (case-insensitive)
//!
//! [watch]
//! recursive = false                   # Also watch subdirectories
//! settle_ms = 500                     # Quiet period before converting a new file
//!
//! [processing]
//! max_processes = 4                   # Bootstrap workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are a `ConfigError::Toml`.

use crate::imaging::supported_input_extensions;
use crate::manifest::SyncOptions;
use crate::naming::{IdentifierPolicy, TARGET_EXTENSION};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path};
use std::time::Duration;
use thiserror::Error;

/// Name of the config file looked up in the watched directory.
pub const CONFIG_FILENAME: &str = "webp-watch.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `webp-watch.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Manifest location and textual conventions.
    pub manifest: ManifestConfig,
    /// Which files are converted.
    pub convert: ConvertConfig,
    /// Change-source behavior.
    pub watch: WatchSettings,
    /// Worker count for the bootstrap scan.
    pub processing: ProcessingConfig,
}

impl WatchConfig {
    /// Reject settings the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let file = Path::new(&self.manifest.file);
        let plain_relative = !self.manifest.file.is_empty()
            && file
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain_relative {
            return Err(ConfigError::Validation(
                "manifest.file must be a relative path inside the watched directory".into(),
            ));
        }
        if self.manifest.export_marker.trim().is_empty() {
            return Err(ConfigError::Validation(
                "manifest.export_marker must not be empty".into(),
            ));
        }
        if !self.manifest.indent.chars().all(|c| c == ' ' || c == '\t') {
            return Err(ConfigError::Validation(
                "manifest.indent must contain only spaces and tabs".into(),
            ));
        }
        if self.convert.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "convert.extensions must not be empty".into(),
            ));
        }
        let decodable = supported_input_extensions();
        for ext in &self.convert.extensions {
            if ext.eq_ignore_ascii_case(TARGET_EXTENSION) {
                return Err(ConfigError::Validation(format!(
                    "convert.extensions must not include the target extension `{TARGET_EXTENSION}`"
                )));
            }
            if !decodable.iter().any(|d| d.eq_ignore_ascii_case(ext)) {
                return Err(ConfigError::Validation(format!(
                    "convert.extensions: no decoder for `{ext}` (supported: {})",
                    decodable.join(", ")
                )));
            }
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Manifest location and the text conventions the synchronizer recognizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManifestConfig {
    /// Manifest path relative to the watched directory.
    pub file: String,
    /// Substring identifying the opening line of the export aggregate.
    pub export_marker: String,
    /// Entry indentation used when the export block has no entries yet.
    pub indent: String,
    /// How file stems that are not valid identifiers are handled.
    pub identifiers: IdentifierPolicy,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        let options = SyncOptions::default();
        Self {
            file: "index.ts".to_string(),
            export_marker: options.export_marker,
            indent: options.indent,
            identifiers: options.identifiers,
        }
    }
}

impl ManifestConfig {
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            export_marker: self.export_marker.clone(),
            indent: self.indent.clone(),
            identifiers: self.identifiers,
        }
    }
}

/// Conversion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertConfig {
    /// Source extensions without the dot, matched case-insensitively.
    pub extensions: Vec<String>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()],
        }
    }
}

/// Change-source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchSettings {
    /// Watch subdirectories too. The bootstrap scan is always recursive.
    pub recursive: bool,
    /// Milliseconds a new file must stay unchanged before it is converted.
    pub settle_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            recursive: false,
            settle_ms: 500,
        }
    }
}

impl WatchSettings {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Bootstrap scan parallelism.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Upper bound on parallel transcodes during the bootstrap scan.
    /// Unset means one per CPU core; larger values are clamped to the core count.
    pub max_processes: Option<usize>,
}

/// Number of rayon workers for the bootstrap scan: `max_processes` clamped
/// to the available cores, or all cores when unset.
pub fn effective_threads(processing: &ProcessingConfig) -> usize {
    let available = std::thread::available_parallelism().map_or(1, |n| n.get());
    match processing.max_processes {
        Some(limit) => limit.min(available),
        None => available,
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(WatchConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Lay `overlay` over `base`, descending into tables.
///
/// A key present in both tables is merged recursively; any other overlay
/// value (including arrays) replaces the base value. Base keys the overlay
/// does not mention survive.
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

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(config_path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<WatchConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: WatchConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config for a watched directory.
///
/// Reads `explicit` when given (it must exist), otherwise
/// `<dir>/webp-watch.toml` if present, falling back to the stock defaults.
pub fn load_config(dir: &Path, explicit: Option<&Path>) -> Result<WatchConfig, ConfigError> {
    let overlay = match explicit {
        Some(path) => Some(toml::from_str(&fs::read_to_string(path)?)?),
        None => load_raw_config(&dir.join(CONFIG_FILENAME))?,
    };
    resolve_config(overlay)
}

/// Returns a fully-commented stock `webp-watch.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# webp-watch configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file in the watched directory as webp-watch.toml, or pass it
# with --config. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Manifest (the generated index module)
# ---------------------------------------------------------------------------
[manifest]
# Manifest path relative to the watched directory. Must exist at startup.
file = "index.ts"

# Text that marks the opening line of the export block. Entries are inserted
# just before the first following line containing "}".
export_marker = "export const Img ="

# Indentation for new entries when the block has no entries to copy it from.
indent = "    "

# File stems that are not valid identifiers (2x-logo, class, ...):
#   "sanitize" -> rewritten (_2x_logo, _class)
#   "reject"   -> converted, but not added to the manifest
identifiers = "sanitize"

# ---------------------------------------------------------------------------
# Conversion
# ---------------------------------------------------------------------------
[convert]
# Source extensions, matched case-insensitively. Converted files are WebP.
extensions = ["png", "jpg", "jpeg"]

# ---------------------------------------------------------------------------
# Watching
# ---------------------------------------------------------------------------
[watch]
# Watch subdirectories as well. The startup scan is always recursive.
recursive = false

# Milliseconds a new file must stay unchanged before it is converted, so
# files that are still being copied are not read half-written.
settle_ms = 500

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel transcode workers for the startup scan.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = WatchConfig::default();
        assert_eq!(config.manifest.file, "index.ts");
        assert_eq!(config.manifest.export_marker, "export const Img =");
        assert_eq!(config.manifest.indent, "    ");
        assert_eq!(config.manifest.identifiers, IdentifierPolicy::Sanitize);
        assert_eq!(config.convert.extensions, vec!["png", "jpg", "jpeg"]);
        assert!(!config.watch.recursive);
        assert_eq!(config.watch.settle(), Duration::from_millis(500));
        assert_eq!(config.processing.max_processes, None);
    }

    #[test]
    fn default_config_is_valid() {
        WatchConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[manifest]
identifiers = "reject"
"#;
        let config = resolve_config(Some(toml::from_str(toml).unwrap())).unwrap();
        assert_eq!(config.manifest.identifiers, IdentifierPolicy::Reject);
        // Defaults preserved
        assert_eq!(config.manifest.file, "index.ts");
        assert_eq!(config.convert.extensions, vec!["png", "jpg", "jpeg"]);
    }

    #[test]
    fn sync_options_follow_manifest_config() {
        let mut config = ManifestConfig::default();
        config.export_marker = "export const Icons =".to_string();
        config.indent = "\t".to_string();
        let options = config.sync_options();
        assert_eq!(options.export_marker, "export const Icons =");
        assert_eq!(options.indent, "\t");
        assert_eq!(options.identifiers, IdentifierPolicy::Sanitize);
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let value: toml::Value = toml::from_str(stock_config_toml()).unwrap();
        let config = resolve_config(Some(value)).unwrap();
        assert_eq!(config, WatchConfig::default());
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn invalid(toml: &str) -> String {
        match resolve_config(Some(toml::from_str(toml).unwrap())) {
            Err(ConfigError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_keys() {
        let result = resolve_config(Some(toml::from_str("[manifest]\nfiel = \"x.ts\"").unwrap()));
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn rejects_empty_extensions() {
        assert!(invalid("[convert]\nextensions = []").contains("must not be empty"));
    }

    #[test]
    fn rejects_target_extension_as_source() {
        assert!(invalid("[convert]\nextensions = [\"png\", \"WEBP\"]").contains("target"));
    }

    #[test]
    fn rejects_undecodable_extension() {
        assert!(invalid("[convert]\nextensions = [\"bmp\"]").contains("no decoder for `bmp`"));
    }

    #[test]
    fn extension_case_is_irrelevant() {
        let value = toml::from_str("[convert]\nextensions = [\"PNG\", \"Jpg\"]").unwrap();
        assert!(resolve_config(Some(value)).is_ok());
    }

    #[test]
    fn rejects_manifest_outside_directory() {
        assert!(invalid("[manifest]\nfile = \"../index.ts\"").contains("manifest.file"));
        assert!(invalid("[manifest]\nfile = \"/abs/index.ts\"").contains("manifest.file"));
        assert!(invalid("[manifest]\nfile = \"\"").contains("manifest.file"));
    }

    #[test]
    fn manifest_in_subdirectory_is_allowed() {
        let value = toml::from_str("[manifest]\nfile = \"generated/index.ts\"").unwrap();
        assert!(resolve_config(Some(value)).is_ok());
    }

    #[test]
    fn rejects_blank_marker_and_bad_indent() {
        assert!(invalid("[manifest]\nexport_marker = \"  \"").contains("export_marker"));
        assert!(invalid("[manifest]\nindent = \"--\"").contains("indent"));
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(invalid("[processing]\nmax_processes = 0").contains("max_processes"));
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn merge_overrides_nested_keys_only() {
        let base: toml::Value =
            toml::from_str("[watch]\nrecursive = false\nsettle_ms = 500").unwrap();
        let overlay: toml::Value = toml::from_str("[watch]\nsettle_ms = 50").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["watch"]["recursive"].as_bool(), Some(false));
        assert_eq!(merged["watch"]["settle_ms"].as_integer(), Some(50));
    }

    #[test]
    fn merge_replaces_arrays() {
        let base: toml::Value = toml::from_str("extensions = [\"png\", \"jpg\"]").unwrap();
        let overlay: toml::Value = toml::from_str("extensions = [\"jpeg\"]").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["extensions"].as_array().unwrap().len(), 1);
    }

    // =========================================================================
    // load_config
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path(), None).unwrap();
        assert_eq!(config, WatchConfig::default());
    }

    #[test]
    fn load_config_reads_directory_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            "[watch]\nrecursive = true\nsettle_ms = 0\n",
        )
        .unwrap();

        let config = load_config(tmp.path(), None).unwrap();
        assert!(config.watch.recursive);
        assert_eq!(config.watch.settle_ms, 0);
        assert_eq!(config.manifest.file, "index.ts");
    }

    #[test]
    fn explicit_config_wins_over_directory_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "[watch]\nsettle_ms = 1\n").unwrap();
        let explicit = tmp.path().join("other.toml");
        fs::write(&explicit, "[watch]\nsettle_ms = 2\n").unwrap();

        let config = load_config(tmp.path(), Some(&explicit)).unwrap();
        assert_eq!(config.watch.settle_ms, 2);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let result = load_config(tmp.path(), Some(&tmp.path().join("nope.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "[watch\n").unwrap();
        assert!(matches!(
            load_config(tmp.path(), None),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn effective_threads_clamps_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(cores + 100),
        };
        assert_eq!(effective_threads(&config), cores);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
        let one = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&one), 1);
    }
}
