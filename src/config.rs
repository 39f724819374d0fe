//! Ingest configuration.
//!
//! Settings are read from a single TOML file (`photo-ingest.toml` in the
//! working directory unless `--config` names another). Every key is optional;
//! user values are merged over the stock defaults and the result is validated
//! before anything on disk is touched.
//!
//! ## Configuration Options
//!
//! ```toml
//! dry_run = false
//!
//! [paths]
//! asset_root = "public"          # Manifest keys are relative to this
//! archive_root = "originals"     # Raw files are moved here, mirroring asset_root
//! manifest = "public/assets.json"
//! model_dir = "models"           # Holds seeta_fd_frontal_v1.0.bin
//!
//! [faces]
//! enabled = true
//! min_face_size = 20             # Pixels; the detector's floor is 20
//! score_threshold = 2.0
//!
//! [encoding]
//! quality = 80                   # Lossy WebP quality (0-100)
//!
//! [missing]
//! threshold_days = 30
//! purge = true
//!
//! [safety]
//! min_detection_ratio = 0.8
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Looked up in the working directory when no path is given.
pub const CONFIG_FILE: &str = "photo-ingest.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Full run configuration.
///
/// Constructed once, adjusted by CLI flags, then passed by reference into
/// every stage. Nothing reads configuration from anywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Report what would happen without writing, encoding or moving anything.
    pub dry_run: bool,
    pub paths: PathsConfig,
    pub faces: FacesConfig,
    pub encoding: EncodingConfig,
    pub missing: MissingConfig,
    pub safety: SafetyConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            paths: PathsConfig::default(),
            faces: FacesConfig::default(),
            encoding: EncodingConfig::default(),
            missing: MissingConfig::default(),
            safety: SafetyConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.encoding.quality > 100 {
            return Err(ConfigError::Validation(
                "encoding.quality must be 0-100".into(),
            ));
        }
        let ratio = self.safety.min_detection_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::Validation(
                "safety.min_detection_ratio must be between 0.0 and 1.0".into(),
            ));
        }
        if self.faces.min_face_size < 20 {
            return Err(ConfigError::Validation(
                "faces.min_face_size must be at least 20".into(),
            ));
        }
        if !self.faces.score_threshold.is_finite() {
            return Err(ConfigError::Validation(
                "faces.score_threshold must be a finite number".into(),
            ));
        }
        let asset_root = lexical(&self.paths.asset_root);
        let archive_root = lexical(&self.paths.archive_root);
        if archive_root.starts_with(&asset_root) || asset_root.starts_with(&archive_root) {
            return Err(ConfigError::Validation(format!(
                "paths.archive_root ({}) and paths.asset_root ({}) must not contain each other",
                self.paths.archive_root.display(),
                self.paths.asset_root.display()
            )));
        }
        Ok(())
    }
}

/// Drop `.` components so `./public` and `public` compare equal.
fn lexical(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Filesystem locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Root of the publicly served asset tree.
    pub asset_root: PathBuf,
    /// Where raw originals are moved after conversion.
    pub archive_root: PathBuf,
    /// Manifest JSON file.
    pub manifest: PathBuf,
    /// Directory holding the face detection model.
    pub model_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("public"),
            archive_root: PathBuf::from("originals"),
            manifest: PathBuf::from("public/assets.json"),
            model_dir: PathBuf::from("models"),
        }
    }
}

/// Face detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FacesConfig {
    pub enabled: bool,
    /// Smallest face edge, in pixels, the detector looks for.
    pub min_face_size: u32,
    /// Minimum classifier score for a box to count as a face.
    pub score_threshold: f64,
}

impl Default for FacesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_face_size: 20,
            score_threshold: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    /// Lossy WebP quality (0-100).
    pub quality: u32,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self { quality: 80 }
    }
}

/// Missing-file lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MissingConfig {
    /// Days an entry may stay missing before it is purged.
    pub threshold_days: u32,
    /// Remove stale entries after the missing check.
    pub purge: bool,
}

impl Default for MissingConfig {
    fn default() -> Self {
        Self {
            threshold_days: 30,
            purge: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SafetyConfig {
    /// Fraction of raw files on which face detection must complete.
    pub min_detection_ratio: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            min_detection_ratio: 0.8,
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(IngestConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config does not serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
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

fn read_toml(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Load configuration.
///
/// With `Some(path)` the file must exist. With `None`, [`CONFIG_FILE`] in the
/// working directory is used when present, otherwise the stock defaults.
pub fn load_config(path: Option<&Path>) -> Result<IngestConfig, ConfigError> {
    let overlay = match path {
        Some(path) => Some(read_toml(path)?),
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                Some(read_toml(default_path)?)
            } else {
                None
            }
        }
    };
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(overlay) => merge_toml(base, overlay),
        None => base,
    };
    let config: IngestConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# photo-ingest configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Report what would happen without encoding, writing or moving anything.
dry_run = false

# ---------------------------------------------------------------------------
# Locations
# ---------------------------------------------------------------------------
[paths]
# Publicly served asset tree. Raw photos dropped here are converted to WebP
# next to where they were found. Manifest keys are relative to this directory.
asset_root = "public"

# Raw originals are moved here after conversion, mirroring their position
# under asset_root. Must not be inside asset_root (or the other way around).
archive_root = "originals"

# Manifest of every encoded asset: dimensions, face focus, missing state.
manifest = "public/assets.json"

# Directory holding the SeetaFace model file seeta_fd_frontal_v1.0.bin.
model_dir = "models"

# ---------------------------------------------------------------------------
# Face detection
# ---------------------------------------------------------------------------
[faces]
# Detect the most prominent face on each new photo and record its center
# as the asset's focus point. Existing focus points are never replaced.
enabled = true

# Smallest face, in pixels, the detector looks for (minimum 20).
min_face_size = 20

# Classifier score a candidate box needs to count as a face.
score_threshold = 2.0

# ---------------------------------------------------------------------------
# Encoding
# ---------------------------------------------------------------------------
[encoding]
# Lossy WebP quality (0 = worst, 100 = best).
quality = 80

# ---------------------------------------------------------------------------
# Missing files
# ---------------------------------------------------------------------------
[missing]
# Entries whose file has been gone for longer than this are removed.
threshold_days = 30

# Set to false to flag missing entries but never remove them.
purge = true

# ---------------------------------------------------------------------------
# Safety
# ---------------------------------------------------------------------------
[safety]
# If face detection fails on more than this share of new photos, the run
# aborts before converting, writing or moving anything.
min_detection_ratio = 0.8
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = IngestConfig::default();
        assert!(!config.dry_run);
        assert_eq!(config.paths.asset_root, PathBuf::from("public"));
        assert_eq!(config.paths.manifest, PathBuf::from("public/assets.json"));
        assert!(config.faces.enabled);
        assert_eq!(config.encoding.quality, 80);
        assert_eq!(config.missing.threshold_days, 30);
        assert!(config.missing.purge);
        assert_eq!(config.safety.min_detection_ratio, 0.8);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[encoding]
quality = 65
"#;
        let config: IngestConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.encoding.quality, 65);
        // Unspecified defaults preserved
        assert_eq!(config.missing.threshold_days, 30);
        assert_eq!(config.paths.archive_root, PathBuf::from("originals"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<IngestConfig, _> = toml::from_str("[encoding]\nqualty = 50\n");
        assert!(result.is_err());
    }

    #[test]
    fn load_config_reads_explicit_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ingest.toml");
        fs::write(
            &path,
            r#"
dry_run = true

[paths]
asset_root = "site/static"

[missing]
threshold_days = 7
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.paths.asset_root, PathBuf::from("site/static"));
        assert_eq!(config.missing.threshold_days, 7);
        assert_eq!(config.encoding.quality, 80);
    }

    #[test]
    fn load_config_missing_explicit_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = load_config(Some(&tmp.path().join("nope.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ingest.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(Some(&path)), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ingest.toml");
        fs::write(&path, "[encoding]\nquality = 150\n").unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_ratio() {
        let mut config = IngestConfig::default();
        config.safety.min_detection_ratio = 1.5;
        assert!(config.validate().is_err());
        config.safety.min_detection_ratio = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_tiny_faces() {
        let mut config = IngestConfig::default();
        config.faces.min_face_size = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_archive_inside_assets() {
        let mut config = IngestConfig::default();
        config.paths.archive_root = PathBuf::from("./public/originals");
        assert!(config.validate().is_err());

        config.paths.archive_root = PathBuf::from("public");
        assert!(config.validate().is_err());

        config.paths.archive_root = PathBuf::from("public-originals");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn merge_toml_overlays_nested_tables() {
        let base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"]["x"].as_integer(), Some(1));
        assert_eq!(merged["a"]["y"].as_integer(), Some(3));
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let config: IngestConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, IngestConfig::default());
    }
}
