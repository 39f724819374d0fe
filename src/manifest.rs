//! The asset manifest: load, merge, missing-file lifecycle, persist.
//!
//! The manifest is a JSON object mapping a web-relative path to an
//! [`AssetRecord`]:
//!
//! ```json
//! {
//!   "/photos/example.webp": {
//!     "width": 800,
//!     "height": 600,
//!     "type": "webp",
//!     "focus": { "x": 0.5012, "y": 0.304 },
//!     "missing": true,
//!     "missingDate": "2025-01-01T00:00:00.000Z"
//!   }
//! }
//! ```
//!
//! Keys always begin with `/` and are the encoded file's path relative to the
//! asset root, with `/` separators on every platform.
//!
//! # Merge rules
//!
//! [`merge`] folds the encoded files found on disk into the existing manifest:
//!
//! - Dimensions are refreshed from the file header on every run.
//! - **A stored `focus` always wins.** A freshly detected focus point is only
//!   used when the existing record has none. Stored values may be hand-tuned.
//! - Records for files not seen in this pass are kept untouched. Merge never
//!   deletes; only [`purge_stale`] does.
//! - Unknown fields on a record are carried through unchanged.
//!
//! # Missing-file lifecycle
//!
//! ```text
//!              file gone                     file gone
//!   ACTIVE ───────────────▶ MISSING(date) ───────────────▶ MISSING(same date)
//!     ▲                          │
//!     └──────── file back ───────┘
//!
//!   MISSING and now - date > threshold  ──purge_stale──▶  (removed)
//! ```
//!
//! `missingDate` is stamped once, on the first failed check, and is never
//! moved forward by later checks.

use crate::focus::{FocusMap, FocusPoint};
use crate::imaging::ImageBackend;
use crate::scan::ENCODED_EXTENSION;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("{path} is not inside asset root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
    #[error("{0} is not valid UTF-8 and cannot be keyed")]
    NonUtf8(PathBuf),
}

/// Canonical manifest key: `/` + path relative to `asset_root`, `/`-separated.
///
/// Keys must map back to the file through [`key_path`], so a non-UTF-8
/// component is an error rather than a lossy replacement.
pub fn manifest_key(asset_root: &Path, path: &Path) -> Result<String, KeyError> {
    let relative = path
        .strip_prefix(asset_root)
        .map_err(|_| KeyError::OutsideRoot {
            path: path.to_path_buf(),
            root: asset_root.to_path_buf(),
        })?;
    let parts = relative
        .components()
        .map(|c| {
            c.as_os_str()
                .to_str()
                .ok_or_else(|| KeyError::NonUtf8(path.to_path_buf()))
        })
        .collect::<Result<Vec<&str>, KeyError>>()?;
    Ok(format!("/{}", parts.join("/")))
}

/// Filesystem path a manifest key refers to.
pub fn key_path(asset_root: &Path, key: &str) -> PathBuf {
    asset_root.join(key.trim_start_matches('/'))
}

fn default_kind() -> String {
    ENCODED_EXTENSION.to_string()
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub width: u32,
    pub height: u32,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<FocusPoint>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub missing: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "millis_timestamp"
    )]
    pub missing_date: Option<DateTime<Utc>>,
    /// Fields this tool does not manage (captions, credits, ...), kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AssetRecord {
    pub fn new(width: u32, height: u32, focus: Option<FocusPoint>) -> Self {
        Self {
            width,
            height,
            kind: default_kind(),
            focus,
            missing: false,
            missing_date: None,
            extra: BTreeMap::new(),
        }
    }
}

/// RFC 3339 UTC with milliseconds, e.g. `2025-01-01T00:00:00.000Z`.
mod millis_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => {
                serializer.serialize_some(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

/// Map from manifest key to record, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub entries: BTreeMap<String, AssetRecord>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&AssetRecord> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, record: AssetRecord) {
        self.entries.insert(key.into(), record);
    }

    /// Enforce key and record invariants on data read from disk.
    fn canonicalized(self) -> Self {
        let mut entries = BTreeMap::new();
        let (canonical, loose): (Vec<_>, Vec<_>) = self
            .entries
            .into_iter()
            .partition(|(key, _)| key.starts_with('/'));

        for (key, record) in canonical.into_iter().chain(loose) {
            let key = if key.starts_with('/') {
                key
            } else {
                let fixed = format!("/{key}");
                if entries.contains_key(&fixed) {
                    warn!(key = %key, canonical = %fixed, "dropping duplicate entry without leading slash");
                    continue;
                }
                warn!(key = %key, canonical = %fixed, "re-keying entry without leading slash");
                fixed
            };
            entries.insert(key, sanitize_record(record));
        }
        Self { entries }
    }
}

fn sanitize_record(mut record: AssetRecord) -> AssetRecord {
    record.focus = record.focus.map(FocusPoint::sanitized);
    if !record.missing {
        record.missing_date = None;
    }
    record
}

/// How [`ManifestStore::load_existing`] found the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// No file yet; first run.
    Absent,
    Loaded,
    /// Unreadable or unparsable. Treated as empty, preserved on persist.
    Corrupt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Written { backup: Option<PathBuf> },
    /// Dry run: nothing written.
    Skipped,
}

/// Owns the manifest file on disk.
#[derive(Debug)]
pub struct ManifestStore {
    path: PathBuf,
    dry_run: bool,
    status: LoadStatus,
}

impl ManifestStore {
    pub fn new(path: &Path, dry_run: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            dry_run,
            status: LoadStatus::Absent,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    /// Read the manifest. Never fails: a missing file is an empty manifest,
    /// and so is a malformed one (with a warning).
    pub fn load_existing(&mut self) -> Manifest {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no existing manifest, starting empty");
                self.status = LoadStatus::Absent;
                return Manifest::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "manifest unreadable, treating as empty");
                self.status = LoadStatus::Corrupt;
                return Manifest::new();
            }
        };
        match serde_json::from_str::<Manifest>(&content) {
            Ok(manifest) => {
                self.status = LoadStatus::Loaded;
                let manifest = manifest.canonicalized();
                debug!(path = %self.path.display(), entries = manifest.len(), "manifest loaded");
                manifest
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "manifest is malformed, treating as empty");
                self.status = LoadStatus::Corrupt;
                Manifest::new()
            }
        }
    }

    /// Write the manifest as pretty-printed JSON. Suppressed in dry-run mode.
    ///
    /// The file is written to a sibling temp file and renamed into place, so
    /// an interrupted write never leaves a truncated manifest. A previously
    /// corrupt file is renamed aside first rather than overwritten.
    pub fn persist(&self, manifest: &Manifest) -> Result<PersistOutcome, ManifestError> {
        if self.dry_run {
            info!(path = %self.path.display(), entries = manifest.len(), "dry run: manifest not written");
            return Ok(PersistOutcome::Skipped);
        }
        let io_err = |source: io::Error| ManifestError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let backup = if self.status == LoadStatus::Corrupt && self.path.exists() {
            let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
            let backup = sibling(&self.path, &format!("corrupt-{stamp}"));
            std::fs::rename(&self.path, &backup).map_err(io_err)?;
            warn!(backup = %backup.display(), "preserved corrupt manifest");
            Some(backup)
        } else {
            None
        };

        let json = serde_json::to_string_pretty(manifest)?;
        let tmp = sibling(&self.path, "tmp");
        std::fs::write(&tmp, json + "\n").map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        info!(path = %self.path.display(), entries = manifest.len(), "manifest written");
        Ok(PersistOutcome::Written { backup })
    }
}

/// `dir/assets.json` + `tmp` → `dir/assets.json.tmp`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{suffix}"));
    path.with_file_name(name)
}

/// Result of [`merge`].
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub manifest: Manifest,
    /// Keys whose record was created or refreshed this pass.
    pub measured: Vec<String>,
    /// Encoded files that could not be keyed or measured.
    pub failures: Vec<(PathBuf, String)>,
}

/// Fold discovered encoded files into `existing`.
///
/// See the [module docs](self) for the rules.
pub fn merge<B: ImageBackend + ?Sized>(
    existing: Manifest,
    discovered: &[PathBuf],
    focus_by_key: &FocusMap,
    asset_root: &Path,
    backend: &B,
) -> MergeOutcome {
    let mut manifest = existing;
    let mut measured = Vec::new();
    let mut failures = Vec::new();

    for path in discovered {
        let key = match manifest_key(asset_root, path) {
            Ok(key) => key,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot key encoded file");
                failures.push((path.clone(), e.to_string()));
                continue;
            }
        };
        let dims = match backend.identify(path) {
            Ok(dims) => dims,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read dimensions, keeping previous entry");
                failures.push((path.clone(), e.to_string()));
                continue;
            }
        };
        let fresh = focus_by_key.get(&key).copied();

        match manifest.entries.get_mut(&key) {
            Some(record) => {
                record.width = dims.width;
                record.height = dims.height;
                record.kind = default_kind();
                if record.focus.is_none() {
                    record.focus = fresh;
                } else if fresh.is_some() {
                    debug!(key = %key, "keeping stored focus over fresh detection");
                }
            }
            None => {
                manifest
                    .entries
                    .insert(key.clone(), AssetRecord::new(dims.width, dims.height, fresh));
            }
        }
        measured.push(key);
    }

    MergeOutcome {
        manifest,
        measured,
        failures,
    }
}

/// Missing-file transitions performed by [`check_missing`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MissingReport {
    pub newly_missing: Vec<String>,
    pub still_missing: Vec<String>,
    pub restored: Vec<String>,
    /// Entries whose existence could not be determined; left unchanged.
    pub unknown: Vec<String>,
}

/// Verify every entry's file and advance its missing state.
pub fn check_missing(
    manifest: &mut Manifest,
    asset_root: &Path,
    now: DateTime<Utc>,
) -> MissingReport {
    let mut report = MissingReport::default();

    for (key, record) in manifest.entries.iter_mut() {
        let exists = match key_path(asset_root, key).try_exists() {
            Ok(exists) => exists,
            Err(e) => {
                warn!(key = %key, error = %e, "cannot stat asset, leaving entry as-is");
                report.unknown.push(key.clone());
                continue;
            }
        };

        match (exists, record.missing) {
            (true, false) => {}
            (true, true) => {
                record.missing = false;
                record.missing_date = None;
                info!(key = %key, "asset reappeared");
                report.restored.push(key.clone());
            }
            (false, false) => {
                record.missing = true;
                record.missing_date = Some(now);
                warn!(key = %key, "asset missing from disk");
                report.newly_missing.push(key.clone());
            }
            (false, true) => {
                if record.missing_date.is_none() {
                    record.missing_date = Some(now);
                }
                report.still_missing.push(key.clone());
            }
        }
    }
    report
}

/// Remove entries missing for longer than `threshold_days`. Returns removed keys.
pub fn purge_stale(manifest: &mut Manifest, threshold_days: u32, now: DateTime<Utc>) -> Vec<String> {
    let threshold = Duration::days(i64::from(threshold_days));
    let stale: Vec<String> = manifest
        .entries
        .iter()
        .filter(|(_, r)| {
            r.missing
                && r
                    .missing_date
                    .is_some_and(|since| now.signed_duration_since(since) > threshold)
        })
        .map(|(k, _)| k.clone())
        .collect();

    for key in &stale {
        manifest.entries.remove(key);
        info!(key = %key, threshold_days, "purged stale entry");
    }
    stale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Dimensions;
    use crate::imaging::backend::tests::MockBackend;
    use crate::test_helpers::{touch, utc};
    use std::fs;
    use tempfile::TempDir;

    fn record(width: u32, height: u32, focus: Option<(f64, f64)>) -> AssetRecord {
        AssetRecord::new(width, height, focus.map(|(x, y)| FocusPoint::new(x, y)))
    }

    // =========================================================================
    // Keys
    // =========================================================================

    #[test]
    fn key_is_slash_prefixed_relative_path() {
        let root = Path::new("/srv/public");
        let key = manifest_key(root, &root.join("photos/2024/a.webp")).unwrap();
        assert_eq!(key, "/photos/2024/a.webp");
    }

    #[test]
    fn key_outside_root_is_an_error() {
        let result = manifest_key(Path::new("/srv/public"), Path::new("/tmp/a.webp"));
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_name_cannot_be_keyed() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = Path::new("/srv/public");
        let path = root.join(OsStr::from_bytes(b"caf\xe9.webp"));
        assert!(matches!(
            manifest_key(root, &path),
            Err(KeyError::NonUtf8(_))
        ));
    }

    #[test]
    fn key_path_roundtrips() {
        let root = Path::new("/srv/public");
        assert_eq!(
            key_path(root, "/photos/a.webp"),
            PathBuf::from("/srv/public/photos/a.webp")
        );
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    #[test]
    fn record_serializes_in_manifest_format() {
        let mut r = record(800, 600, Some((0.5012, 0.304)));
        r.missing = true;
        r.missing_date = Some(utc("2025-01-01T00:00:00Z"));

        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "width": 800,
                "height": 600,
                "type": "webp",
                "focus": {"x": 0.5012, "y": 0.304},
                "missing": true,
                "missingDate": "2025-01-01T00:00:00.000Z"
            })
        );
    }

    #[test]
    fn optional_fields_are_omitted() {
        let json = serde_json::to_value(record(10, 20, None)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"width": 10, "height": 20, "type": "webp"})
        );
    }

    #[test]
    fn unknown_record_fields_survive_roundtrip() {
        let json = r#"{"/a.webp": {"width": 1, "height": 2, "type": "webp", "alt": "Choir"}}"#;
        let m: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(m.get("/a.webp").unwrap().extra["alt"], "Choir");
        let back = serde_json::to_value(&m).unwrap();
        assert_eq!(back["/a.webp"]["alt"], "Choir");
    }

    // =========================================================================
    // load_existing / persist
    // =========================================================================

    #[test]
    fn load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let mut store = ManifestStore::new(&tmp.path().join("assets.json"), false);
        assert!(store.load_existing().is_empty());
        assert_eq!(store.status(), LoadStatus::Absent);
    }

    #[test]
    fn load_malformed_file_is_empty_and_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("assets.json");
        fs::write(&path, "{ not json").unwrap();

        let mut store = ManifestStore::new(&path, false);
        assert!(store.load_existing().is_empty());
        assert_eq!(store.status(), LoadStatus::Corrupt);
    }

    #[test]
    fn load_rekeys_entries_without_leading_slash() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("assets.json");
        fs::write(
            &path,
            r#"{
                "photos/a.webp": {"width": 1, "height": 1, "type": "webp", "focus": {"x": 0.1, "y": 0.2}},
                "photos/b.webp": {"width": 1, "height": 1, "type": "webp"},
                "/photos/b.webp": {"width": 2, "height": 2, "type": "webp"}
            }"#,
        )
        .unwrap();

        let m = ManifestStore::new(&path, false).load_existing();
        assert_eq!(m.len(), 2);
        assert_eq!(
            m.get("/photos/a.webp").unwrap().focus,
            Some(FocusPoint::new(0.1, 0.2))
        );
        assert_eq!(m.get("/photos/b.webp").unwrap().width, 2);
    }

    #[test]
    fn load_clamps_out_of_range_focus_and_drops_orphan_dates() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("assets.json");
        fs::write(
            &path,
            r#"{"/a.webp": {"width": 1, "height": 1, "type": "webp",
                "focus": {"x": 1.5, "y": -0.1},
                "missingDate": "2025-01-01T00:00:00.000Z"}}"#,
        )
        .unwrap();

        let m = ManifestStore::new(&path, false).load_existing();
        let r = m.get("/a.webp").unwrap();
        assert_eq!(r.focus, Some(FocusPoint { x: 1.0, y: 0.0 }));
        assert_eq!(r.missing_date, None);
    }

    #[test]
    fn persist_then_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data/assets.json");
        let mut m = Manifest::new();
        m.insert("/photos/a.webp", record(800, 600, Some((0.5, 0.3))));
        m.insert("/photos/b.webp", record(100, 200, None));

        let store = ManifestStore::new(&path, false);
        assert_eq!(
            store.persist(&m).unwrap(),
            PersistOutcome::Written { backup: None }
        );

        let loaded = ManifestStore::new(&path, false).load_existing();
        assert_eq!(loaded, m);
        assert!(!sibling(&path, "tmp").exists());
    }

    #[test]
    fn persist_is_pretty_printed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("assets.json");
        let mut m = Manifest::new();
        m.insert("/a.webp", record(1, 1, None));
        ManifestStore::new(&path, false).persist(&m).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"/a.webp\": {\n"));
    }

    #[test]
    fn persist_in_dry_run_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("assets.json");
        let store = ManifestStore::new(&path, true);

        assert_eq!(
            store.persist(&Manifest::new()).unwrap(),
            PersistOutcome::Skipped
        );
        assert!(!path.exists());
    }

    #[test]
    fn persist_preserves_corrupt_original() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("assets.json");
        fs::write(&path, "{ hand edited, broken").unwrap();

        let mut store = ManifestStore::new(&path, false);
        let m = store.load_existing();
        let outcome = store.persist(&m).unwrap();

        let PersistOutcome::Written {
            backup: Some(backup),
        } = outcome
        else {
            panic!("expected a backup, got {outcome:?}");
        };
        assert_eq!(
            fs::read_to_string(&backup).unwrap(),
            "{ hand edited, broken"
        );
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "{}");
    }

    // =========================================================================
    // merge
    // =========================================================================

    #[test]
    fn merge_adds_new_assets_with_measured_dimensions() {
        let tmp = TempDir::new().unwrap();
        let a = touch(tmp.path(), "photos/a.webp");
        let backend = MockBackend::new();
        backend.set_dimensions(
            &a,
            Dimensions {
                width: 1024,
                height: 683,
            },
        );

        let out = merge(Manifest::new(), &[a], &FocusMap::new(), tmp.path(), &backend);

        assert_eq!(out.manifest.get("/photos/a.webp"), Some(&record(1024, 683, None)));
        assert_eq!(out.measured, vec!["/photos/a.webp".to_string()]);
        assert!(out.failures.is_empty());
    }

    #[test]
    fn merge_refreshes_dimensions_of_existing_entries() {
        let tmp = TempDir::new().unwrap();
        let a = touch(tmp.path(), "a.webp");
        let mut existing = Manifest::new();
        existing.insert("/a.webp", record(10, 10, None));

        let out = merge(existing, &[a], &FocusMap::new(), tmp.path(), &MockBackend::new());

        let r = out.manifest.get("/a.webp").unwrap();
        assert_eq!((r.width, r.height), (800, 600));
    }

    #[test]
    fn merge_keeps_existing_focus_over_fresh_detection() {
        let tmp = TempDir::new().unwrap();
        let a = touch(tmp.path(), "photos/a.webp");
        let mut existing = Manifest::new();
        existing.insert("/photos/a.webp", record(100, 100, Some((0.5, 0.3))));
        let fresh = FocusMap::from([("/photos/a.webp".to_string(), FocusPoint::new(0.9, 0.9))]);

        let out = merge(existing, &[a], &fresh, tmp.path(), &MockBackend::new());

        assert_eq!(
            out.manifest.get("/photos/a.webp").unwrap().focus,
            Some(FocusPoint::new(0.5, 0.3))
        );
    }

    #[test]
    fn merge_keeps_existing_focus_when_nothing_detected() {
        let tmp = TempDir::new().unwrap();
        let a = touch(tmp.path(), "photos/a.webp");
        let mut existing = Manifest::new();
        existing.insert("/photos/a.webp", record(100, 100, Some((0.5, 0.3))));

        let out = merge(existing, &[a], &FocusMap::new(), tmp.path(), &MockBackend::new());

        assert_eq!(
            out.manifest.get("/photos/a.webp").unwrap().focus,
            Some(FocusPoint::new(0.5, 0.3))
        );
    }

    #[test]
    fn merge_fills_focus_when_none_stored() {
        let tmp = TempDir::new().unwrap();
        let a = touch(tmp.path(), "a.webp");
        let mut existing = Manifest::new();
        existing.insert("/a.webp", record(100, 100, None));
        let fresh = FocusMap::from([("/a.webp".to_string(), FocusPoint::new(0.25, 0.75))]);

        let out = merge(existing, &[a], &fresh, tmp.path(), &MockBackend::new());

        assert_eq!(
            out.manifest.get("/a.webp").unwrap().focus,
            Some(FocusPoint::new(0.25, 0.75))
        );
    }

    #[test]
    fn merge_never_drops_undiscovered_entries() {
        let tmp = TempDir::new().unwrap();
        let a = touch(tmp.path(), "a.webp");
        let mut existing = Manifest::new();
        let gone = record(5, 5, Some((0.1, 0.1)));
        existing.insert("/old/gone.webp", gone.clone());

        let out = merge(existing, &[a], &FocusMap::new(), tmp.path(), &MockBackend::new());

        assert_eq!(out.manifest.get("/old/gone.webp"), Some(&gone));
        assert_eq!(out.manifest.len(), 2);
    }

    #[test]
    fn merge_keeps_previous_entry_when_header_unreadable() {
        let tmp = TempDir::new().unwrap();
        let a = touch(tmp.path(), "a.webp");
        let b = touch(tmp.path(), "b.webp");
        let backend = MockBackend::new();
        backend.fail_on(&a);
        backend.fail_on(&b);
        let mut existing = Manifest::new();
        existing.insert("/a.webp", record(3, 4, None));

        let out = merge(existing, &[a, b], &FocusMap::new(), tmp.path(), &backend);

        assert_eq!(out.manifest.get("/a.webp"), Some(&record(3, 4, None)));
        assert!(out.manifest.get("/b.webp").is_none());
        assert_eq!(out.failures.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn merge_reports_non_utf8_file_instead_of_keying_it() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        let odd = tmp.path().join(OsStr::from_bytes(b"caf\xe9.webp"));
        fs::write(&odd, b"webp").unwrap();

        let out = merge(
            Manifest::new(),
            &[odd.clone()],
            &FocusMap::new(),
            tmp.path(),
            &MockBackend::new(),
        );

        assert!(out.manifest.is_empty());
        assert!(out.measured.is_empty());
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].0, odd);

        let mut manifest = out.manifest;
        let report = check_missing(&mut manifest, tmp.path(), utc("2025-01-01T00:00:00Z"));
        assert!(report.newly_missing.is_empty());
    }

    #[test]
    fn merge_ignores_fresh_focus_for_undiscovered_keys() {
        let tmp = TempDir::new().unwrap();
        let fresh = FocusMap::from([("/never-encoded.webp".to_string(), FocusPoint::new(0.5, 0.5))]);
        let out = merge(Manifest::new(), &[], &fresh, tmp.path(), &MockBackend::new());
        assert!(out.manifest.is_empty());
    }

    // =========================================================================
    // Missing-file lifecycle
    // =========================================================================

    #[test]
    fn present_file_stays_active() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.webp");
        let mut m = Manifest::new();
        m.insert("/a.webp", record(1, 1, None));

        let report = check_missing(&mut m, tmp.path(), utc("2025-01-01T00:00:00Z"));

        assert_eq!(report, MissingReport::default());
        assert!(!m.get("/a.webp").unwrap().missing);
    }

    #[test]
    fn first_failed_check_stamps_date_and_second_keeps_it() {
        let tmp = TempDir::new().unwrap();
        let mut m = Manifest::new();
        m.insert("/photos/b.webp", record(1, 1, None));

        let first = check_missing(&mut m, tmp.path(), utc("2025-01-01T00:00:00Z"));
        assert_eq!(first.newly_missing, vec!["/photos/b.webp".to_string()]);
        let r = m.get("/photos/b.webp").unwrap();
        assert!(r.missing);
        assert_eq!(r.missing_date, Some(utc("2025-01-01T00:00:00Z")));

        let second = check_missing(&mut m, tmp.path(), utc("2025-01-20T00:00:00Z"));
        assert_eq!(second.still_missing, vec!["/photos/b.webp".to_string()]);
        assert_eq!(
            m.get("/photos/b.webp").unwrap().missing_date,
            Some(utc("2025-01-01T00:00:00Z"))
        );
    }

    #[test]
    fn reappearing_file_clears_missing_state() {
        let tmp = TempDir::new().unwrap();
        let mut m = Manifest::new();
        m.insert("/a.webp", record(1, 1, None));
        check_missing(&mut m, tmp.path(), utc("2025-01-01T00:00:00Z"));

        touch(tmp.path(), "a.webp");
        let report = check_missing(&mut m, tmp.path(), utc("2025-01-02T00:00:00Z"));

        assert_eq!(report.restored, vec!["/a.webp".to_string()]);
        let r = m.get("/a.webp").unwrap();
        assert!(!r.missing);
        assert_eq!(r.missing_date, None);
    }

    #[test]
    fn missing_without_date_gets_stamped() {
        let tmp = TempDir::new().unwrap();
        let mut m = Manifest::new();
        let mut r = record(1, 1, None);
        r.missing = true;
        m.insert("/a.webp", r);

        check_missing(&mut m, tmp.path(), utc("2025-03-01T00:00:00Z"));
        assert_eq!(
            m.get("/a.webp").unwrap().missing_date,
            Some(utc("2025-03-01T00:00:00Z"))
        );
    }

    #[test]
    fn purge_removes_entries_past_threshold() {
        let tmp = TempDir::new().unwrap();
        let mut m = Manifest::new();
        m.insert("/photos/b.webp", record(1, 1, None));
        check_missing(&mut m, tmp.path(), utc("2025-01-01T00:00:00Z"));

        let purged = purge_stale(&mut m, 30, utc("2025-02-10T00:00:00Z"));

        assert_eq!(purged, vec!["/photos/b.webp".to_string()]);
        assert!(m.is_empty());
    }

    #[test]
    fn purge_keeps_recently_missing_and_active_entries() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "active.webp");
        let mut m = Manifest::new();
        m.insert("/active.webp", record(1, 1, None));
        m.insert("/recent.webp", record(1, 1, None));
        check_missing(&mut m, tmp.path(), utc("2025-01-01T00:00:00Z"));

        let purged = purge_stale(&mut m, 30, utc("2025-01-31T00:00:00Z"));

        assert!(purged.is_empty());
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn purge_boundary_is_exclusive() {
        let mut m = Manifest::new();
        let mut r = record(1, 1, None);
        r.missing = true;
        r.missing_date = Some(utc("2025-01-01T00:00:00Z"));
        m.insert("/a.webp", r);

        assert!(purge_stale(&mut m, 30, utc("2025-01-31T00:00:00Z")).is_empty());
        assert_eq!(
            purge_stale(&mut m, 30, utc("2025-01-31T00:00:01Z")),
            vec!["/a.webp".to_string()]
        );
    }
}
