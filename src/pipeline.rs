//! Run orchestration.
//!
//! One run walks the asset root once and moves every new raw photo through
//! the stages below, strictly in order and one file at a time:
//!
//! ```text
//! 1. load face model (if enabled)
//! 2. discover         raw + encoded files under asset_root
//! 3. detect           raw → focus point, keyed by future manifest key
//!    ── safety gate ── detection must complete on ≥ min_detection_ratio
//!    ── slug check ─── no two raw files may share an output path
//! 4. convert          raw → slugged .webp sibling (skip if present)
//! 5. re-discover      every encoded file, old and new
//! 6. merge            into the existing manifest
//! 7. missing / purge  advance missing-file state, drop stale entries
//! 8. persist          write the manifest
//! 9. archive          move converted raw files to archive_root, unless
//!                     their output could not be measured
//! ```
//!
//! Everything before the gate only reads. A gate or slug failure aborts the
//! run before a single file is encoded, written or moved.
//!
//! Per-file problems (undecodable photo, unreadable header, failed move) are
//! logged, counted in [`RunReport`] and skipped. Only configuration problems,
//! the safety gate, slug conflicts and a failed manifest write are fatal.
//!
//! Every stage is idempotent, so an interrupted run is recovered by running
//! again.

use crate::archive::{ArchiveOutcome, OriginalsArchiver};
use crate::config::IngestConfig;
use crate::faces::{self, Detection, FaceDetector, MODEL_FILE, RustfaceDetector};
use crate::focus::{FocusMap, destination_key};
use crate::imaging::{
    ConvertStatus, ImageBackend, ImageEncoder, Quality, RustBackend, destination_path,
};
use crate::manifest::{
    LoadStatus, ManifestError, ManifestStore, PersistOutcome, check_missing, merge, purge_stale,
};
use crate::scan::AssetScan;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(
        "Safety gate: face detection completed on {succeeded} of {total} raw files ({:.1}%, need {:.1}%)",
        .ratio * 100.0,
        .required * 100.0
    )]
    SafetyAbort {
        succeeded: usize,
        total: usize,
        ratio: f64,
        required: f64,
    },
    #[error("{} output path(s) claimed by more than one raw file", .0.len())]
    SlugConflict(Vec<SlugConflict>),
    #[error("Failed to write manifest: {0}")]
    Persist(#[from] ManifestError),
}

/// Several raw files that would all be encoded to `destination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugConflict {
    pub destination: PathBuf,
    pub sources: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detect,
    Convert,
    Merge,
    Archive,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Detect => "Detecting faces",
            Stage::Convert => "Converting",
            Stage::Merge => "Updating manifest",
            Stage::Archive => "Archiving originals",
        };
        f.write_str(label)
    }
}

/// Progress reported while the run is underway.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Discovered {
        raw: usize,
        encoded: usize,
    },
    StageStarted {
        stage: Stage,
        count: usize,
    },
    Detected {
        index: usize,
        total: usize,
        path: PathBuf,
        detection: Detection,
    },
    Converted {
        index: usize,
        total: usize,
        source: PathBuf,
        output: PathBuf,
        status: ConvertStatus,
    },
    ConvertFailed {
        index: usize,
        total: usize,
        source: PathBuf,
        reason: String,
    },
    MeasureFailed {
        path: PathBuf,
        reason: String,
    },
    EntryMissing {
        key: String,
    },
    EntryRestored {
        key: String,
    },
    EntryPurged {
        key: String,
    },
    ManifestSaved {
        path: PathBuf,
        entries: usize,
        written: bool,
        backup: Option<PathBuf>,
    },
    Archived {
        source: PathBuf,
        outcome: ArchiveOutcome,
    },
    ArchiveFailed {
        source: PathBuf,
        reason: String,
    },
    /// The raw file stays because its encoded output is unreadable.
    ArchiveHeld {
        source: PathBuf,
        output: PathBuf,
    },
}

/// Counts collected over one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub dry_run: bool,
    pub raw_discovered: usize,
    pub encoded_discovered: usize,

    pub faces_found: usize,
    pub no_face: usize,
    pub detection_failed: usize,
    pub detection_disabled: usize,

    pub encoded: usize,
    pub skipped: usize,
    pub planned: usize,
    pub convert_failed: usize,

    pub manifest_load: Option<LoadStatus>,
    pub measured: usize,
    pub dimension_failures: usize,
    pub newly_missing: usize,
    pub still_missing: usize,
    pub restored: usize,
    pub unknown_state: usize,
    pub purged: usize,
    pub manifest_entries: usize,
    pub manifest_written: bool,
    pub corrupt_backup: Option<PathBuf>,

    pub moved: usize,
    pub already_gone: usize,
    pub archive_planned: usize,
    pub archive_blocked: usize,
    pub archive_failed: usize,
    pub archive_held: usize,
}

impl RunReport {
    fn record_detection(&mut self, detection: &Detection) {
        match detection {
            Detection::Found(_) => self.faces_found += 1,
            Detection::NoFace => self.no_face += 1,
            Detection::Failed(_) => self.detection_failed += 1,
            Detection::Disabled => self.detection_disabled += 1,
        }
    }

    fn record_conversion(&mut self, status: ConvertStatus) {
        match status {
            ConvertStatus::Encoded => self.encoded += 1,
            ConvertStatus::Skipped => self.skipped += 1,
            ConvertStatus::Planned => self.planned += 1,
        }
    }

    fn record_archive(&mut self, outcome: &ArchiveOutcome) {
        match outcome {
            ArchiveOutcome::Moved(_) => self.moved += 1,
            ArchiveOutcome::AlreadyGone => self.already_gone += 1,
            ArchiveOutcome::Planned(_) => self.archive_planned += 1,
            ArchiveOutcome::DestinationExists(_) => self.archive_blocked += 1,
        }
    }

    /// Per-file problems that did not stop the run.
    pub fn failures(&self) -> usize {
        self.detection_failed
            + self.convert_failed
            + self.dimension_failures
            + self.unknown_state
            + self.archive_blocked
            + self.archive_failed
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} raw, {} encoded, {} skipped, {} archived, {} entries, {} failures",
            self.raw_discovered,
            self.encoded + self.planned,
            self.skipped,
            self.moved + self.archive_planned,
            self.manifest_entries,
            self.failures()
        )
    }
}

/// What `check` found without touching anything.
#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    pub raw: usize,
    pub encoded: usize,
    pub model: Option<PathBuf>,
    pub conflicts: Vec<SlugConflict>,
}

fn emit(events: &Option<Sender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

fn discover(asset_root: &Path) -> Result<AssetScan, PipelineError> {
    AssetScan::new(asset_root).map_err(|e| PipelineError::Configuration(e.to_string()))
}

fn sorted(paths: impl Iterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = paths.collect();
    paths.sort();
    paths
}

/// Group raw files by output path; return every group with more than one member.
///
/// Files whose name slugs to nothing are left out; conversion reports them.
pub fn slug_conflicts(raws: &[PathBuf]) -> Vec<SlugConflict> {
    let mut by_destination: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for raw in raws {
        if let Ok(destination) = destination_path(raw) {
            by_destination
                .entry(destination)
                .or_default()
                .push(raw.clone());
        }
    }
    by_destination
        .into_iter()
        .filter(|(_, sources)| sources.len() > 1)
        .map(|(destination, sources)| SlugConflict {
            destination,
            sources,
        })
        .collect()
}

/// Validate the environment and count what a run would see.
pub fn preflight(config: &IngestConfig) -> Result<Inventory, PipelineError> {
    let scan = discover(&config.paths.asset_root)?;
    let raws = sorted(scan.raw());
    let encoded = scan.encoded().count();

    let model = if config.faces.enabled {
        let path = config.paths.model_dir.join(MODEL_FILE);
        if !path.is_file() {
            return Err(PipelineError::Configuration(format!(
                "face model not found at {}",
                path.display()
            )));
        }
        Some(path)
    } else {
        None
    };

    Ok(Inventory {
        raw: raws.len(),
        encoded,
        model,
        conflicts: slug_conflicts(&raws),
    })
}

/// Run the pipeline with the production codec and face detector.
pub fn run(
    config: &IngestConfig,
    events: Option<Sender<PipelineEvent>>,
) -> Result<RunReport, PipelineError> {
    let mut detector = if config.faces.enabled {
        let detector = RustfaceDetector::load(&config.paths.model_dir, &config.faces)
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        Some(detector)
    } else {
        info!("face detection disabled");
        None
    };
    let backend = RustBackend::new();
    run_with(
        config,
        &backend,
        detector.as_mut().map(|d| d as &mut dyn FaceDetector),
        Utc::now(),
        events,
    )
}

/// Run the pipeline with explicit capabilities and clock.
///
/// `detector` is ignored when detection is disabled in `config`.
pub fn run_with<B: ImageBackend + ?Sized>(
    config: &IngestConfig,
    backend: &B,
    detector: Option<&mut dyn FaceDetector>,
    now: DateTime<Utc>,
    events: Option<Sender<PipelineEvent>>,
) -> Result<RunReport, PipelineError> {
    let paths = &config.paths;
    let dry_run = config.dry_run;
    let mut detector = if config.faces.enabled { detector } else { None };
    let mut report = RunReport {
        dry_run,
        ..RunReport::default()
    };
    if dry_run {
        info!("dry run: nothing will be encoded, written or moved");
    }

    // Discover
    let scan = discover(&paths.asset_root)?;
    let raws = sorted(scan.raw());
    report.raw_discovered = raws.len();
    report.encoded_discovered = scan.encoded().count();
    info!(
        root = %paths.asset_root.display(),
        raw = report.raw_discovered,
        encoded = report.encoded_discovered,
        "discovered assets"
    );
    emit(
        &events,
        PipelineEvent::Discovered {
            raw: report.raw_discovered,
            encoded: report.encoded_discovered,
        },
    );

    // Detect
    let total = raws.len();
    let mut focus_by_key = FocusMap::new();
    if detector.is_some() && total > 0 {
        emit(
            &events,
            PipelineEvent::StageStarted {
                stage: Stage::Detect,
                count: total,
            },
        );
    }
    for (i, raw) in raws.iter().enumerate() {
        let detection = match detector.as_deref_mut() {
            Some(d) => faces::detect(d, raw),
            None => Detection::Disabled,
        };
        report.record_detection(&detection);
        if let Some(point) = detection.focus() {
            match destination_key(&paths.asset_root, raw) {
                Ok(key) => {
                    focus_by_key.insert(key, point);
                }
                Err(e) => debug!(path = %raw.display(), error = %e, "focus has no destination"),
            }
        }
        if detector.is_some() {
            emit(
                &events,
                PipelineEvent::Detected {
                    index: i + 1,
                    total,
                    path: raw.clone(),
                    detection,
                },
            );
        }
    }

    // Safety gate
    if detector.is_some() && total > 0 {
        let succeeded = report.faces_found + report.no_face;
        let ratio = succeeded as f64 / total as f64;
        let required = config.safety.min_detection_ratio;
        if ratio < required {
            warn!(succeeded, total, ratio, required, "safety gate tripped, aborting");
            return Err(PipelineError::SafetyAbort {
                succeeded,
                total,
                ratio,
                required,
            });
        }
        debug!(succeeded, total, ratio, "safety gate passed");
    }

    let conflicts = slug_conflicts(&raws);
    if !conflicts.is_empty() {
        for conflict in &conflicts {
            warn!(
                destination = %conflict.destination.display(),
                sources = conflict.sources.len(),
                "raw files share an output path"
            );
        }
        return Err(PipelineError::SlugConflict(conflicts));
    }

    // Convert
    let encoder = ImageEncoder::new(backend, Quality::new(config.encoding.quality), dry_run);
    let mut processed = Vec::with_capacity(total);
    if total > 0 {
        emit(
            &events,
            PipelineEvent::StageStarted {
                stage: Stage::Convert,
                count: total,
            },
        );
    }
    for (i, raw) in raws.iter().enumerate() {
        match encoder.convert(raw) {
            Ok(conversion) => {
                report.record_conversion(conversion.status);
                processed.push((raw.clone(), conversion.output.clone()));
                emit(
                    &events,
                    PipelineEvent::Converted {
                        index: i + 1,
                        total,
                        source: conversion.source,
                        output: conversion.output,
                        status: conversion.status,
                    },
                );
            }
            Err(e) => {
                warn!(path = %raw.display(), error = %e, "conversion failed, raw file left in place");
                report.convert_failed += 1;
                emit(
                    &events,
                    PipelineEvent::ConvertFailed {
                        index: i + 1,
                        total,
                        source: raw.clone(),
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    // Re-discover and merge
    let encoded = sorted(scan.encoded());
    emit(
        &events,
        PipelineEvent::StageStarted {
            stage: Stage::Merge,
            count: encoded.len(),
        },
    );
    let mut store = ManifestStore::new(&paths.manifest, dry_run);
    let existing = store.load_existing();
    report.manifest_load = Some(store.status());

    let outcome = merge(existing, &encoded, &focus_by_key, &paths.asset_root, backend);
    report.measured = outcome.measured.len();
    report.dimension_failures = outcome.failures.len();
    let unreadable: HashSet<PathBuf> = outcome.failures.iter().map(|(p, _)| p.clone()).collect();
    for (path, reason) in outcome.failures {
        emit(&events, PipelineEvent::MeasureFailed { path, reason });
    }
    let mut manifest = outcome.manifest;

    // Missing files
    let missing = check_missing(&mut manifest, &paths.asset_root, now);
    report.newly_missing = missing.newly_missing.len();
    report.still_missing = missing.still_missing.len();
    report.restored = missing.restored.len();
    report.unknown_state = missing.unknown.len();
    for key in missing.newly_missing {
        emit(&events, PipelineEvent::EntryMissing { key });
    }
    for key in missing.restored {
        emit(&events, PipelineEvent::EntryRestored { key });
    }
    if config.missing.purge {
        let purged = purge_stale(&mut manifest, config.missing.threshold_days, now);
        report.purged = purged.len();
        for key in purged {
            emit(&events, PipelineEvent::EntryPurged { key });
        }
    }

    // Persist
    report.manifest_entries = manifest.len();
    let (written, backup) = match store.persist(&manifest)? {
        PersistOutcome::Written { backup } => (true, backup),
        PersistOutcome::Skipped => (false, None),
    };
    report.manifest_written = written;
    report.corrupt_backup = backup.clone();
    emit(
        &events,
        PipelineEvent::ManifestSaved {
            path: paths.manifest.clone(),
            entries: report.manifest_entries,
            written,
            backup,
        },
    );

    // Archive
    if !processed.is_empty() {
        emit(
            &events,
            PipelineEvent::StageStarted {
                stage: Stage::Archive,
                count: processed.len(),
            },
        );
    }
    let archiver = OriginalsArchiver::new(&paths.asset_root, &paths.archive_root, dry_run);
    for (raw, output) in processed {
        if unreadable.contains(&output) {
            warn!(
                path = %raw.display(),
                output = %output.display(),
                "encoded output unreadable, keeping raw file"
            );
            report.archive_held += 1;
            emit(
                &events,
                PipelineEvent::ArchiveHeld {
                    source: raw,
                    output,
                },
            );
            continue;
        }
        match archiver.relocate(&raw) {
            Ok(outcome) => {
                report.record_archive(&outcome);
                emit(
                    &events,
                    PipelineEvent::Archived {
                        source: raw,
                        outcome,
                    },
                );
            }
            Err(e) => {
                warn!(path = %raw.display(), error = %e, "archiving failed");
                report.archive_failed += 1;
                emit(
                    &events,
                    PipelineEvent::ArchiveFailed {
                        source: raw,
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    info!(%report, "run complete");
    Ok(report)
}
