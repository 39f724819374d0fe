//! CLI output formatting.
//!
//! Progress lines are printed as the run advances, one per file, then a
//! summary. Every line leads with what happened to the photo; paths are
//! secondary.
//!
//! # Output Format
//!
//! ```text
//! Found 3 raw photos, 12 encoded assets
//! ==> Detecting faces (3)
//!     1/3 IMG_0001.JPG: face at (0.4120, 0.3310)
//!     2/3 beach.png: no face
//!     3/3 broken.jpg: detection failed (Failed to decode ...)
//! ==> Converting (3)
//!     1/3 IMG_0001.JPG → img-0001.webp
//!     2/3 beach.png → beach.webp (already converted)
//!     3/3 broken.jpg: FAILED Encoding ... failed
//! ==> Updating manifest (14)
//!     missing: /events/2023/old.webp
//! Manifest: public/assets.json (14 entries)
//! ==> Archiving originals (2)
//!     IMG_0001.JPG → originals/photos/IMG_0001.JPG
//!
//! Summary
//!     Discovered: 3 raw, 12 encoded
//!     Faces: 1 found, 1 without face, 1 failed
//!     ...
//! ```
//!
//! # Architecture
//!
//! Each kind of output has a `format_*` function returning `Vec<String>` and,
//! where `main` needs it, a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::archive::ArchiveOutcome;
use crate::faces::Detection;
use crate::imaging::ConvertStatus;
use crate::pipeline::{Inventory, PipelineError, PipelineEvent, RunReport, SlugConflict};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// `index/total`, index right-aligned to the width of `total`.
fn progress(index: usize, total: usize) -> String {
    let width = total.to_string().len();
    format!("{index:>width$}/{total}")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn plural(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        format!("{count} {one}")
    } else {
        format!("{count} {many}")
    }
}

fn conflict_lines(conflicts: &[SlugConflict]) -> Vec<String> {
    let mut lines = Vec::new();
    for conflict in conflicts {
        lines.push(format!("    {}", conflict.destination.display()));
        for source in &conflict.sources {
            lines.push(format!("        ← {}", source.display()));
        }
    }
    lines
}

// ============================================================================
// Progress events
// ============================================================================

pub fn format_event(event: &PipelineEvent) -> Vec<String> {
    match event {
        PipelineEvent::Discovered { raw, encoded } => vec![format!(
            "Found {}, {}",
            plural(*raw, "raw photo", "raw photos"),
            plural(*encoded, "encoded asset", "encoded assets")
        )],
        PipelineEvent::StageStarted { stage, count } => {
            vec![format!("==> {stage} ({count})")]
        }
        PipelineEvent::Detected {
            index,
            total,
            path,
            detection,
        } => {
            let outcome = match detection {
                Detection::Found(p) => format!("face at ({:.4}, {:.4})", p.x, p.y),
                Detection::NoFace => "no face".to_string(),
                Detection::Failed(reason) => format!("detection failed ({reason})"),
                Detection::Disabled => "detection disabled".to_string(),
            };
            vec![format!(
                "    {} {}: {}",
                progress(*index, *total),
                file_name(path),
                outcome
            )]
        }
        PipelineEvent::Converted {
            index,
            total,
            source,
            output,
            status,
        } => {
            let note = match status {
                ConvertStatus::Encoded => "",
                ConvertStatus::Skipped => " (already converted)",
                ConvertStatus::Planned => " (dry run)",
            };
            vec![format!(
                "    {} {} → {}{}",
                progress(*index, *total),
                file_name(source),
                file_name(output),
                note
            )]
        }
        PipelineEvent::ConvertFailed {
            index,
            total,
            source,
            reason,
        } => vec![format!(
            "    {} {}: FAILED {}",
            progress(*index, *total),
            file_name(source),
            reason
        )],
        PipelineEvent::MeasureFailed { path, reason } => vec![format!(
            "    {}: cannot read dimensions ({})",
            path.display(),
            reason
        )],
        PipelineEvent::EntryMissing { key } => vec![format!("    missing: {key}")],
        PipelineEvent::EntryRestored { key } => vec![format!("    restored: {key}")],
        PipelineEvent::EntryPurged { key } => vec![format!("    purged: {key}")],
        PipelineEvent::ManifestSaved {
            path,
            entries,
            written,
            backup,
        } => {
            let mut lines = vec![format!(
                "Manifest: {} ({}){}",
                path.display(),
                plural(*entries, "entry", "entries"),
                if *written { "" } else { " not written (dry run)" }
            )];
            if let Some(backup) = backup {
                lines.push(format!(
                    "    Unreadable manifest preserved as {}",
                    backup.display()
                ));
            }
            lines
        }
        PipelineEvent::Archived { source, outcome } => {
            let name = file_name(source);
            let line = match outcome {
                ArchiveOutcome::Moved(dest) => format!("    {name} → {}", dest.display()),
                ArchiveOutcome::Planned(dest) => {
                    format!("    {name} → {} (dry run)", dest.display())
                }
                ArchiveOutcome::AlreadyGone => format!("    {name}: already archived"),
                ArchiveOutcome::DestinationExists(dest) => {
                    format!("    {name}: kept, {} already exists", dest.display())
                }
            };
            vec![line]
        }
        PipelineEvent::ArchiveFailed { source, reason } => {
            vec![format!("    {}: FAILED {}", file_name(source), reason)]
        }
        PipelineEvent::ArchiveHeld { source, output } => vec![format!(
            "    {}: kept, {} is unreadable",
            file_name(source),
            output.display()
        )],
    }
}

// ============================================================================
// Summary
// ============================================================================

pub fn format_summary(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(if report.dry_run {
        "Summary (dry run, nothing was changed)".to_string()
    } else {
        "Summary".to_string()
    });
    lines.push(format!(
        "    Discovered: {} raw, {} encoded",
        report.raw_discovered, report.encoded_discovered
    ));
    if report.detection_disabled > 0 {
        lines.push("    Faces: detection disabled".to_string());
    } else if report.raw_discovered > 0 {
        lines.push(format!(
            "    Faces: {} found, {} without face, {} failed",
            report.faces_found, report.no_face, report.detection_failed
        ));
    }
    let encoded = if report.dry_run {
        format!("{} to encode", report.planned)
    } else {
        format!("{} encoded", report.encoded)
    };
    lines.push(format!(
        "    Converted: {}, {} already converted, {} failed",
        encoded, report.skipped, report.convert_failed
    ));
    lines.push(format!(
        "    Manifest: {}, {} newly missing, {} still missing, {} restored, {} purged",
        plural(report.manifest_entries, "entry", "entries"),
        report.newly_missing,
        report.still_missing,
        report.restored,
        report.purged
    ));
    if report.dimension_failures > 0 {
        lines.push(format!(
            "    Unreadable encoded files: {}",
            report.dimension_failures
        ));
    }
    if report.unknown_state > 0 {
        lines.push(format!(
            "    Entries that could not be checked: {}",
            report.unknown_state
        ));
    }
    let moved = if report.dry_run {
        format!("{} to move", report.archive_planned)
    } else {
        format!("{} moved", report.moved)
    };
    lines.push(format!(
        "    Archived: {}, {} blocked, {} failed",
        moved,
        report.archive_blocked,
        report.archive_failed
    ));
    if report.archive_held > 0 {
        lines.push(format!(
            "    Kept in place (unreadable output): {}",
            report.archive_held
        ));
    }
    lines.push(format!("    Problems: {}", report.failures()));
    lines
}

pub fn print_summary(report: &RunReport) {
    println!();
    for line in format_summary(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Abort
// ============================================================================

pub fn format_abort(error: &PipelineError) -> Vec<String> {
    let mut lines = vec![format!("Aborted: {error}")];
    match error {
        PipelineError::SafetyAbort {
            succeeded, total, ..
        } => {
            lines.push(format!(
                "    {} of {} detections failed; nothing was converted, written or moved",
                total - succeeded,
                total
            ));
            lines.push(
                "    Check the face model and the failing files, then run again".to_string(),
            );
        }
        PipelineError::SlugConflict(conflicts) => {
            lines.extend(conflict_lines(conflicts));
            lines.push("    Rename the files so each one has a distinct name".to_string());
        }
        PipelineError::Configuration(_) | PipelineError::Persist(_) => {}
    }
    lines
}

pub fn print_abort(error: &PipelineError) {
    for line in format_abort(error) {
        eprintln!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

pub fn format_check(inventory: &Inventory) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Raw photos waiting: {}",
            inventory.raw
        ),
        format!("Encoded assets: {}", inventory.encoded),
    ];
    lines.push(match &inventory.model {
        Some(model) => format!("Face model: {}", model.display()),
        None => "Face model: detection disabled".to_string(),
    });
    if !inventory.conflicts.is_empty() {
        lines.push(format!(
            "Name conflicts: {}",
            inventory.conflicts.len()
        ));
        lines.extend(conflict_lines(&inventory.conflicts));
    }
    lines
}

pub fn print_check(inventory: &Inventory) {
    for line in format_check(inventory) {
        println!("{}", line);
    }
}
