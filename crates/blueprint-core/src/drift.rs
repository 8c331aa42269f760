//! Drift detection and orphan housekeeping.
//!
//! [`detect`] compares the tracking manifest with the filesystem and only
//! reports. [`housekeep`] is the separate step that acts on orphans at the
//! end of a generation run.

use crate::config::{DriftConfig, OrphanConfig};
use crate::console::Console;
use crate::error::Result;
use crate::fs::FileSystem;
use crate::tracking::{hash_bytes, Tracker};
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    Modified,
    Deleted,
}

impl fmt::Display for DriftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DriftKind::Modified => "modified",
            DriftKind::Deleted => "deleted",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Drift {
    pub path: String,
    pub kind: DriftKind,
    pub expected_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_hash: Option<String>,
}

/// Every tracked file whose bytes no longer match, or that is gone, in path
/// order. Scaffolded starters and paths listed in `config.ignore` are
/// skipped.
pub fn detect(fs: &dyn FileSystem, tracker: &Tracker, config: &DriftConfig) -> Result<Vec<Drift>> {
    let mut drift = Vec::new();
    for record in tracker.records() {
        if record.scaffold {
            continue;
        }
        if config.is_ignored(&record.path) {
            debug!(path = %record.path, "drift check skipped by config");
            continue;
        }
        match fs.read_optional(&record.path)? {
            None => drift.push(Drift {
                path: record.path.clone(),
                kind: DriftKind::Deleted,
                expected_hash: record.hash.clone(),
                actual_hash: None,
            }),
            Some(data) => {
                let actual = hash_bytes(&data);
                if actual != record.hash {
                    drift.push(Drift {
                        path: record.path.clone(),
                        kind: DriftKind::Modified,
                        expected_hash: record.hash.clone(),
                        actual_hash: Some(actual),
                    });
                }
            }
        }
    }
    Ok(drift)
}

// ---------------------------------------------------------------------------
// Housekeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Housekeeping {
    /// Unmodified orphans removed from disk.
    pub deleted: Vec<String>,
    /// Orphans left on disk: hand-edited, or deletion is turned off.
    pub kept: Vec<String>,
    /// Orphans that were already gone.
    pub missing: Vec<String>,
}

/// Resolve orphaned records. Every orphan is dropped from tracking; its file
/// is deleted only if it still holds the bytes blueprint wrote.
pub fn housekeep(
    fs: &dyn FileSystem,
    console: &dyn Console,
    tracker: &mut Tracker,
    orphans: &[String],
    config: &OrphanConfig,
) -> Result<Housekeeping> {
    let mut report = Housekeeping::default();
    for path in orphans {
        let Some(record) = tracker.remove(path) else {
            continue;
        };
        match fs.read_optional(path)? {
            None => report.missing.push(path.clone()),
            Some(data) if record.matches(&data) => {
                if config.delete {
                    fs.remove_file(path)?;
                    console.info(&format!("removed {path}"));
                    report.deleted.push(path.clone());
                } else {
                    report.kept.push(path.clone());
                }
            }
            Some(_) => {
                console.warn(&format!(
                    "{path} is no longer generated but has local edits; leaving it in place"
                ));
                report.kept.push(path.clone());
            }
        }
    }
    Ok(report)
}
