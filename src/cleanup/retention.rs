//! Retention sweep over the recording artifact store
//!
//! Deletes every file whose modification time is older than the retention
//! horizon, then removes directories left empty. Re-running against a clean
//! store is a no-op. Failures on individual entries are logged and skipped.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;

/// Outcome of one retention sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    pub files_deleted: u64,
    pub bytes_deleted: u64,
    pub dirs_removed: u64,
}

/// Delete artifacts under `root` older than `retention` as of `now`
///
/// Blocking; run it on a blocking thread.
pub fn sweep_expired(root: &Path, retention: Duration, now: SystemTime) -> RetentionReport {
    let mut report = RetentionReport::default();

    if !root.is_dir() {
        tracing::debug!(root = %root.display(), "Recordings directory does not exist");
        return report;
    }

    let Some(cutoff) = now.checked_sub(retention) else {
        return report;
    };

    let (files, mut dirs) = walk(root);

    for path in files {
        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to stat recording");
                continue;
            }
        };
        let expired = metadata.modified().map(|m| m < cutoff).unwrap_or(false);
        if !expired {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                report.files_deleted += 1;
                report.bytes_deleted += metadata.len();
                tracing::info!(path = %path.display(), "Deleted old recording");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete recording");
            }
        }
    }

    // Deepest first, so parents see their children already gone
    dirs.sort_by(|a, b| b.cmp(a));
    for dir in dirs {
        let empty = fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty && fs::remove_dir(&dir).is_ok() {
            report.dirs_removed += 1;
            tracing::debug!(path = %dir.display(), "Removed empty directory");
        }
    }

    if report.files_deleted > 0 {
        tracing::info!(
            files = report.files_deleted,
            mb = report.bytes_deleted as f64 / (1024.0 * 1024.0),
            dirs = report.dirs_removed,
            "Retention sweep complete"
        );
    } else {
        tracing::info!("No old recordings to clean up");
    }

    report
}

/// Files and directories below `root`, excluding `root` itself
fn walk(root: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to read directory");
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => {
                    dirs.push(path.clone());
                    pending.push(path);
                }
                Ok(ft) if ft.is_file() => files.push(path),
                _ => {}
            }
        }
    }

    (files, dirs)
}
