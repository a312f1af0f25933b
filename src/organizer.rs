//! Chronological media organizer.
//!
//! Walks an input tree and moves supported media files into
//! `out/<owner>/YYYY/MM/<name>` according to their modification time.
//! Existing destinations are never overwritten.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static MEDIA_EXTENSIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(jpe?g|png|gif|mpeg|mp4|mkv|avi|webp)$").expect("static regex is valid")
});

/// Outcome counters for one organizer run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OrganizeReport {
    pub moved: usize,
    /// Destination already existed.
    pub skipped_existing: usize,
    /// Not on the media allow-list.
    pub ignored: usize,
    pub failed: usize,
}

pub fn is_supported_media(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| MEDIA_EXTENSIONS.is_match(name))
}

/// Owner segment used when none is given: `$USER`, or `default`.
pub fn default_owner() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| {
            tracing::warn!("Username could not be found; using 'default'");
            "default".into()
        })
}

/// Move supported media under `in_dir` into `out_dir/<owner>/YYYY/MM`.
pub fn organize(in_dir: &Path, out_dir: &Path, owner: &str) -> Result<OrganizeReport> {
    let meta = fs::metadata(in_dir).with_context(|| format!("reading {}", in_dir.display()))?;
    if !meta.is_dir() {
        anyhow::bail!("{} is not a directory", in_dir.display());
    }

    let mut report = OrganizeReport::default();
    let mut pending = vec![in_dir.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "Could not read directory: {e}");
                report.failed += 1;
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), "Could not read entry: {e}");
                    report.failed += 1;
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Could not stat: {e}");
                    report.failed += 1;
                    continue;
                }
            };

            if file_type.is_dir() {
                // Never descend into the output tree when it sits inside the input.
                if path != out_dir {
                    pending.push(path);
                }
                continue;
            }
            if !file_type.is_file() || !is_supported_media(&path) {
                report.ignored += 1;
                continue;
            }

            match move_one(&path, out_dir, owner) {
                Ok(Some(dest)) => {
                    tracing::info!(from = %path.display(), to = %dest.display(), "Moved");
                    report.moved += 1;
                }
                Ok(None) => {
                    tracing::info!(path = %path.display(), "Destination exists; leaving in place");
                    report.skipped_existing += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Could not move: {e:#}");
                    report.failed += 1;
                }
            }
        }
    }

    Ok(report)
}

/// Returns `None` when the destination already exists.
fn move_one(path: &Path, out_dir: &Path, owner: &str) -> Result<Option<PathBuf>> {
    let modified: DateTime<Local> = fs::metadata(path)?.modified()?.into();
    let dir = out_dir
        .join(owner)
        .join(format!("{:04}", modified.year()))
        .join(format!("{:02}", modified.month()));
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let name = path.file_name().context("file has no name")?;
    let dest = dir.join(name);
    if dest.exists() {
        return Ok(None);
    }
    fs::rename(path, &dest).with_context(|| format!("moving to {}", dest.display()))?;
    Ok(Some(dest))
}
