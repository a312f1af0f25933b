//! Date-partitioned upload ingestion.
//!
//! An upload is addressed as `/upload/<filename>/<unix_timestamp>`. The
//! timestamp picks the partition `store_root/YYYY/MM/DD`, the filename is kept
//! as sent. Callers resolve the uploader's identity before calling
//! [`UploadIngestor::ingest`]; the ingestor does not re-check it.

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest accepted filename, in bytes.
const MAX_FILENAME_LEN: usize = 255;

/// Give up on version suffixes after this many candidates.
const MAX_VERSION_SUFFIX: u32 = 9_999;

/// What to do when the destination file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Last write wins.
    Overwrite,
    /// Fail with [`UploadError::Collision`].
    Reject,
    /// Write `name-1.ext`, `name-2.ext`, ... instead.
    #[default]
    VersionSuffix,
}

/// Time zone used to turn a timestamp into calendar fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionZone {
    #[default]
    Local,
    Utc,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("malformed upload request: {0}")]
    MalformedRequest(&'static str),

    #[error("could not create directory {}: {source}", .path.display())]
    DirectoryCreateFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not write {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("a file named '{filename}' already exists for that date")]
    Collision { filename: String },
}

/// Filename and timestamp parsed from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub filename: String,
    pub timestamp: i64,
}

impl UploadTarget {
    pub fn new(filename: &str, timestamp: &str) -> Result<Self, UploadError> {
        let filename = validate_filename(filename)?;
        let timestamp = timestamp
            .trim()
            .parse::<i64>()
            .map_err(|_| UploadError::MalformedRequest("timestamp must be an integer"))?;
        Ok(Self {
            filename: filename.to_string(),
            timestamp,
        })
    }

    /// Parse a full `/upload/<filename>/<timestamp>` request path.
    pub fn from_path(path: &str) -> Result<Self, UploadError> {
        let tail = path.strip_prefix("/upload/").ok_or(UploadError::MalformedRequest(
            "expected /upload/<filename>/<timestamp>",
        ))?;
        Self::from_segments(tail)
    }

    /// Parse the `<filename>/<timestamp>` tail captured after `/upload/`.
    /// Exactly two segments are accepted.
    pub fn from_segments(tail: &str) -> Result<Self, UploadError> {
        let mut segments = tail.trim_end_matches('/').split('/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(filename), Some(timestamp), None) => Self::new(filename, timestamp),
            _ => Err(UploadError::MalformedRequest(
                "expected /upload/<filename>/<timestamp>",
            )),
        }
    }
}

/// Where an upload ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub path: PathBuf,
    /// `YYYY/MM/DD/<name>`, relative to the store root.
    pub relative: String,
}

#[derive(Debug, Clone)]
pub struct UploadIngestor {
    store_root: PathBuf,
    policy: CollisionPolicy,
    zone: PartitionZone,
}

impl UploadIngestor {
    pub fn new(store_root: impl Into<PathBuf>, policy: CollisionPolicy, zone: PartitionZone) -> Self {
        Self {
            store_root: store_root.into(),
            policy,
            zone,
        }
    }

    pub fn store_root(&self) -> &Path {
        &self.store_root
    }

    /// Calendar date an upload with `timestamp` is filed under.
    pub fn partition_date(&self, timestamp: i64) -> Result<NaiveDate, UploadError> {
        let date = match self.zone {
            PartitionZone::Local => Local
                .timestamp_opt(timestamp, 0)
                .earliest()
                .map(|dt| dt.date_naive()),
            PartitionZone::Utc => DateTime::<Utc>::from_timestamp(timestamp, 0).map(|dt| dt.date_naive()),
        };
        date.ok_or(UploadError::MalformedRequest("timestamp out of range"))
    }

    /// `store_root/YYYY/MM/DD` for `timestamp`.
    pub fn partition_dir(&self, timestamp: i64) -> Result<PathBuf, UploadError> {
        let date = self.partition_date(timestamp)?;
        Ok(self
            .store_root
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}", date.day())))
    }

    /// Write `body` to the partition for `target`.
    pub fn ingest<R: Read>(
        &self,
        target: &UploadTarget,
        identity: &str,
        mut body: R,
    ) -> Result<StoredUpload, UploadError> {
        let dir = self.partition_dir(target.timestamp)?;
        fs::create_dir_all(&dir).map_err(|source| UploadError::DirectoryCreateFailed {
            path: dir.clone(),
            source,
        })?;

        let (path, mut file) = self.open_destination(&dir, &target.filename)?;

        let written = io::copy(&mut body, &mut file).and_then(|n| file.flush().map(|()| n));
        let bytes = match written {
            Ok(n) => n,
            Err(source) => {
                drop(file);
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), "Could not remove partial upload: {e}");
                }
                return Err(UploadError::WriteFailed { path, source });
            }
        };

        let relative = path
            .strip_prefix(&self.store_root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        tracing::info!(
            identity,
            bytes,
            path = %path.display(),
            "Upload stored"
        );
        Ok(StoredUpload { path, relative })
    }

    fn open_destination(&self, dir: &Path, filename: &str) -> Result<(PathBuf, File), UploadError> {
        let path = dir.join(filename);
        match self.policy {
            CollisionPolicy::Overwrite => {
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&path)
                    .map_err(|source| UploadError::WriteFailed {
                        path: path.clone(),
                        source,
                    })?;
                Ok((path, file))
            }
            CollisionPolicy::Reject => match create_new(&path) {
                Ok(file) => Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(UploadError::Collision {
                    filename: filename.to_string(),
                }),
                Err(source) => Err(UploadError::WriteFailed { path, source }),
            },
            CollisionPolicy::VersionSuffix => {
                for version in 0..=MAX_VERSION_SUFFIX {
                    let candidate = if version == 0 {
                        path.clone()
                    } else {
                        dir.join(versioned_name(filename, version))
                    };
                    match create_new(&candidate) {
                        Ok(file) => return Ok((candidate, file)),
                        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                        Err(source) => {
                            return Err(UploadError::WriteFailed {
                                path: candidate,
                                source,
                            })
                        }
                    }
                }
                Err(UploadError::Collision {
                    filename: filename.to_string(),
                })
            }
        }
    }
}

fn create_new(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// `photo.jpg` -> `photo-2.jpg`; `README` -> `README-2`.
fn versioned_name(filename: &str, version: u32) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{version}.{ext}"),
        _ => format!("{filename}-{version}"),
    }
}

fn validate_filename(name: &str) -> Result<&str, UploadError> {
    if name.is_empty() {
        return Err(UploadError::MalformedRequest("filename is missing"));
    }
    if name == "." || name == ".." {
        return Err(UploadError::MalformedRequest("filename is not a file"));
    }
    if name.len() > MAX_FILENAME_LEN {
        return Err(UploadError::MalformedRequest("filename is too long"));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(UploadError::MalformedRequest(
            "filename must not contain path separators",
        ));
    }
    Ok(name)
}
