//! Snapshot reader for the shared metrics file.
//!
//! Each [`SnapshotReader::read`] call runs four steps in order and stops at the
//! first failure: existence check, full read, JSON parse, field validation.
//! There is no retry inside a call; the polling cadence is the retry.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::collector::traits::FileSystem;
use crate::model::{RawSnapshot, Snapshot};

/// Why a read produced no snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadFailure {
    /// The file does not exist yet (workload still starting).
    NotYetAvailable { path: PathBuf },
    /// The bytes are not a JSON document. Torn or in-progress writes land here.
    Malformed { detail: String },
    /// Valid JSON, but not an acceptable snapshot.
    Invalid { detail: String },
}

impl ReadFailure {
    /// Short label attached to failure log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ReadFailure::NotYetAvailable { .. } => "not_yet_available",
            ReadFailure::Malformed { .. } => "malformed",
            ReadFailure::Invalid { .. } => "invalid",
        }
    }

    /// `NotYetAvailable` is the expected cold-start state, not a fault.
    pub fn is_expected(&self) -> bool {
        matches!(self, ReadFailure::NotYetAvailable { .. })
    }
}

impl fmt::Display for ReadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadFailure::NotYetAvailable { path } => {
                write!(f, "metrics file {} does not exist yet", path.display())
            }
            ReadFailure::Malformed { detail } => write!(f, "malformed metrics file: {}", detail),
            ReadFailure::Invalid { detail } => write!(f, "invalid metrics file: {}", detail),
        }
    }
}

impl std::error::Error for ReadFailure {}

/// Reads and validates snapshots from a single file.
pub struct SnapshotReader<F: FileSystem> {
    fs: F,
    path: PathBuf,
}

impl<F: FileSystem> SnapshotReader<F> {
    /// Creates a reader for `path` on the given filesystem.
    pub fn new(fs: F, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file once and returns the validated snapshot.
    pub fn read(&self) -> Result<Snapshot, ReadFailure> {
        if !self.fs.exists(&self.path) {
            return Err(ReadFailure::NotYetAvailable {
                path: self.path.clone(),
            });
        }

        let content = match self.fs.read_to_string(&self.path) {
            Ok(content) => content,
            // Removed between the existence check and the read.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ReadFailure::NotYetAvailable {
                    path: self.path.clone(),
                });
            }
            Err(e) => {
                return Err(ReadFailure::Malformed {
                    detail: format!("cannot read {}: {}", self.path.display(), e),
                });
            }
        };

        parse_snapshot(&content)
    }
}

/// Parses and validates a snapshot document.
///
/// Syntax errors (including empty or truncated input) are `Malformed`;
/// structural mismatches and bad field values are `Invalid`.
pub fn parse_snapshot(content: &str) -> Result<Snapshot, ReadFailure> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|e| ReadFailure::Malformed {
            detail: e.to_string(),
        })?;

    if !value.is_object() {
        return Err(ReadFailure::Invalid {
            detail: "top-level value is not an object".to_string(),
        });
    }

    let raw: RawSnapshot = serde_json::from_value(value).map_err(|e| ReadFailure::Invalid {
        detail: e.to_string(),
    })?;

    Snapshot::try_from(raw).map_err(|e| ReadFailure::Invalid { detail: e.0 })
}
