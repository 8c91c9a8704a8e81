//! Result-file change detection.
//!
//! A check reports a change only when the modification time differs from
//! the baseline AND the content is non-empty AND the content differs from
//! the baseline content. Coarse mtime resolution alone can therefore never
//! produce a false positive, and an empty file (an interpreter that has
//! truncated but not yet written) is never returned.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use tracing::{debug, trace};

/// Decodes result bytes, replacing invalid UTF-8 with U+FFFD.
///
/// Interpreters may emit messages in a legacy code page; the record
/// structure is ASCII and survives the replacement.
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Last observed state of the result file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    /// `None` until the file has been observed.
    pub modified: Option<SystemTime>,
    pub content: String,
}

impl Baseline {
    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.modified.is_some()
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The file exists but holds nothing new.
    Unchanged,
    /// The file holds a new, non-empty result.
    Changed { content: String, modified: SystemTime },
    /// The file does not exist.
    Missing,
}

/// Checks one file against a [`Baseline`].
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    path: PathBuf,
    settle: Duration,
}

impl ChangeDetector {
    /// `settle` is slept between noticing a new mtime and reading, so a
    /// writer that does not rename atomically has time to finish.
    pub fn new(path: impl Into<PathBuf>, settle: Duration) -> Self {
        Self {
            path: path.into(),
            settle,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compares the file on disk with `baseline`.
    ///
    /// Filesystem errors other than "not found" are logged and reported as
    /// `Unchanged`; the caller keeps polling until its deadline.
    pub fn check(&self, baseline: &Baseline) -> ChangeOutcome {
        let modified = match fs::metadata(&self.path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return ChangeOutcome::Missing,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Failed to stat result file");
                return ChangeOutcome::Unchanged;
            }
        };

        if baseline.modified == Some(modified) {
            return ChangeOutcome::Unchanged;
        }

        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }

        let content = match fs::read(&self.path) {
            Ok(bytes) => decode(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return ChangeOutcome::Missing,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Failed to read result file");
                return ChangeOutcome::Unchanged;
            }
        };

        if content.is_empty() || content == baseline.content {
            trace!(
                path = %self.path.display(),
                empty = content.is_empty(),
                "New mtime without new content"
            );
            return ChangeOutcome::Unchanged;
        }

        ChangeOutcome::Changed { content, modified }
    }

    /// Captures the current file state as a baseline.
    ///
    /// A missing or unreadable file yields the empty baseline.
    pub fn snapshot(&self) -> Baseline {
        let modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        let content = match modified {
            Some(_) => fs::read(&self.path).map(decode).unwrap_or_default(),
            None => String::new(),
        };
        Baseline { modified, content }
    }
}
