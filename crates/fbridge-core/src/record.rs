//! Response records decoded from the result channel.

use serde::{Serialize, Serializer};
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Record Status
// ============================================================================

/// Status attribute of a response record.
///
/// The interpreter reports `OK` or `ERR`; anything else (including a missing
/// `status` attribute) is kept verbatim as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    Ok,
    Err,
    Other(String),
}

impl RecordStatus {
    /// Classifies a raw status token. Matching is case-insensitive.
    pub fn from_token(token: &str) -> Self {
        if token.eq_ignore_ascii_case("ok") {
            Self::Ok
        } else if token.eq_ignore_ascii_case("err") {
            Self::Err
        } else {
            Self::Other(token.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Ok => "OK",
            Self::Err => "ERR",
            Self::Other(raw) => raw,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl Default for RecordStatus {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RecordStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Response Record
// ============================================================================

/// One parsed result line: `KEY = VALUE ; status=.. ; msg=.. ; ts=..`.
///
/// `value` stays raw text; numeric interpretation is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseRecord {
    pub key: Arc<str>,
    pub value: String,
    pub status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Interpreter timestamp, 0 when absent or unparseable.
    pub timestamp: i64,
}

impl ResponseRecord {
    pub fn new(key: impl Into<Arc<str>>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            status: RecordStatus::default(),
            message: None,
            timestamp: 0,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

impl fmt::Display for ResponseRecord {
    /// Renders the record back in result-line form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {} ; status={}", self.key, self.value, self.status)?;
        if let Some(msg) = &self.message {
            write!(f, " ; msg={msg}")?;
        }
        if self.timestamp != 0 {
            write!(f, " ; ts={}", self.timestamp)?;
        }
        Ok(())
    }
}

// ============================================================================
// Response Batch
// ============================================================================

/// All records decoded from one result file, keyed by record key.
///
/// Keys are unique within a batch. Inserting a key twice keeps the later
/// record, mirroring map insertion. Iteration is in key order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct ResponseBatch(BTreeMap<Arc<str>, ResponseRecord>);

impl ResponseBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, returning the one it replaced.
    pub fn insert(&mut self, record: ResponseRecord) -> Option<ResponseRecord> {
        self.0.insert(Arc::clone(&record.key), record)
    }

    pub fn get(&self, key: &str) -> Option<&ResponseRecord> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResponseRecord> {
        self.0.values()
    }

    /// Extracts the record answering a single-command request.
    ///
    /// Prefers the record keyed by `preferred`; otherwise takes the first
    /// record in key order.
    pub fn into_single(mut self, preferred: &str) -> Option<ResponseRecord> {
        if let Some(record) = self.0.remove(preferred) {
            return Some(record);
        }
        self.0.into_values().next()
    }
}

impl IntoIterator for ResponseBatch {
    type Item = ResponseRecord;
    type IntoIter = btree_map::IntoValues<Arc<str>, ResponseRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_values()
    }
}

impl FromIterator<ResponseRecord> for ResponseBatch {
    fn from_iter<I: IntoIterator<Item = ResponseRecord>>(iter: I) -> Self {
        let mut batch = Self::new();
        for record in iter {
            batch.insert(record);
        }
        batch
    }
}
