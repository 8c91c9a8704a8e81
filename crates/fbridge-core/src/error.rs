//! Error types for the file-channel bridge.
//!
//! Every failure a caller can observe from a `Bridge` operation is one
//! variant of [`BridgeError`]. Failures are always returned as values; the
//! bridge additionally remembers the most recent one as its "last error".
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// ============================================================================
// Bridge Error Type
// ============================================================================

/// Bridge errors.
///
/// # Error Handling
///
/// - `Timeout` is the only way an absent or stalled interpreter shows up;
///   the bridge cannot tell "crashed" from "busy".
/// - `NoResult` means the interpreter answered but no line parsed as a record.
/// - `Io` carries the operation and the path it touched.
///
/// # Example
///
/// ```rust,ignore
/// use fbridge_core::{BridgeError, Result};
///
/// fn check(commands: &[String]) -> Result<()> {
///     if commands.is_empty() {
///         return Err(BridgeError::InvalidArgument("empty command batch".to_string()));
///     }
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The bridge has not been initialized yet.
    #[error("Bridge is not initialized")]
    NotInitialized,

    /// The bridge was cleaned up. A new bridge must be constructed.
    #[error("Bridge is closed")]
    Closed,

    /// A caller-supplied argument was rejected before touching the channel.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A filesystem operation on one of the channel files failed.
    #[error("IO error ({op}) on {}: {source}", path.display())]
    Io {
        /// Short description of what was being attempted.
        op: &'static str,
        /// The file or directory involved.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No fresh result appeared before the deadline.
    #[error("Timed out after {}ms waiting for result", waited.as_millis())]
    Timeout {
        /// How long the wait lasted.
        waited: Duration,
    },

    /// A result arrived but contained no parseable records.
    #[error("No result returned")]
    NoResult,

    /// The interpreter answered a single command with a non-OK status.
    #[error("Command for {key} failed with status {status:?}{}", message_suffix(.message))]
    CommandFailed {
        key: String,
        status: String,
        message: Option<String>,
    },

    /// The configuration violates a constraint.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(msg) if !msg.is_empty() => format!(": {msg}"),
        _ => String::new(),
    }
}

impl BridgeError {
    /// Builds an [`BridgeError::Io`] from its parts.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Returns true if repeating the same request could plausibly succeed.
    ///
    /// State and argument errors are permanent for a given call; channel
    /// errors depend on the external interpreter and may clear up.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::NoResult | Self::CommandFailed { .. } | Self::Io { .. }
        )
    }

    /// Returns true for [`BridgeError::Timeout`].
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Convenience Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

// ============================================================================
// Tests
// ============================================================================
