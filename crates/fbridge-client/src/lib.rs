//! fbridge Client - Polling transport and orchestrator for the file channel
//!
//! This crate moves command batches and result documents through a shared
//! directory:
//!
//! - [`writer`]: atomic temp-file-then-rename writes
//! - [`detector`]: mtime + content change detection on the result file
//! - [`poller`]: adaptive fast/slow wait loop with a hard deadline
//! - [`log`]: buffered channel log file and callback fan-out
//! - [`bridge`]: the [`Bridge`] that ties them together
//!
//! Everything runs on the caller's thread. The interpreter on the other
//! side must publish results by writing a temporary file and renaming it
//! over the result file; a non-atomic writer may be observed mid-write.

pub mod bridge;
pub mod detector;
pub mod log;
pub mod poller;
pub mod retry;
pub mod writer;

pub use bridge::Bridge;
pub use detector::{Baseline, ChangeDetector, ChangeOutcome};
pub use log::{BridgeLog, LogBuffer, LogCallback, LogLevel};
pub use poller::{AdaptivePoller, PollState};
pub use retry::retry_bounded;
pub use writer::write_atomic;
