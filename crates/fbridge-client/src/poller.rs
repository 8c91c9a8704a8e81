//! Adaptive polling.
//!
//! The poller checks the result file at the fast interval while an answer
//! is expected and falls back to the slow interval once enough consecutive
//! checks have come back empty. Every wait is bounded by its deadline; a
//! sleep is never longer than the time left.

use std::thread;
use std::time::{Duration, Instant, SystemTime};

use fbridge_core::{BridgeError, ChannelConfig, Result};
use tracing::{debug, trace, warn};

use crate::detector::{Baseline, ChangeDetector, ChangeOutcome};

// ============================================================================
// Poll State
// ============================================================================

/// Mutable state carried between waits.
#[derive(Debug, Clone, Default)]
pub struct PollState {
    /// Last result the bridge consumed.
    pub baseline: Baseline,
    /// Consecutive checks that found nothing new.
    pub idle_polls: u32,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Set once the start-up grace period has been spent.
    primed: bool,
}

impl PollState {
    /// Forgets everything, including whether the grace period was spent.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Forgets the last consumed result so any new non-empty file counts.
    pub fn reset_baseline(&mut self) {
        self.baseline = Baseline::default();
    }

    /// Sets the baseline for a new request.
    ///
    /// `cleared` tells whether the previous result file was removed. If it
    /// was not, whatever is on disk now becomes the baseline so the leftover
    /// answer is never taken for the new one.
    pub fn begin_request(&mut self, detector: &ChangeDetector, cleared: bool) {
        if cleared {
            self.reset_baseline();
        } else {
            self.baseline = detector.snapshot();
        }
    }

    /// Records a consumed result.
    pub fn record_change(&mut self, content: &str, modified: SystemTime) {
        self.baseline = Baseline {
            modified: Some(modified),
            content: content.to_string(),
        };
        self.idle_polls = 0;
    }

    /// Clears the per-request counters after a successful round-trip.
    pub fn complete_round_trip(&mut self) {
        self.idle_polls = 0;
        self.last_error = None;
    }

    #[must_use]
    pub fn is_primed(&self) -> bool {
        self.primed
    }
}

// ============================================================================
// Adaptive Poller
// ============================================================================

/// Interval schedule and wait loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptivePoller {
    fast: Duration,
    slow: Duration,
    idle_threshold: u32,
    grace: Duration,
}

impl AdaptivePoller {
    pub fn new(fast: Duration, slow: Duration, idle_threshold: u32, grace: Duration) -> Self {
        Self {
            fast,
            slow: slow.max(fast),
            idle_threshold,
            grace,
        }
    }

    pub fn from_config(config: &ChannelConfig) -> Self {
        Self::new(
            config.poll_interval(),
            config.idle_interval(),
            config.idle_threshold,
            config.startup_grace(),
        )
    }

    /// Interval to sleep after `idle_polls` consecutive empty checks.
    #[must_use]
    pub fn interval_for(&self, idle_polls: u32) -> Duration {
        if idle_polls >= self.idle_threshold {
            self.slow
        } else {
            self.fast
        }
    }

    /// Blocks until `detector` reports a new result or `timeout` elapses.
    ///
    /// On success the baseline in `state` is advanced to the returned
    /// content. On timeout `state.last_error` is set and
    /// [`BridgeError::Timeout`] is returned.
    pub fn wait_for_change(
        &self,
        detector: &ChangeDetector,
        state: &mut PollState,
        timeout: Duration,
    ) -> Result<String> {
        let start = Instant::now();

        if !state.primed {
            state.primed = true;
            if !state.baseline.is_observed()
                && detector.check(&state.baseline) == ChangeOutcome::Missing
            {
                let grace = self.grace.min(timeout);
                trace!(grace_ms = grace.as_millis() as u64, "Result file absent, waiting for interpreter");
                thread::sleep(grace);
            }
        }

        loop {
            if let ChangeOutcome::Changed { content, modified } = detector.check(&state.baseline) {
                debug!(
                    bytes = content.len(),
                    waited_ms = start.elapsed().as_millis() as u64,
                    "Result file changed"
                );
                state.record_change(&content, modified);
                return Ok(content);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                let err = BridgeError::Timeout { waited: elapsed };
                warn!(
                    path = %detector.path().display(),
                    waited_ms = elapsed.as_millis() as u64,
                    "No result before deadline"
                );
                state.last_error = Some(err.to_string());
                return Err(err);
            }

            let interval = self.interval_for(state.idle_polls).min(timeout - elapsed);
            thread::sleep(interval);

            state.idle_polls = state.idle_polls.saturating_add(1);
            if state.idle_polls == self.idle_threshold {
                debug!(
                    idle_polls = state.idle_polls,
                    interval_ms = self.slow.as_millis() as u64,
                    "Switching to idle poll interval"
                );
            }
        }
    }
}
