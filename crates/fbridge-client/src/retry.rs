//! Bounded retry with a fixed backoff.

use std::thread;
use std::time::Duration;

use fbridge_core::{BridgeError, Result};

/// Runs `attempt` up to `max_attempts` times, sleeping `backoff` between
/// attempts.
///
/// `max_attempts` of zero is treated as one. Only errors for which
/// [`BridgeError::is_retryable`] holds are retried; anything else is
/// returned at once. `on_retry(attempt, max_attempts, &error)` is called
/// before each sleep. The last error is returned when attempts run out.
pub fn retry_bounded<T, F, R>(
    max_attempts: u32,
    backoff: Duration,
    mut attempt: F,
    mut on_retry: R,
) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
    R: FnMut(u32, u32, &BridgeError),
{
    let max_attempts = max_attempts.max(1);
    let mut n = 1;
    loop {
        match attempt(n) {
            Ok(value) => return Ok(value),
            Err(e) if n < max_attempts && e.is_retryable() => {
                on_retry(n, max_attempts, &e);
                if !backoff.is_zero() {
                    thread::sleep(backoff);
                }
                n += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
