//! The request/response orchestrator.
//!
//! A [`Bridge`] owns one channel directory and serializes every exchange
//! over it:
//!
//! 1. remove any stale result file and forget the last consumed result
//! 2. write the command batch atomically
//! 3. poll the result file until a fresh non-empty answer appears
//! 4. parse it into a [`ResponseBatch`]
//!
//! The calling thread does all the work; there is no background thread.
//! One mutex covers `initialize`, `execute_commands` and `cleanup`, so at
//! most one batch is ever in flight per bridge.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fbridge_core::{
    BridgeError, BridgeState, ChannelConfig, ResponseBatch, ResponseCache, ResponseRecord, Result,
};
use fbridge_protocol::{encode_batch, module_offset_address, parse_results_with, Command, STOP_SENTINEL};
use tracing::debug;

use crate::detector::ChangeDetector;
use crate::log::{BridgeLog, LogBuffer, LogLevel};
use crate::poller::{AdaptivePoller, PollState};
use crate::retry::retry_bounded;
use crate::writer::{ensure_dir, remove_if_exists, write_atomic};

/// State guarded by the request lock.
#[derive(Debug)]
struct Inner {
    poll: PollState,
    cache: ResponseCache,
}

/// Client side of a file channel.
///
/// # Example
///
/// ```rust,ignore
/// use fbridge_client::Bridge;
/// use fbridge_core::ChannelConfig;
///
/// let bridge = Bridge::new(ChannelConfig::with_base_dir("/tmp/chan"))?;
/// bridge.initialize()?;
/// let value = bridge.read("game.exe+0x10", None)?.value;
/// ```
#[derive(Debug)]
pub struct Bridge {
    config: ChannelConfig,
    state: AtomicU8,
    inner: Mutex<Inner>,
    log: BridgeLog,
    detector: ChangeDetector,
    poller: AdaptivePoller,
}

impl Bridge {
    /// Creates an uninitialized bridge. Nothing touches the filesystem yet.
    pub fn new(config: ChannelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: AtomicU8::new(BridgeState::Uninitialized.as_u8()),
            inner: Mutex::new(Inner {
                poll: PollState::default(),
                cache: ResponseCache::new(config.cache_capacity),
            }),
            log: BridgeLog::new(config.verbose),
            detector: ChangeDetector::new(config.result_path(), config.settle()),
            poller: AdaptivePoller::from_config(&config),
            config,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Current lifecycle state. Never blocks.
    pub fn state(&self) -> BridgeState {
        BridgeState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state().is_usable()
    }

    /// Message of the most recent failure, if any.
    ///
    /// Blocks while a batch is in flight.
    pub fn last_error(&self) -> Option<String> {
        self.lock().poll.last_error.clone()
    }

    /// Routes every bridge log message to `callback` as well.
    ///
    /// The callback must not call back into this bridge.
    pub fn set_log_callback<F>(&self, callback: F)
    where
        F: Fn(LogLevel, &str) + Send + Sync + 'static,
    {
        self.log.set_callback(Box::new(callback));
    }

    /// Parses a decimal or `0x` hex literal, memoized per bridge.
    pub fn parse_number(&self, text: &str) -> Option<i64> {
        self.lock().cache.numbers.parse(text)
    }

    fn set_state(&self, state: BridgeState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Logs `err`, stores it as the last error and returns it.
    fn fail(&self, inner: &mut Inner, err: BridgeError) -> BridgeError {
        let message = err.to_string();
        self.log.error(&message);
        inner.poll.last_error = Some(message);
        err
    }

    /// Same as [`Self::fail`] for callers not holding the lock.
    fn fail_unlocked(&self, err: BridgeError) -> BridgeError {
        let mut inner = self.lock();
        self.fail(&mut inner, err)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Prepares the channel directory and moves to `Ready`.
    ///
    /// Creates the directory if missing and removes command, result and
    /// stop files left over from a previous run. Calling it again on a
    /// ready bridge repeats the preparation.
    pub fn initialize(&self) -> Result<()> {
        let mut inner = self.lock();

        if self.state() == BridgeState::Closed {
            return Err(self.fail(&mut inner, BridgeError::Closed));
        }
        if let Err(e) = ensure_dir(&self.config.base_dir) {
            return Err(self.fail(&mut inner, e));
        }

        self.log.attach(LogBuffer::new(
            self.config.log_path(),
            self.config.log_flush_lines,
            self.config.log_flush_interval(),
        ));

        for path in [
            self.config.command_path(),
            self.config.result_path(),
            self.config.stop_path(),
        ] {
            match remove_if_exists(&path) {
                Ok(true) => debug!(path = %path.display(), "Removed stale channel file"),
                Ok(false) => {}
                Err(e) => self.log.warn(&format!("Could not clear stale file: {e}")),
            }
        }

        inner.poll.reset();
        inner.cache.clear();
        self.set_state(BridgeState::Ready);
        self.log.info(&format!(
            "Bridge initialized at {}",
            self.config.base_dir.display()
        ));
        Ok(())
    }

    /// Flushes the log, drops caches and moves to `Closed`.
    ///
    /// Idempotent. A closed bridge cannot be reopened.
    pub fn cleanup(&self) {
        let mut inner = self.lock();
        if self.state() == BridgeState::Closed {
            return;
        }

        self.log.info("Bridge cleaned up");
        self.log.flush();
        inner.cache.clear();
        self.set_state(BridgeState::Closed);
    }

    // ========================================================================
    // Request / Response
    // ========================================================================

    /// Sends `commands` as one batch and waits for the interpreter's answer.
    ///
    /// `timeout` defaults to the configured `default_timeout_ms`. Concurrent
    /// callers queue behind one another.
    pub fn execute_commands<S: AsRef<str>>(
        &self,
        commands: &[S],
        timeout: Option<Duration>,
    ) -> Result<ResponseBatch> {
        let mut inner = self.lock();

        match self.state() {
            BridgeState::Uninitialized => {
                return Err(self.fail(&mut inner, BridgeError::NotInitialized))
            }
            BridgeState::Closed => return Err(self.fail(&mut inner, BridgeError::Closed)),
            // InFlight here means a previous holder panicked mid-request.
            BridgeState::Ready | BridgeState::InFlight => {}
        }

        let payload = match encode_batch(commands) {
            Ok(payload) => payload,
            Err(e) => return Err(self.fail(&mut inner, e)),
        };

        self.set_state(BridgeState::InFlight);
        let outcome = self.round_trip(
            &mut inner,
            &payload,
            commands.len(),
            timeout.unwrap_or_else(|| self.config.default_timeout()),
        );
        self.set_state(BridgeState::Ready);

        outcome.map_err(|e| self.fail(&mut inner, e))
    }

    fn round_trip(
        &self,
        inner: &mut Inner,
        payload: &str,
        count: usize,
        timeout: Duration,
    ) -> Result<ResponseBatch> {
        let result_path = self.config.result_path();
        let cleared = match remove_if_exists(&result_path) {
            Ok(_) => true,
            Err(e) => {
                self.log.warn(&format!("Could not clear previous result: {e}"));
                false
            }
        };
        inner.poll.begin_request(&self.detector, cleared);

        write_atomic(&self.config.command_path(), payload.as_bytes())?;
        self.log.debug(&format!("Executed {count} commands"));

        let content = self
            .poller
            .wait_for_change(&self.detector, &mut inner.poll, timeout)?;

        let batch = parse_results_with(&content, &mut inner.cache.strings);
        inner.cache.end_batch();

        if batch.is_empty() {
            return Err(BridgeError::NoResult);
        }

        inner.poll.complete_round_trip();
        debug!(records = batch.len(), "Batch complete");
        Ok(batch)
    }

    /// Runs one typed command and returns its record.
    ///
    /// The record keyed by the command's target is preferred; otherwise the
    /// first record is used. A non-OK status is a
    /// [`BridgeError::CommandFailed`].
    pub fn execute_single(&self, command: &Command, timeout: Option<Duration>) -> Result<ResponseRecord> {
        if let Err(e) = command.validate() {
            return Err(self.fail_unlocked(e));
        }

        let batch = self.execute_commands(&[command.to_string()], timeout)?;
        let record = match batch.into_single(command.response_key()) {
            Some(record) => record,
            None => return Err(self.fail_unlocked(BridgeError::NoResult)),
        };

        if !record.is_ok() {
            return Err(self.fail_unlocked(BridgeError::CommandFailed {
                key: record.key.to_string(),
                status: record.status.to_string(),
                message: record.message.clone(),
            }));
        }
        Ok(record)
    }

    // ========================================================================
    // Convenience Wrappers
    // ========================================================================

    pub fn read(&self, address: &str, timeout: Option<Duration>) -> Result<ResponseRecord> {
        self.execute_single(&Command::read(address), timeout)
    }

    pub fn write(&self, address: &str, value: &str, timeout: Option<Duration>) -> Result<ResponseRecord> {
        self.execute_single(&Command::write(address, value), timeout)
    }

    pub fn module_base(&self, module: &str, timeout: Option<Duration>) -> Result<ResponseRecord> {
        self.execute_single(&Command::module_base(module), timeout)
    }

    /// Follows a pointer chain starting at `base`.
    pub fn read_pointer<S: AsRef<str>>(
        &self,
        base: &str,
        offsets: &[S],
        timeout: Option<Duration>,
    ) -> Result<ResponseRecord> {
        let command = Command::pointer(base, offsets.iter().map(|o| o.as_ref().to_string()));
        self.execute_single(&command, timeout)
    }

    /// Reads `<module>+0x<offset>`.
    pub fn read_module_offset(
        &self,
        module: &str,
        offset: u64,
        timeout: Option<Duration>,
    ) -> Result<ResponseRecord> {
        self.read(&module_offset_address(module, offset), timeout)
    }

    /// Writes `value` to `<module>+0x<offset>`.
    pub fn write_module_offset(
        &self,
        module: &str,
        offset: u64,
        value: &str,
        timeout: Option<Duration>,
    ) -> Result<ResponseRecord> {
        self.write(&module_offset_address(module, offset), value, timeout)
    }

    /// [`Self::read`] with up to `max_retries` attempts and a fixed backoff.
    ///
    /// Zero is treated as one attempt. State and argument errors are not
    /// retried.
    pub fn read_with_retry(
        &self,
        address: &str,
        max_retries: u32,
        timeout: Option<Duration>,
    ) -> Result<ResponseRecord> {
        retry_bounded(
            max_retries,
            self.config.retry_backoff(),
            |_| self.read(address, timeout),
            |attempt, total, err| {
                self.log
                    .warn(&format!("read failed, retry {attempt}/{total}: {err}"));
            },
        )
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// Asks the interpreter to stop. Fire-and-forget.
    ///
    /// Independent of the request lock and of the lifecycle state.
    pub fn send_stop_signal(&self) -> Result<()> {
        let path = self.config.stop_path();
        let written = ensure_dir(&self.config.base_dir)
            .and_then(|()| write_atomic(&path, STOP_SENTINEL.as_bytes()));

        match written {
            Ok(()) => {
                self.log.info("Stop signal sent");
                Ok(())
            }
            Err(e) => Err(self.fail_unlocked(e)),
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if self.is_ready() {
            self.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_config(dir: &tempfile::TempDir) -> ChannelConfig {
        let mut config = ChannelConfig::with_base_dir(dir.path().join("chan"));
        config.poll_interval_ms = 5;
        config.idle_interval_ms = 20;
        config.startup_grace_ms = 0;
        config.settle_ms = 0;
        config.retry_backoff_ms = 0;
        config
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.poll_interval_ms = 0;
        assert!(matches!(Bridge::new(config), Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_new_is_uninitialized_and_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(test_config(&dir)).unwrap();
        assert_eq!(bridge.state(), BridgeState::Uninitialized);
        assert!(!bridge.is_ready());
        assert!(!dir.path().join("chan").exists());
    }

    #[test]
    fn test_execute_before_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(test_config(&dir)).unwrap();

        let err = bridge.execute_commands(&["READ A"], None).unwrap_err();
        assert!(matches!(err, BridgeError::NotInitialized));
        assert_eq!(bridge.last_error().as_deref(), Some("Bridge is not initialized"));
    }

    #[test]
    fn test_initialize_creates_dir_and_clears_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        fs::create_dir_all(&config.base_dir).unwrap();
        fs::write(config.command_path(), "READ OLD").unwrap();
        fs::write(config.result_path(), "OLD = 1").unwrap();
        fs::write(config.stop_path(), "STOP").unwrap();

        let bridge = Bridge::new(config.clone()).unwrap();
        bridge.initialize().unwrap();

        assert_eq!(bridge.state(), BridgeState::Ready);
        assert!(!config.command_path().exists());
        assert!(!config.result_path().exists());
        assert!(!config.stop_path().exists());
    }

    #[test]
    fn test_empty_batch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(test_config(&dir)).unwrap();
        bridge.initialize().unwrap();

        let empty: [&str; 0] = [];
        let err = bridge.execute_commands(&empty, None).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
        assert_eq!(bridge.state(), BridgeState::Ready);
        assert!(!bridge.config().command_path().exists());
    }

    #[test]
    fn test_timeout_without_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(test_config(&dir)).unwrap();
        bridge.initialize().unwrap();

        let err = bridge
            .execute_commands(&["READ A"], Some(Duration::from_millis(30)))
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(bridge.state(), BridgeState::Ready);
        assert_eq!(
            fs::read_to_string(bridge.config().command_path()).unwrap(),
            "READ A\n"
        );
        assert!(bridge.last_error().unwrap().starts_with("Timed out"));
    }

    #[test]
    fn test_cleanup_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(test_config(&dir)).unwrap();
        bridge.initialize().unwrap();

        bridge.cleanup();
        assert_eq!(bridge.state(), BridgeState::Closed);
        bridge.cleanup();

        assert!(matches!(bridge.initialize(), Err(BridgeError::Closed)));
        assert!(matches!(
            bridge.execute_commands(&["READ A"], None),
            Err(BridgeError::Closed)
        ));
    }

    #[test]
    fn test_cleanup_flushes_log() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(test_config(&dir)).unwrap();
        bridge.initialize().unwrap();
        bridge.cleanup();

        let log = fs::read_to_string(bridge.config().log_path()).unwrap();
        assert!(log.contains("INFO Bridge initialized"));
        assert!(log.contains("INFO Bridge cleaned up"));
    }

    #[test]
    fn test_invalid_command_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(test_config(&dir)).unwrap();
        bridge.initialize().unwrap();

        let err = bridge.read("", None).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
        assert!(!bridge.config().command_path().exists());
    }

    #[test]
    fn test_parse_number_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(test_config(&dir)).unwrap();
        assert_eq!(bridge.parse_number("0x10"), Some(16));
        assert_eq!(bridge.parse_number("0x10"), Some(16));
        assert_eq!(bridge.parse_number("-5"), Some(-5));
        assert_eq!(bridge.parse_number("nope"), None);
    }

    #[test]
    fn test_stop_signal_without_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(test_config(&dir)).unwrap();

        bridge.send_stop_signal().unwrap();
        assert_eq!(
            fs::read_to_string(bridge.config().stop_path()).unwrap(),
            STOP_SENTINEL
        );
    }

    #[test]
    fn test_non_utf8_answer_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(test_config(&dir)).unwrap();
        bridge.initialize().unwrap();

        let command_path = bridge.config().command_path();
        let result_path = bridge.config().result_path();
        let interpreter = std::thread::spawn(move || {
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            while !command_path.exists() && std::time::Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
            write_atomic(&result_path, b"A = 1 ; status=OK ; msg=\xB6\xC1\xC8\xA1").unwrap();
        });

        let record = bridge.read("A", Some(Duration::from_secs(2))).unwrap();
        interpreter.join().unwrap();

        assert_eq!(record.value, "1");
        assert!(record.message.unwrap().contains('\u{FFFD}'));
    }

    #[test]
    fn test_drop_flushes_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = {
            let bridge = Bridge::new(test_config(&dir)).unwrap();
            bridge.initialize().unwrap();
            bridge.config().log_path()
        };
        assert!(fs::read_to_string(log_path).unwrap().contains("cleaned up"));
    }
}
