//! Bridge log side-channel.
//!
//! Every bridge message goes to three places: a `tracing` event, an
//! optional caller callback, and a buffered append-only log file inside
//! the shared directory. The file is written when the buffer reaches its
//! line limit or its age limit, and on cleanup.
//!
//! Log file lines look like:
//!
//! ```text
//! [2024-05-01 12:00:00] INFO Bridge initialized
//! ```

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

/// Severity of a bridge log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives every bridge log message.
pub type LogCallback = Box<dyn Fn(LogLevel, &str) + Send + Sync>;

// ============================================================================
// Log Buffer
// ============================================================================

/// Timestamped lines waiting to be appended to the log file.
#[derive(Debug)]
pub struct LogBuffer {
    path: PathBuf,
    lines: Vec<String>,
    max_lines: usize,
    max_age: Duration,
    last_flush: Instant,
}

impl LogBuffer {
    pub fn new(path: impl Into<PathBuf>, max_lines: usize, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            lines: Vec::new(),
            max_lines: max_lines.max(1),
            max_age,
            last_flush: Instant::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of lines not yet written.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lines.len()
    }

    /// Formats one log file line, newline included.
    pub fn format_line(at: DateTime<Local>, level: LogLevel, message: &str) -> String {
        format!("[{}] {} {}\n", at.format("%Y-%m-%d %H:%M:%S"), level, message)
    }

    /// Buffers a line, flushing if either limit is reached.
    ///
    /// A failed flush is reported through `tracing` and the lines are
    /// dropped; logging never fails a bridge operation.
    pub fn push(&mut self, level: LogLevel, message: &str) {
        self.lines
            .push(Self::format_line(Local::now(), level, message));

        if self.lines.len() >= self.max_lines || self.last_flush.elapsed() >= self.max_age {
            if let Err(e) = self.flush() {
                warn!(path = %self.path.display(), error = %e, "Failed to flush bridge log");
            }
        }
    }

    /// Appends all buffered lines to the log file.
    ///
    /// The buffer is emptied whether or not the write succeeds.
    pub fn flush(&mut self) -> io::Result<()> {
        self.last_flush = Instant::now();
        if self.lines.is_empty() {
            return Ok(());
        }

        let lines = std::mem::take(&mut self.lines);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for line in &lines {
            file.write_all(line.as_bytes())?;
        }
        file.flush()
    }
}

impl Drop for LogBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "Failed to flush bridge log on drop");
        }
    }
}

// ============================================================================
// Bridge Log
// ============================================================================

#[derive(Default)]
struct Sinks {
    buffer: Option<LogBuffer>,
    callback: Option<LogCallback>,
}

/// Fans bridge messages out to `tracing`, the callback, the log file and,
/// when verbose, stderr.
///
/// The callback runs while the sink lock is held, so it must not log
/// through the same bridge.
pub struct BridgeLog {
    sinks: Mutex<Sinks>,
    verbose: bool,
}

impl fmt::Debug for BridgeLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sinks = self.lock();
        f.debug_struct("BridgeLog")
            .field("buffer", &sinks.buffer)
            .field("callback", &sinks.callback.is_some())
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl BridgeLog {
    pub fn new(verbose: bool) -> Self {
        Self {
            sinks: Mutex::new(Sinks::default()),
            verbose,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Sinks> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts buffering to a log file. Any previous buffer is flushed first.
    pub fn attach(&self, buffer: LogBuffer) {
        self.lock().buffer = Some(buffer);
    }

    pub fn set_callback(&self, callback: LogCallback) {
        self.lock().callback = Some(callback);
    }

    /// Writes buffered lines to the log file now.
    pub fn flush(&self) {
        if let Some(buffer) = self.lock().buffer.as_mut() {
            if let Err(e) = buffer.flush() {
                warn!(path = %buffer.path().display(), error = %e, "Failed to flush bridge log");
            }
        }
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => debug!("{message}"),
            LogLevel::Info => info!("{message}"),
            LogLevel::Warn => warn!("{message}"),
            LogLevel::Error => error!("{message}"),
        }

        if self.verbose {
            eprintln!("[{level}] {message}");
        }

        let mut sinks = self.lock();
        if let Some(callback) = sinks.callback.as_ref() {
            callback(level, message);
        }
        if let Some(buffer) = sinks.buffer.as_mut() {
            buffer.push(level, message);
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use std::sync::Arc;

    #[test]
    fn test_format_line() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            LogBuffer::format_line(at, LogLevel::Info, "Bridge initialized"),
            "[2024-05-01 12:00:00] INFO Bridge initialized\n"
        );
    }

    #[test]
    fn test_buffer_holds_until_line_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge_log.txt");
        let mut buffer = LogBuffer::new(&path, 3, Duration::from_secs(3600));

        buffer.push(LogLevel::Info, "one");
        buffer.push(LogLevel::Info, "two");
        assert!(!path.exists());
        assert_eq!(buffer.pending(), 2);

        buffer.push(LogLevel::Warn, "three");
        assert_eq!(buffer.pending(), 0);
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(2).unwrap().ends_with("WARN three"));
    }

    #[test]
    fn test_buffer_flushes_when_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge_log.txt");
        let mut buffer = LogBuffer::new(&path, 100, Duration::ZERO);

        buffer.push(LogLevel::Debug, "immediately");
        assert_eq!(buffer.pending(), 0);
        assert!(fs::read_to_string(&path).unwrap().contains("DEBUG immediately"));
    }

    #[test]
    fn test_flush_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge_log.txt");
        fs::write(&path, "existing\n").unwrap();

        let mut buffer = LogBuffer::new(&path, 100, Duration::from_secs(3600));
        buffer.push(LogLevel::Error, "boom");
        buffer.flush().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("existing\n"));
        assert!(text.ends_with("ERROR boom\n"));
    }

    #[test]
    fn test_drop_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge_log.txt");
        {
            let mut buffer = LogBuffer::new(&path, 100, Duration::from_secs(3600));
            buffer.push(LogLevel::Info, "bye");
        }
        assert!(fs::read_to_string(&path).unwrap().contains("INFO bye"));
    }

    #[test]
    fn test_flush_failure_drops_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("bridge_log.txt");
        let mut buffer = LogBuffer::new(&path, 100, Duration::from_secs(3600));

        buffer.push(LogLevel::Info, "lost");
        assert!(buffer.flush().is_err());
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_bridge_log_invokes_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = BridgeLog::new(false);
        let sink = Arc::clone(&seen);
        log.set_callback(Box::new(move |level, msg| {
            sink.lock().unwrap().push((level, msg.to_string()));
        }));

        log.info("hello");
        log.error("oops");

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (LogLevel::Info, "hello".to_string()),
                (LogLevel::Error, "oops".to_string())
            ]
        );
    }

    #[test]
    fn test_bridge_log_without_buffer_is_silent() {
        let log = BridgeLog::new(false);
        log.warn("nowhere to go");
        log.flush();
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
    }
}
