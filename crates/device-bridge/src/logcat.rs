//! Logcat Reader
//!
//! Parses `threadtime` logcat output and owns the single live log stream.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use droid_lite_core::{Event, EventBus};

use crate::adb::{AdbClient, AdbError};

/// Logcat errors
#[derive(Debug, thiserror::Error)]
pub enum LogcatError {
    #[error("ADB not found")]
    AdbNotFound,
    #[error("{0} is not running on the device")]
    ProcessNotRunning(String),
    #[error(transparent)]
    Adb(#[from] AdbError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'V' => Some(LogLevel::Verbose),
            'D' => Some(LogLevel::Debug),
            'I' => Some(LogLevel::Info),
            'W' => Some(LogLevel::Warning),
            'E' => Some(LogLevel::Error),
            'F' | 'A' => Some(LogLevel::Fatal),
            _ => None,
        }
    }

    /// Accepts a single letter or a level name ("warn", "error", ...)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "verbose" => Some(LogLevel::Verbose),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            "fatal" | "assert" => Some(LogLevel::Fatal),
            _ if s.chars().count() == 1 => s.chars().next().and_then(Self::from_char),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            LogLevel::Verbose => 'V',
            LogLevel::Debug => 'D',
            LogLevel::Info => 'I',
            LogLevel::Warning => 'W',
            LogLevel::Error => 'E',
            LogLevel::Fatal => 'F',
        }
    }
}

/// Parsed log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// `MM-DD HH:MM:SS.mmm`
    pub timestamp: String,
    pub pid: u32,
    pub tid: u32,
    pub level: LogLevel,
    pub tag: String,
    pub message: String,
}

impl LogEntry {
    /// Parse a logcat line (threadtime format)
    /// Format: MM-DD HH:MM:SS.mmm PID TID LEVEL TAG: MESSAGE
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();

        let date = fields.next()?;
        let time = fields.next()?;
        let pid: u32 = fields.next()?.parse().ok()?;
        let tid: u32 = fields.next()?.parse().ok()?;
        let level_field = fields.next()?;
        if level_field.len() != 1 {
            return None;
        }
        let level = LogLevel::from_char(level_field.chars().next()?)?;

        // PID and TID are padded, so locate the tag after the level field
        let level_pos = line.find(&format!(" {} ", level_field))?;
        let rest = line[level_pos + 3..].trim_start();
        let (tag, message) = match rest.find(": ") {
            Some(idx) => (rest[..idx].trim_end(), &rest[idx + 2..]),
            None => (rest.trim_end_matches(':').trim_end(), ""),
        };

        Some(LogEntry {
            timestamp: format!("{} {}", date, time),
            pid,
            tid,
            level,
            tag: tag.to_string(),
            message: message.to_string(),
        })
    }

    pub fn formatted(&self) -> String {
        format!(
            "{} {:>5} {:>5} {} {}: {}",
            self.timestamp,
            self.pid,
            self.tid,
            self.level.as_char(),
            self.tag,
            self.message
        )
    }
}

/// Logcat filter
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub min_level: Option<LogLevel>,
    /// Exact tag matches (any)
    pub tags: Vec<String>,
    pub message_contains: Option<String>,
    pub pids: Vec<u32>,
}

impl LogFilter {
    pub fn min_level(level: LogLevel) -> Self {
        Self {
            min_level: Some(level),
            ..Default::default()
        }
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(min) = self.min_level {
            if entry.level < min {
                return false;
            }
        }

        if !self.tags.is_empty() && !self.tags.iter().any(|t| t == &entry.tag) {
            return false;
        }

        if let Some(ref pattern) = self.message_contains {
            if !entry.message.contains(pattern) {
                return false;
            }
        }

        if !self.pids.is_empty() && !self.pids.contains(&entry.pid) {
            return false;
        }

        true
    }
}

/// What a stream should show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogcatMode {
    /// Everything the device logs
    All,
    /// Only the process of one package
    Package(String),
}

/// Owner of the single live `adb logcat` process.
///
/// Starting a new stream kills the previous one first.
pub struct LogcatSession {
    adb: AdbClient,
    events: Arc<EventBus>,
    buffer_lines: usize,
    child: Mutex<Option<Child>>,
}

impl LogcatSession {
    pub fn new(adb: AdbClient, events: Arc<EventBus>, buffer_lines: usize) -> Self {
        Self {
            adb,
            events,
            buffer_lines: buffer_lines.max(1),
            child: Mutex::new(None),
        }
    }

    /// Start streaming parsed entries from `serial`
    pub async fn start(
        &self,
        serial: &str,
        mode: LogcatMode,
        mut filter: LogFilter,
    ) -> Result<mpsc::Receiver<LogEntry>, LogcatError> {
        if !self.adb.is_available() {
            return Err(LogcatError::AdbNotFound);
        }

        self.stop().await;

        if let LogcatMode::Package(package) = &mode {
            let pid = self
                .adb
                .pidof(serial, package)
                .await?
                .ok_or_else(|| LogcatError::ProcessNotRunning(package.clone()))?;
            debug!("{} is running as pid {}", package, pid);
            filter.pids = vec![pid];
        }

        let mut child = Command::new(self.adb.adb_path())
            .args(["-s", serial, "logcat", "-v", "threadtime"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let (tx, rx) = mpsc::channel(self.buffer_lines);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();

                while let Ok(Some(line)) = lines.next_line().await {
                    let Some(entry) = LogEntry::parse(&line) else {
                        continue;
                    };
                    if filter.matches(&entry) && tx.send(entry).await.is_err() {
                        break;
                    }
                }
            });
        }

        *self.child.lock().await = Some(child);
        info!("Logcat started for {} ({:?})", serial, mode);
        self.events.emit(Event::LogcatStarted {
            device_id: serial.to_string(),
        });

        Ok(rx)
    }

    /// Kill the live stream. Returns whether one was running.
    pub async fn stop(&self) -> bool {
        let Some(mut child) = self.child.lock().await.take() else {
            return false;
        };

        if let Err(e) = child.kill().await {
            debug!("logcat process already gone: {}", e);
        }
        self.events.emit(Event::LogcatStopped);
        true
    }

    pub async fn is_running(&self) -> bool {
        self.child.lock().await.is_some()
    }

    /// Clear the device's log buffer
    pub async fn clear(&self, serial: &str) -> Result<(), LogcatError> {
        self.adb.run_for_device(serial, &["logcat", "-c"]).await?;
        Ok(())
    }
}
