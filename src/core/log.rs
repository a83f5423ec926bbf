use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => f.write_str("INFO"),
            LogLevel::Warning => f.write_str("WARN"),
            LogLevel::Error => f.write_str("ERROR"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Log of a single submission.
///
/// Every line is mirrored to `tracing` with the submission id attached, and
/// kept so it can be attached to the submission outcome and notification.
/// Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct SubmissionLog {
    submission_id: Arc<str>,
    lines: Arc<Mutex<Vec<LogLine>>>,
}

impl SubmissionLog {
    pub fn new(submission_id: impl Into<String>) -> Self {
        Self {
            submission_id: Arc::from(submission_id.into()),
            lines: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn submission_id(&self) -> &str {
        &self.submission_id
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(submission_id = %self.submission_id, "{}", message);
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(submission_id = %self.submission_id, "{}", message);
        self.push(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(submission_id = %self.submission_id, "{}", message);
        self.push(LogLevel::Error, message);
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.guard().clone()
    }

    pub fn has_errors(&self) -> bool {
        self.guard().iter().any(|l| l.level == LogLevel::Error)
    }

    /// Plain-text rendering, one line per entry
    pub fn render(&self) -> String {
        self.guard()
            .iter()
            .map(|l| format!("[{}] {} {}\n", l.at.to_rfc3339(), l.level, l.message))
            .collect()
    }

    fn push(&self, level: LogLevel, message: String) {
        self.guard().push(LogLine {
            at: Utc::now(),
            level,
            message,
        });
    }

    fn guard(&self) -> MutexGuard<'_, Vec<LogLine>> {
        // A panic while holding the lock leaves the buffer intact.
        self.lines.lock().unwrap_or_else(|e| e.into_inner())
    }
}
