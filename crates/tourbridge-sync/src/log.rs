use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Per-run progress log. Entries are kept for the run summary and mirrored to `tracing`.
#[derive(Debug, Clone)]
pub struct RunLog {
    run_id: Uuid,
    showcase: String,
    entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn new(run_id: Uuid, showcase: impl Into<String>) -> Self {
        Self {
            run_id,
            showcase: showcase.into(),
            entries: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(run_id = %self.run_id, showcase = %self.showcase, "{message}");
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(run_id = %self.run_id, showcase = %self.showcase, "{message}");
        self.push(LogLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!(run_id = %self.run_id, showcase = %self.showcase, "{message}");
        self.push(LogLevel::Error, message);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }

    fn push(&mut self, level: LogLevel, message: String) {
        self.entries.push(LogEntry {
            at: Utc::now(),
            level,
            message,
        });
    }
}
