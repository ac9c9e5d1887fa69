//! Log lines and sinks for process output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A line of log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    pub content: String,
}

impl LogLine {
    pub fn new(stream: LogStream, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Messages written by dockit itself.
    System,
}

/// Receives process output as it is produced.
pub trait LogSink: Send + Sync {
    fn write(&self, line: LogLine);

    fn system(&self, message: &str) {
        self.write(LogLine::new(LogStream::System, message));
    }
}
