//! Log sink implementations.

use dockit_core::{LogLine, LogSink, LogStream};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Forwards lines to a channel; lines are dropped once the receiver is gone.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<LogLine>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LogLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl LogSink for ChannelSink {
    fn write(&self, line: LogLine) {
        let _ = self.tx.send(line);
    }
}

/// Emits every line as a tracing event.
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, line: LogLine) {
        match line.stream {
            LogStream::Stdout => tracing::info!(target: "dockit::process", "{}", line.content),
            LogStream::Stderr => tracing::warn!(target: "dockit::process", "{}", line.content),
            LogStream::System => tracing::info!(target: "dockit::goal", "{}", line.content),
        }
    }
}

pub struct DiscardSink;

impl LogSink for DiscardSink {
    fn write(&self, _line: LogLine) {}
}

/// Keeps all lines in memory.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<LogLine>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn contents(&self) -> Vec<String> {
        self.lines().into_iter().map(|l| l.content).collect()
    }
}

impl LogSink for MemorySink {
    fn write(&self, line: LogLine) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_forwards_lines() {
        let (sink, mut rx) = ChannelSink::new();
        sink.system("hello");
        drop(sink);

        let line = rx.recv().await.unwrap();
        assert_eq!(line.content, "hello");
        assert_eq!(line.stream, LogStream::System);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.write(LogLine::new(LogStream::Stdout, "one"));
        sink.write(LogLine::new(LogStream::Stderr, "two"));
        assert_eq!(sink.contents(), vec!["one", "two"]);
    }
}
