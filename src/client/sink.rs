//! Where command output, diagnostics and status changes end up.

use crate::client::Status;
use crate::protocol::OutputChunk;

/// Consumer of everything the session wants a user to see.
pub trait OutputSink: Send {
    /// Incremental child output.
    fn output(&mut self, chunk: &OutputChunk);

    /// Human-readable diagnostic (server errors, socket failures).
    fn diagnostic(&mut self, message: &str);

    /// Called after every status change.
    fn status_changed(&mut self, status: Status) {
        let _ = status;
    }
}

/// One recorded sink call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// See [`OutputSink::output`].
    Output(OutputChunk),
    /// See [`OutputSink::diagnostic`].
    Diagnostic(String),
    /// See [`OutputSink::status_changed`].
    Status(Status),
}

/// Sink that keeps every call in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Vec<SinkEvent>,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded calls.
    #[must_use]
    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    /// Returns recorded diagnostics only.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Diagnostic(msg) => Some(msg.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Returns recorded status changes only.
    #[must_use]
    pub fn statuses(&self) -> Vec<Status> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Status(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    /// Concatenates all output data, regardless of stream.
    #[must_use]
    pub fn output_text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Output(chunk) => Some(chunk.data.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl OutputSink for RecordingSink {
    fn output(&mut self, chunk: &OutputChunk) {
        self.events.push(SinkEvent::Output(chunk.clone()));
    }

    fn diagnostic(&mut self, message: &str) {
        self.events.push(SinkEvent::Diagnostic(message.to_string()));
    }

    fn status_changed(&mut self, status: Status) {
        self.events.push(SinkEvent::Status(status));
    }
}

/// Sink that writes to the terminal: output to stdout/stderr by stream,
/// diagnostics and status lines to stderr.
#[derive(Debug, Default)]
pub struct TerminalSink;

impl OutputSink for TerminalSink {
    fn output(&mut self, chunk: &OutputChunk) {
        use std::io::Write;

        let result = match chunk.stream {
            crate::protocol::OutputStream::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(chunk.data.as_bytes()).and_then(|()| out.flush())
            }
            crate::protocol::OutputStream::Stderr => {
                let mut err = std::io::stderr().lock();
                err.write_all(chunk.data.as_bytes()).and_then(|()| err.flush())
            }
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to write command output");
        }
    }

    fn diagnostic(&mut self, message: &str) {
        eprintln!("! {message}");
    }

    fn status_changed(&mut self, status: Status) {
        eprintln!("[{status}]");
    }
}
