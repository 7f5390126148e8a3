//! Per-invocation relay state.

use std::fmt;

/// How the response stream ended, if it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Terminal {
    #[default]
    None,
    Complete,
    Failed,
}

/// Text accumulated so far and the terminal status of the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    text: String,
    terminal: Terminal,
    error: Option<String>,
}

impl StreamState {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn terminal(&self) -> Terminal {
        self.terminal
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal != Terminal::None
    }

    /// Append a chunk. Ignored once the stream is terminal.
    pub fn append(&mut self, chunk: &str) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.text.push_str(chunk);
        true
    }

    /// Mark the stream complete. Returns false if it already ended.
    pub fn complete(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.terminal = Terminal::Complete;
        true
    }

    /// Mark the stream failed. Returns false if it already ended.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.terminal = Terminal::Failed;
        self.error = Some(message.into());
        true
    }
}

/// Phases of one relay invocation.
///
/// `Init → Opening → Replaying → AwaitingResponse → Streaming →
/// {Complete | Failed} → Closed`. Any phase before `Complete` may fall
/// through to `Failed`; every invocation ends in `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    Init,
    Opening,
    Replaying,
    AwaitingResponse,
    Streaming,
    Complete,
    Failed,
    Closed,
}

impl RelayPhase {
    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: RelayPhase) -> bool {
        use RelayPhase::*;
        match (self, next) {
            (Init, Opening)
            | (Opening, Replaying)
            | (Replaying, AwaitingResponse)
            | (AwaitingResponse, Streaming)
            | (Streaming, Complete)
            | (Complete, Closed)
            | (Failed, Closed) => true,
            (Closed, _) | (Complete, _) | (Failed, _) => false,
            (_, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayPhase::Init => "init",
            RelayPhase::Opening => "opening",
            RelayPhase::Replaying => "replaying",
            RelayPhase::AwaitingResponse => "awaiting_response",
            RelayPhase::Streaming => "streaming",
            RelayPhase::Complete => "complete",
            RelayPhase::Failed => "failed",
            RelayPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}
