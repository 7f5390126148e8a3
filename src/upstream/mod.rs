//! Upstream live generation sessions.
//!
//! - [`wire`]: JSON messages of the Gemini Live bidirectional protocol
//! - [`gemini`]: WebSocket-backed [`LiveConnector`] for Gemini Live
//!
//! A session is full-duplex but single-stream: turns go in through
//! [`LiveSession::send`] (which takes `&mut self`, so two sends can never
//! overlap) and the model's output comes back as [`UpstreamEvent`]s on an
//! explicit channel.

pub mod gemini;
pub mod wire;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::GenerationParams;
use crate::conversation::{ContentPart, Role};
use crate::credentials::Credential;

pub use gemini::GeminiLiveConnector;

/// One push event from an open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// A chunk of generated text.
    Data(String),
    /// The model finished its turn.
    End,
    /// The session failed.
    Error(String),
}

/// A turn sent into an open session.
#[derive(Debug, Clone, Copy)]
pub struct OutgoingTurn<'a> {
    pub role: Role,
    pub parts: &'a [ContentPart],
    /// Ask the model to respond once this turn is delivered.
    pub end_of_turn: bool,
}

/// Everything needed to open a session.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub credential: Credential,
    pub model: String,
    pub generation: GenerationParams,
    /// Upper bound on connect plus setup handshake.
    pub deadline: Option<Duration>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("setup handshake failed: {0}")]
    Handshake(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("send failed: {0}")]
    Send(String),

    #[error("session already closed")]
    Closed,
}

/// Opens live sessions.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    async fn connect(&self, request: ConnectRequest) -> Result<Box<dyn LiveSession>, UpstreamError>;
}

/// An open live session.
#[async_trait]
pub trait LiveSession: Send {
    /// Deliver one turn. Resolves once the turn has been written.
    async fn send(&mut self, turn: OutgoingTurn<'_>) -> Result<(), UpstreamError>;

    /// Take the receiving end of the event channel. Returns `None` after the
    /// first call.
    fn take_events(&mut self) -> Option<mpsc::Receiver<UpstreamEvent>>;

    /// Tear the session down. Events still in flight are discarded.
    async fn close(&mut self);
}
