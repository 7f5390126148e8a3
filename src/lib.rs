//! gemini-live-relay: streaming multi-turn completions over Gemini Live.
//!
//! A stateless chat request (full history plus a final user turn) is
//! replayed into a fresh bidirectional live session; the reply is relayed
//! back either as a stream of named SSE events or as a single
//! `chat.completion` body.
//!
//! Exposes an OpenAI-compatible HTTP API for drop-in integration.

pub mod config;
pub mod conversation;
pub mod credentials;
pub mod error;
pub mod relay;
pub mod server;
pub mod upstream;
