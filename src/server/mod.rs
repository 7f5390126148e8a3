//! HTTP server providing an OpenAI-compatible API.
//!
//! - [`openai_api`]: Request/response types and route handlers
//! - [`streaming`]: SSE framing for live-mode responses
//! - [`metrics`]: Prometheus counters for relay outcomes

pub mod metrics;
pub mod openai_api;
pub mod streaming;
