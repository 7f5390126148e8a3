//! Conversation model.
//!
//! - [`content`]: Turn content and its normalization into typed parts
//! - [`turn`]: Turns, roles, and pre-replay validation

pub mod content;
pub mod turn;

pub use content::{normalize, ContentPart, MediaSource, TurnContent};
pub use turn::{prepare, validate, ConversationTurn, NormalizedTurn, PreparedConversation, Role};
