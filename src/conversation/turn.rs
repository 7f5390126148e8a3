//! Conversation turns and the validation applied before replay.

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::ConversationConfig;
use crate::conversation::content::{normalize, ContentPart, TurnContent};
use crate::error::RelayError;

/// Who authored a turn.
///
/// The live session only knows `user` and `model`, so every role a caller
/// sends other than `user` (`assistant`, `system`, ...) is a `model` turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn from_caller(role: &str) -> Self {
        if role == "user" {
            Role::User
        } else {
            Role::Model
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let role = String::deserialize(deserializer)?;
        Ok(Role::from_caller(&role))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: TurnContent,
}

impl ConversationTurn {
    pub fn user(content: impl Into<TurnContent>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<TurnContent>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }
}

/// A turn after content normalization, ready to be sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTurn {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl From<&ConversationTurn> for NormalizedTurn {
    fn from(turn: &ConversationTurn) -> Self {
        Self {
            role: turn.role,
            parts: normalize(&turn.content),
        }
    }
}

/// A validated conversation split into replayed history and the final turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedConversation {
    pub history: Vec<NormalizedTurn>,
    pub final_turn: NormalizedTurn,
}

impl PreparedConversation {
    /// Total number of turns, history included.
    pub fn turn_count(&self) -> usize {
        self.history.len() + 1
    }
}

/// Check a conversation against the configured rules.
///
/// Rejects an empty conversation, a final turn not authored by the user,
/// two consecutive turns with the same role (when alternation is required),
/// and history longer than `max_history_turns`.
pub fn validate(turns: &[ConversationTurn], rules: &ConversationConfig) -> Result<(), RelayError> {
    let Some(last) = turns.last() else {
        return Err(RelayError::InvalidConversation(
            "conversation has no turns".to_string(),
        ));
    };

    if last.role != Role::User {
        return Err(RelayError::InvalidConversation(format!(
            "final turn must come from the user, got {}",
            last.role
        )));
    }

    let history = turns.len() - 1;
    if history > rules.max_history_turns {
        return Err(RelayError::InvalidConversation(format!(
            "{history} history turns exceeds the limit of {}",
            rules.max_history_turns
        )));
    }

    if rules.require_alternation {
        if let Some(i) = turns.windows(2).position(|w| w[0].role == w[1].role) {
            return Err(RelayError::InvalidConversation(format!(
                "turns {i} and {} both come from {}",
                i + 1,
                turns[i].role
            )));
        }
    }

    Ok(())
}

/// Validate and normalize a conversation.
pub fn prepare(
    turns: &[ConversationTurn],
    rules: &ConversationConfig,
) -> Result<PreparedConversation, RelayError> {
    validate(turns, rules)?;

    let mut normalized: Vec<NormalizedTurn> = turns.iter().map(NormalizedTurn::from).collect();
    // validate() guarantees at least one turn.
    let final_turn = normalized
        .pop()
        .ok_or_else(|| RelayError::InvalidConversation("conversation has no turns".to_string()))?;

    Ok(PreparedConversation {
        history: normalized,
        final_turn,
    })
}
