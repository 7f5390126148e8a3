//! Gemini Live wire format.
//!
//! Client messages are externally tagged JSON objects (`{"setup": ...}`,
//! `{"clientContent": ...}`); server messages carry at most one of
//! `setupComplete`, `serverContent`, `toolCall`, `goAway`. The server may
//! deliver them in text or binary WebSocket frames.

use serde::{Deserialize, Serialize};

use crate::config::GenerationParams;
use crate::conversation::{ContentPart, MediaSource};
use crate::upstream::{OutgoingTurn, UpstreamEvent};

// ─── Client → server ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage<'a> {
    Setup(Setup),
    ClientContent(ClientContent<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<&'static str>,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub top_p: f64,
    pub top_k: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent<'a> {
    pub turns: Vec<WireTurn<'a>>,
    pub turn_complete: bool,
}

#[derive(Debug, Serialize)]
pub struct WireTurn<'a> {
    pub role: &'static str,
    pub parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WirePart<'a> {
    Text(&'a str),
    InlineData {
        #[serde(rename = "mimeType")]
        mime_type: &'a str,
        data: &'a str,
    },
    FileData {
        #[serde(rename = "mimeType")]
        mime_type: &'a str,
        #[serde(rename = "fileUri")]
        file_uri: &'a str,
    },
}

impl<'a> From<&'a ContentPart> for WirePart<'a> {
    fn from(part: &'a ContentPart) -> Self {
        match part {
            ContentPart::Text(text) => WirePart::Text(text),
            ContentPart::InlineMedia {
                source: MediaSource::Inline(data),
                mime_type,
            } => WirePart::InlineData { mime_type, data },
            ContentPart::InlineMedia {
                source: MediaSource::Url(url),
                mime_type,
            } => WirePart::FileData {
                mime_type,
                file_uri: url,
            },
        }
    }
}

/// Qualify a bare model id with the `models/` resource prefix.
pub fn model_resource(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

/// Encode the first message of a session.
pub fn encode_setup(model: &str, params: &GenerationParams) -> serde_json::Result<String> {
    serde_json::to_string(&ClientMessage::Setup(Setup {
        model: model_resource(model),
        generation_config: GenerationConfig {
            response_modalities: vec!["TEXT"],
            temperature: params.temperature,
            max_output_tokens: params.max_output_tokens,
            top_p: params.top_p,
            top_k: params.top_k,
        },
    }))
}

/// Encode one turn as a `clientContent` message.
pub fn encode_turn(turn: &OutgoingTurn<'_>) -> serde_json::Result<String> {
    serde_json::to_string(&ClientMessage::ClientContent(ClientContent {
        turns: vec![WireTurn {
            role: turn.role.as_str(),
            parts: turn.parts.iter().map(WirePart::from).collect(),
        }],
        turn_complete: turn.end_of_turn,
    }))
}

// ─── Server → client ───────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub tool_call: Option<serde_json::Value>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerPart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerMessage {
    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Translate into relay events: one `Data` per non-empty text part, in
    /// order, then `End` if the model finished its turn.
    pub fn into_events(self) -> Vec<UpstreamEvent> {
        let Some(content) = self.server_content else {
            return Vec::new();
        };

        let mut events: Vec<UpstreamEvent> = content
            .model_turn
            .map(|turn| turn.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| part.text)
            .filter(|text| !text.is_empty())
            .map(UpstreamEvent::Data)
            .collect();

        if content.turn_complete {
            events.push(UpstreamEvent::End);
        }
        events
    }
}
