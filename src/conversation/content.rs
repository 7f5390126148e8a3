//! Turn content normalization.
//!
//! Callers send content either as a plain string or as a list of loosely
//! typed parts (OpenAI-style `{"type": "image_url", ...}` objects mixed with
//! text items). [`normalize`] turns any of these into an ordered list of
//! [`ContentPart`]s. It performs no I/O and is applied the same way to every
//! turn, history or final.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mime type assumed for images that do not declare one.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Raw content of a conversation turn, as received from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    /// Plain text.
    Text(String),
    /// Ordered list of loosely typed parts.
    Parts(Vec<Value>),
    /// Anything else. Normalizes to a single empty text part.
    Other(Value),
}

impl From<&str> for TurnContent {
    fn from(text: &str) -> Self {
        TurnContent::Text(text.to_string())
    }
}

impl From<String> for TurnContent {
    fn from(text: String) -> Self {
        TurnContent::Text(text)
    }
}

/// Where the bytes of a media part live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// A direct reference to the media.
    Url(String),
    /// Base64-encoded bytes carried inline.
    Inline(String),
}

/// One typed part of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    InlineMedia {
        source: MediaSource,
        mime_type: String,
    },
}

impl ContentPart {
    pub fn text(value: impl Into<String>) -> Self {
        ContentPart::Text(value.into())
    }

    fn empty() -> Self {
        ContentPart::Text(String::new())
    }
}

/// Convert turn content into ordered, typed parts.
pub fn normalize(content: &TurnContent) -> Vec<ContentPart> {
    match content {
        TurnContent::Text(text) => vec![ContentPart::text(text.as_str())],
        TurnContent::Parts(items) => items.iter().map(normalize_item).collect(),
        TurnContent::Other(_) => vec![ContentPart::empty()],
    }
}

fn normalize_item(item: &Value) -> ContentPart {
    if item.get("type").and_then(Value::as_str) == Some("image_url") {
        return normalize_image(item.get("image_url"));
    }

    match item.get("text").and_then(Value::as_str) {
        Some(text) => ContentPart::text(text),
        None => ContentPart::empty(),
    }
}

fn normalize_image(image: Option<&Value>) -> ContentPart {
    let Some(image) = image else {
        return ContentPart::empty();
    };

    let mime_type = image
        .get("mimeType")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_IMAGE_MIME)
        .to_string();

    let non_empty = |key: &str| {
        image
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    // A URL reference wins over inline data when both are present.
    let source = match (non_empty("url"), non_empty("data")) {
        (Some(url), _) => MediaSource::Url(url),
        (None, Some(data)) => MediaSource::Inline(data),
        (None, None) => return ContentPart::empty(),
    };

    ContentPart::InlineMedia { source, mime_type }
}
