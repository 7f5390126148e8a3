//! Aggregate mode: buffer every frame, answer once with a `chat.completion`.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::relay::frames::{FrameSink, OutboundFrame, TransportClosed};

/// Chat completion response (OpenAI-compatible).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatChoice {
    pub index: usize,
    pub message: AssistantMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
}

/// Always zero: the live protocol does not report token counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl ChatCompletion {
    pub fn new(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: format!("gemini-live-{}", Uuid::new_v4()),
            object: "chat.completion".to_string(),
            created: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            model: model.into(),
            choices: vec![ChatChoice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant".to_string(),
                    content: content.into(),
                },
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        }
    }
}

/// Buffers frames in memory until the relay reaches a terminal frame.
#[derive(Default)]
pub struct AggregateSink {
    frames: Vec<OutboundFrame>,
    cancel: Option<oneshot::Receiver<()>>,
}

impl AggregateSink {
    /// A sink whose caller never goes away.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose caller is considered gone once `cancel`'s sender is
    /// dropped (or fires).
    pub fn with_cancellation(cancel: oneshot::Receiver<()>) -> Self {
        Self {
            frames: Vec::new(),
            cancel: Some(cancel),
        }
    }

    pub fn frames(&self) -> &[OutboundFrame] {
        &self.frames
    }

    /// Concatenation of every data frame, in order.
    pub fn text(&self) -> String {
        self.frames
            .iter()
            .filter_map(|frame| match frame {
                OutboundFrame::Data(chunk) => Some(chunk.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The response object, once the buffered frames end with `End`.
    pub fn completion(&self, model: &str) -> Option<ChatCompletion> {
        match self.frames.last() {
            Some(OutboundFrame::End) => Some(ChatCompletion::new(model, self.text())),
            _ => None,
        }
    }
}

#[async_trait]
impl FrameSink for AggregateSink {
    async fn emit(&mut self, frame: OutboundFrame) -> Result<(), TransportClosed> {
        self.frames.push(frame);
        Ok(())
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn disconnected(&mut self) -> BoxFuture<'static, ()> {
        match self.cancel.take() {
            Some(rx) => rx.map(|_| ()).boxed(),
            None => future::pending::<()>().boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completion_after_end() {
        let mut sink = AggregateSink::new();
        sink.emit(OutboundFrame::Data("A".into())).await.unwrap();
        assert!(sink.completion("m").is_none());
        sink.emit(OutboundFrame::Data("B".into())).await.unwrap();
        sink.emit(OutboundFrame::End).await.unwrap();

        let completion = sink.completion("gemini-live").unwrap();
        assert!(completion.id.starts_with("gemini-live-"));
        assert_eq!(completion.object, "chat.completion");
        assert_eq!(completion.model, "gemini-live");
        assert_eq!(completion.choices[0].message.content, "AB");
        assert_eq!(completion.choices[0].message.role, "assistant");
        assert_eq!(completion.choices[0].finish_reason, "stop");
        assert_eq!(completion.usage, Usage::default());
    }

    #[tokio::test]
    async fn test_no_completion_after_error() {
        let mut sink = AggregateSink::new();
        sink.emit(OutboundFrame::Data("partial".into())).await.unwrap();
        sink.emit(OutboundFrame::Error("boom".into())).await.unwrap();
        assert!(sink.completion("m").is_none());
        assert_eq!(sink.text(), "partial");
    }

    #[tokio::test]
    async fn test_cancellation_resolves_when_sender_dropped() {
        let (tx, rx) = oneshot::channel::<()>();
        let mut sink = AggregateSink::with_cancellation(rx);
        let gone = sink.disconnected();
        drop(tx);
        gone.await;
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(ChatCompletion::new("m", "hi")).unwrap();
        assert_eq!(value["usage"]["total_tokens"], 0);
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(value["choices"][0]["message"]["content"], "hi");
    }
}
