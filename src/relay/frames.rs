//! Outbound frames and the transports that carry them to the caller.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::json;
use tokio::sync::mpsc;

/// One frame written to the caller, in production order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A chunk of generated text, exactly as the upstream produced it.
    Data(String),
    /// The response is complete.
    End,
    /// The relay failed.
    Error(String),
}

impl OutboundFrame {
    /// SSE event name for this frame.
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundFrame::Data(_) => "stream-data",
            OutboundFrame::End => "stream-end",
            OutboundFrame::Error(_) => "stream-error",
        }
    }

    /// JSON payload for this frame.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            OutboundFrame::Data(text) => json!({ "text": text }),
            OutboundFrame::End => json!({}),
            OutboundFrame::Error(message) => json!({ "message": message }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutboundFrame::Data(_))
    }
}

/// The caller's transport has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportClosed;

/// Where a relay writes its frames.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one frame.
    async fn emit(&mut self, frame: OutboundFrame) -> Result<(), TransportClosed>;

    /// Whether a write would still reach the caller.
    fn is_writable(&self) -> bool;

    /// A future that resolves once the caller has gone away. Called once per
    /// relay; must not borrow the sink.
    fn disconnected(&mut self) -> BoxFuture<'static, ()>;
}

/// Live mode: every frame is pushed into a bounded channel as soon as it is
/// produced. The receiving end feeds the caller's SSE response; dropping it
/// is how a caller disconnect shows up.
pub struct LiveSink {
    tx: mpsc::Sender<OutboundFrame>,
}

impl LiveSink {
    pub fn new(tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl FrameSink for LiveSink {
    async fn emit(&mut self, frame: OutboundFrame) -> Result<(), TransportClosed> {
        self.tx.send(frame).await.map_err(|_| TransportClosed)
    }

    fn is_writable(&self) -> bool {
        !self.tx.is_closed()
    }

    fn disconnected(&mut self) -> BoxFuture<'static, ()> {
        let tx = self.tx.clone();
        Box::pin(async move { tx.closed().await })
    }
}
