//! Streaming multi-turn completion relay.
//!
//! One [`Relay`] handles one request:
//!
//! 1. validate and normalize the conversation ([`crate::conversation`])
//! 2. open an upstream session ([`opener`])
//! 3. replay the history ([`replay`])
//! 4. send the final turn and relay the response ([`turn_relay`])
//! 5. close the session and signal completion exactly once ([`governor`])
//!
//! Frames go to a [`FrameSink`]: [`LiveSink`] streams them as produced,
//! [`AggregateSink`] buffers them into a single [`ChatCompletion`].

pub mod aggregate;
pub mod frames;
pub mod governor;
pub mod opener;
pub mod replay;
pub mod state;
pub mod turn_relay;

use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ConversationConfig, GenerationParams};
use crate::conversation::{prepare, ConversationTurn};
use crate::error::RelayError;

pub use aggregate::{AggregateSink, ChatCompletion};
pub use frames::{FrameSink, LiveSink, OutboundFrame, TransportClosed};
pub use governor::{CompletionCallback, SessionGovernor};
pub use opener::SessionOpener;
pub use state::{RelayPhase, StreamState, Terminal};

use crate::upstream::LiveSession;
use replay::replay_history;
use turn_relay::{send_final_turn, stream_response};

/// Input of one relay invocation.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub turns: Vec<ConversationTurn>,
    pub model: Option<String>,
    pub generation: GenerationParams,
}

/// Result of a successful relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub model: String,
    pub text: String,
}

/// One run of open → replay → relay → finalize for a single request.
pub struct Relay {
    opener: SessionOpener,
    rules: ConversationConfig,
    request_id: String,
    phase: RelayPhase,
    transitions: Vec<RelayPhase>,
}

impl Relay {
    pub fn new(opener: SessionOpener, rules: ConversationConfig) -> Self {
        Self {
            opener,
            rules,
            request_id: Uuid::new_v4().to_string(),
            phase: RelayPhase::Init,
            transitions: vec![RelayPhase::Init],
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn phase(&self) -> RelayPhase {
        self.phase
    }

    /// Every phase this relay passed through, in order.
    pub fn transitions(&self) -> &[RelayPhase] {
        &self.transitions
    }

    fn advance(&mut self, next: RelayPhase) {
        if !self.phase.can_advance_to(next) {
            warn!(request_id = %self.request_id, from = %self.phase, to = %next, "Illegal relay transition");
            return;
        }
        debug!(request_id = %self.request_id, from = %self.phase, to = %next, "Relay transition");
        self.phase = next;
        self.transitions.push(next);
    }

    /// Run the relay, writing frames to `sink`.
    ///
    /// `on_complete` fires exactly once, whatever the outcome. The session
    /// is closed before this returns.
    pub async fn run<S: FrameSink + ?Sized>(
        &mut self,
        request: RelayRequest,
        sink: &mut S,
        on_complete: CompletionCallback,
    ) -> Result<RelayOutcome, RelayError> {
        if self.phase != RelayPhase::Init {
            let error = RelayError::InvalidConversation("relay instances are single-use".to_string());
            on_complete(Some(&error), "");
            return Err(error);
        }

        info!(
            request_id = %self.request_id,
            turns = request.turns.len(),
            model = ?request.model,
            "Relay started"
        );

        let mut governor = SessionGovernor::new(on_complete);
        let mut disconnect = sink.disconnected();

        let result = self
            .drive(request, sink, &mut governor, &mut disconnect)
            .await;

        let outcome = match result {
            Ok(model) => {
                self.advance(RelayPhase::Complete);
                Ok(RelayOutcome {
                    model,
                    text: governor.state().text().to_string(),
                })
            }
            Err(error) => {
                self.advance(RelayPhase::Failed);
                if !governor.is_finalized() {
                    governor.abort(sink, &error).await;
                }
                if !error.is_generation_failure() {
                    info!(request_id = %self.request_id, "Caller went away; relay cleaned up");
                } else if error.is_pre_network() {
                    info!(request_id = %self.request_id, kind = error.kind(), "Relay rejected before connecting: {error}");
                } else {
                    warn!(request_id = %self.request_id, kind = error.kind(), "Relay failed: {error}");
                }
                Err(error)
            }
        };

        self.advance(RelayPhase::Closed);
        if let Ok(done) = &outcome {
            info!(request_id = %self.request_id, model = %done.model, chars = done.text.len(), "Relay complete");
        }
        outcome
    }

    /// Run in aggregate mode. `cancel` lets the caller signal it has gone
    /// away by dropping the sender.
    pub async fn run_aggregate(
        &mut self,
        request: RelayRequest,
        cancel: Option<oneshot::Receiver<()>>,
        on_complete: CompletionCallback,
    ) -> Result<ChatCompletion, RelayError> {
        let mut sink = match cancel {
            Some(rx) => AggregateSink::with_cancellation(rx),
            None => AggregateSink::new(),
        };
        let outcome = self.run(request, &mut sink, on_complete).await?;
        Ok(sink
            .completion(&outcome.model)
            .unwrap_or_else(|| ChatCompletion::new(outcome.model, outcome.text)))
    }

    async fn drive<S: FrameSink + ?Sized>(
        &mut self,
        request: RelayRequest,
        sink: &mut S,
        governor: &mut SessionGovernor,
        disconnect: &mut BoxFuture<'static, ()>,
    ) -> Result<String, RelayError> {
        let conversation = prepare(&request.turns, &self.rules)?;
        debug!(
            request_id = %self.request_id,
            turns = conversation.turn_count(),
            replayed = conversation.history.len(),
            "Conversation prepared"
        );

        self.advance(RelayPhase::Opening);
        let (session, model) = tokio::select! {
            biased;
            _ = &mut *disconnect => return Err(RelayError::TransportClosedByCaller),
            opened = self.opener.open(request.model.as_deref(), request.generation) => opened?,
        };
        governor.adopt(session);

        self.advance(RelayPhase::Replaying);
        {
            let session = open_session(governor)?;
            tokio::select! {
                biased;
                _ = &mut *disconnect => return Err(RelayError::TransportClosedByCaller),
                replayed = replay_history(session, &conversation.history) => replayed?,
            }
        }

        self.advance(RelayPhase::AwaitingResponse);
        let mut events = {
            let session = open_session(governor)?;
            let final_index = conversation.history.len();
            tokio::select! {
                biased;
                _ = &mut *disconnect => return Err(RelayError::TransportClosedByCaller),
                sent = send_final_turn(session, &conversation.final_turn, final_index) => sent?,
            }
            session.take_events().ok_or_else(|| {
                RelayError::UpstreamStream("session has no event stream".to_string())
            })?
        };

        self.advance(RelayPhase::Streaming);
        stream_response(governor, &mut events, sink, disconnect).await?;
        Ok(model)
    }
}

fn open_session(
    governor: &mut SessionGovernor,
) -> Result<&mut (dyn LiveSession + 'static), RelayError> {
    governor
        .session_mut()
        .ok_or_else(|| RelayError::UpstreamConnect("session is not open".to_string()))
}
