//! Turn relay: send the final turn, then turn upstream events into frames.
//!
//! [`apply_event`] is the only place events become frames; live and
//! aggregate mode differ solely in the [`FrameSink`] they hand to
//! [`stream_response`].

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::conversation::NormalizedTurn;
use crate::error::RelayError;
use crate::relay::frames::{FrameSink, OutboundFrame};
use crate::relay::governor::SessionGovernor;
use crate::relay::state::StreamState;
use crate::upstream::{LiveSession, OutgoingTurn, UpstreamEvent};

const ENDED_EARLY: &str = "upstream session ended before completing the turn";

/// Send the final turn with the end-of-turn marker set.
pub async fn send_final_turn(
    session: &mut dyn LiveSession,
    turn: &NormalizedTurn,
    index: usize,
) -> Result<(), RelayError> {
    session
        .send(OutgoingTurn {
            role: turn.role,
            parts: &turn.parts,
            end_of_turn: true,
        })
        .await
        .map_err(|e| RelayError::SendFailure {
            index,
            message: e.to_string(),
        })
}

/// Fold one upstream event into the stream state.
///
/// Returns the frame to emit, or `None` if the stream already ended and the
/// event must be discarded.
pub fn apply_event(state: &mut StreamState, event: UpstreamEvent) -> Option<OutboundFrame> {
    match event {
        UpstreamEvent::Data(chunk) => state.append(&chunk).then_some(OutboundFrame::Data(chunk)),
        UpstreamEvent::End => state.complete().then_some(OutboundFrame::End),
        UpstreamEvent::Error(message) => state
            .fail(message.clone())
            .then_some(OutboundFrame::Error(message)),
    }
}

/// Consume events until the stream ends, forwarding each as a frame.
///
/// On the terminal frame the governor is finalized. A caller disconnect
/// (observed through `disconnect` or a failed write) returns
/// [`RelayError::TransportClosedByCaller`] without finalizing.
pub async fn stream_response<S: FrameSink + ?Sized>(
    governor: &mut SessionGovernor,
    events: &mut mpsc::Receiver<UpstreamEvent>,
    sink: &mut S,
    disconnect: &mut BoxFuture<'static, ()>,
) -> Result<(), RelayError> {
    let mut chunks = 0usize;

    loop {
        let event = tokio::select! {
            biased;
            _ = &mut *disconnect => {
                debug!(chunks, "Caller disconnected mid-stream");
                return Err(RelayError::TransportClosedByCaller);
            }
            event = events.recv() => event.unwrap_or_else(|| UpstreamEvent::Error(ENDED_EARLY.to_string())),
        };

        let Some(frame) = apply_event(governor.state_mut(), event) else {
            continue;
        };

        let outcome = match &frame {
            OutboundFrame::Data(_) => {
                chunks += 1;
                None
            }
            OutboundFrame::End => Some(Ok(())),
            OutboundFrame::Error(message) => {
                warn!(chunks, "Upstream stream error: {message}");
                Some(Err(RelayError::UpstreamStream(message.clone())))
            }
        };

        if sink.emit(frame).await.is_err() {
            return Err(RelayError::TransportClosedByCaller);
        }

        if let Some(outcome) = outcome {
            governor.finalize(outcome.as_ref().err()).await;
            debug!(chunks, "Response stream finished");
            return outcome;
        }
    }
}
