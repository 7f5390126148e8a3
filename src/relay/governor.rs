//! Session governor: the single owner of the upstream session handle.
//!
//! Whatever ends a relay first (stream end, stream error, a setup failure,
//! or the caller going away) the governor closes the session exactly once
//! and invokes the completion callback exactly once. Later terminal signals
//! are ignored.

use tracing::{debug, warn};

use crate::error::RelayError;
use crate::relay::frames::{FrameSink, OutboundFrame};
use crate::relay::state::StreamState;
use crate::upstream::LiveSession;

/// Invoked once per relay with `(None, full_text)` on success or
/// `(Some(error), partial_text)` on failure.
pub type CompletionCallback = Box<dyn FnOnce(Option<&RelayError>, &str) + Send>;

pub struct SessionGovernor {
    session: Option<Box<dyn LiveSession>>,
    state: StreamState,
    on_complete: Option<CompletionCallback>,
    finalized: bool,
}

impl SessionGovernor {
    pub fn new(on_complete: CompletionCallback) -> Self {
        Self {
            session: None,
            state: StreamState::default(),
            on_complete: Some(on_complete),
            finalized: false,
        }
    }

    /// Take exclusive ownership of a freshly opened session.
    pub fn adopt(&mut self, session: Box<dyn LiveSession>) {
        debug_assert!(self.session.is_none(), "session adopted twice");
        self.session = Some(session);
    }

    /// Borrow the session for a send. `None` before it opens or after close.
    pub fn session_mut(&mut self) -> Option<&mut (dyn LiveSession + 'static)> {
        self.session.as_deref_mut()
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StreamState {
        &mut self.state
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Report a failure that happened outside the event stream (setup,
    /// replay, final send, caller disconnect), then finalize.
    ///
    /// An error frame is written only if no terminal frame went out yet, the
    /// failure is not the caller's own disconnect, and the transport is
    /// still writable.
    pub async fn abort<S: FrameSink + ?Sized>(&mut self, sink: &mut S, error: &RelayError) -> bool {
        if self.finalized {
            debug!(%error, "Ignoring failure after finalize");
            return false;
        }

        let message = error.to_string();
        if self.state.fail(message.clone())
            && error.is_generation_failure()
            && sink.is_writable()
            && sink.emit(OutboundFrame::Error(message)).await.is_err()
        {
            debug!("Caller went away before the error frame was written");
        }

        self.finalize(Some(error)).await
    }

    /// Close the session and fire the completion callback. Only the first
    /// call has any effect; returns whether this call was it.
    pub async fn finalize(&mut self, error: Option<&RelayError>) -> bool {
        if self.finalized {
            debug!("Ignoring duplicate terminal signal");
            return false;
        }
        self.finalized = true;

        if let Some(mut session) = self.session.take() {
            session.close().await;
            debug!("Upstream session closed");
        }

        if let Some(callback) = self.on_complete.take() {
            callback(error, self.state.text());
        }
        true
    }
}

impl Drop for SessionGovernor {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        // The relay future was dropped mid-flight. The session cannot be
        // closed asynchronously here; dropping it tears down its socket.
        warn!("Relay dropped before finalizing; discarding upstream session");
        self.session.take();
        self.state.fail(RelayError::TransportClosedByCaller.to_string());
        if let Some(callback) = self.on_complete.take() {
            callback(Some(&RelayError::TransportClosedByCaller), self.state.text());
        }
    }
}
