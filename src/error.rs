//! Error taxonomy for a relay invocation.
//!
//! Every failure, whatever stage raised it, ends up as a [`RelayError`]
//! handed to the session governor's completion callback.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The conversation was rejected before any network activity.
    #[error("invalid conversation: {0}")]
    InvalidConversation(String),

    /// No usable credential (or default model) could be resolved.
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// The requested model failed the catalog validation hook.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// Opening the upstream session failed.
    #[error("upstream connect failed: {0}")]
    UpstreamConnect(String),

    /// A send into the open session was rejected.
    #[error("send of turn {index} failed: {message}")]
    SendFailure { index: usize, message: String },

    /// The upstream session reported an error mid-stream.
    #[error("upstream stream error: {0}")]
    UpstreamStream(String),

    /// The caller's transport went away. Triggers cleanup only.
    #[error("transport closed by caller")]
    TransportClosedByCaller,
}

impl RelayError {
    /// Short machine-readable kind, used for metrics labels and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::InvalidConversation(_) => "invalid_conversation",
            RelayError::MissingCredential(_) => "missing_credential",
            RelayError::UnsupportedModel(_) => "unsupported_model",
            RelayError::UpstreamConnect(_) => "upstream_connect",
            RelayError::SendFailure { .. } => "send_failure",
            RelayError::UpstreamStream(_) => "upstream_stream",
            RelayError::TransportClosedByCaller => "transport_closed",
        }
    }

    /// Whether this error was raised before the pipeline touched the network.
    pub fn is_pre_network(&self) -> bool {
        matches!(
            self,
            RelayError::InvalidConversation(_)
                | RelayError::MissingCredential(_)
                | RelayError::UnsupportedModel(_)
        )
    }

    /// Whether this error counts as a generation failure. A caller hanging
    /// up is not one.
    pub fn is_generation_failure(&self) -> bool {
        !matches!(self, RelayError::TransportClosedByCaller)
    }
}
