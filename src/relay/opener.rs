//! Session opener: credential and model resolution, then the first network
//! call of the pipeline.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::GenerationParams;
use crate::credentials::{CredentialResolver, ModelCatalog};
use crate::error::RelayError;
use crate::upstream::{ConnectRequest, LiveConnector, LiveSession, UpstreamError};

/// Opens one upstream session per relay invocation.
#[derive(Clone)]
pub struct SessionOpener {
    credentials: Arc<dyn CredentialResolver>,
    catalog: Arc<dyn ModelCatalog>,
    connector: Arc<dyn LiveConnector>,
    validate_model: bool,
    deadline: Option<Duration>,
}

impl SessionOpener {
    pub fn new(
        credentials: Arc<dyn CredentialResolver>,
        catalog: Arc<dyn ModelCatalog>,
        connector: Arc<dyn LiveConnector>,
    ) -> Self {
        Self {
            credentials,
            catalog,
            connector,
            validate_model: false,
            deadline: None,
        }
    }

    /// Reject requested models the catalog does not list.
    pub fn with_model_validation(mut self, enabled: bool) -> Self {
        self.validate_model = enabled;
        self
    }

    /// Bound the time spent connecting and completing the setup handshake.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Requested model if given, else the catalog default.
    pub fn resolve_model(&self, requested: Option<&str>) -> Result<String, RelayError> {
        match requested.map(str::trim).filter(|m| !m.is_empty()) {
            Some(model) => {
                if self.validate_model && !self.catalog.supports(model) {
                    return Err(RelayError::UnsupportedModel(model.to_string()));
                }
                Ok(model.to_string())
            }
            None => self
                .catalog
                .default_model()
                .map_err(RelayError::MissingCredential),
        }
    }

    /// Resolve credential and model, then connect.
    ///
    /// Credential and model problems are reported before any network
    /// activity.
    pub async fn open(
        &self,
        requested_model: Option<&str>,
        generation: GenerationParams,
    ) -> Result<(Box<dyn LiveSession>, String), RelayError> {
        let credential = self
            .credentials
            .resolve()
            .await
            .map_err(RelayError::MissingCredential)?;
        let model = self.resolve_model(requested_model)?;

        debug!(model = %model, deadline = ?self.deadline, "Connecting upstream");

        let session = self
            .connector
            .connect(ConnectRequest {
                credential,
                model: model.clone(),
                generation,
                deadline: self.deadline,
            })
            .await
            .map_err(|e: UpstreamError| RelayError::UpstreamConnect(e.to_string()))?;

        info!(model = %model, "Upstream session open");
        Ok((session, model))
    }
}
