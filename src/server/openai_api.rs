//! OpenAI-compatible HTTP API in front of the relay.
//!
//! - POST /v1/chat/completions (`stream: true` → SSE, otherwise JSON)
//! - GET /v1/models
//! - GET /health
//! - GET /metrics

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::{Config, GenerationParams};
use crate::conversation::ConversationTurn;
use crate::credentials::{
    ConfigCredentialResolver, CredentialResolver, ModelCatalog, StaticModelCatalog,
};
use crate::error::RelayError;
use crate::relay::{CompletionCallback, LiveSink, Relay, RelayRequest, SessionOpener};
use crate::server::metrics::RelayMetrics;
use crate::server::streaming::frames_to_sse_stream;
use crate::upstream::LiveConnector;

/// Application state shared across handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub credentials: Arc<dyn CredentialResolver>,
    pub catalog: Arc<dyn ModelCatalog>,
    pub connector: Arc<dyn LiveConnector>,
    pub metrics: RelayMetrics,
    pub start_time: Instant,
}

impl AppState {
    /// State with the config-backed credential resolver and model catalog.
    pub fn new(
        config: Arc<Config>,
        connector: Arc<dyn LiveConnector>,
    ) -> prometheus::Result<Self> {
        let credentials = Arc::new(ConfigCredentialResolver::new(config.credentials.clone()));
        let catalog = Arc::new(StaticModelCatalog::new(config.models.clone()));
        Self::with_collaborators(config, credentials, catalog, connector)
    }

    pub fn with_collaborators(
        config: Arc<Config>,
        credentials: Arc<dyn CredentialResolver>,
        catalog: Arc<dyn ModelCatalog>,
        connector: Arc<dyn LiveConnector>,
    ) -> prometheus::Result<Self> {
        Ok(Self {
            config,
            credentials,
            catalog,
            connector,
            metrics: RelayMetrics::new()?,
            start_time: Instant::now(),
        })
    }

    /// A fresh relay instance for one request.
    pub fn relay(&self, request_id: &str) -> Relay {
        let opener = SessionOpener::new(
            self.credentials.clone(),
            self.catalog.clone(),
            self.connector.clone(),
        )
        .with_model_validation(self.config.models.validate_requested)
        .with_deadline(self.config.upstream.connect_deadline());

        Relay::new(opener, self.config.conversation).with_request_id(request_id)
    }

    fn completion_callback(&self, request_id: String, mode: &'static str) -> CompletionCallback {
        self.metrics.relay_started(mode);
        let metrics = self.metrics.clone();
        Box::new(move |err, text| {
            match err {
                None => debug!(request_id = %request_id, mode, chars = text.len(), "Stream completed"),
                Some(RelayError::TransportClosedByCaller) => {
                    info!(request_id = %request_id, mode, chars = text.len(), "Caller disconnected")
                }
                Some(e) => error!(request_id = %request_id, mode, chars = text.len(), "Stream error: {e}"),
            }
            metrics.relay_finished(err);
        })
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Chat completion request (OpenAI-compatible).
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ConversationTurn>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Generation parameters, with configured defaults for anything unset.
    pub fn generation(&self, defaults: &GenerationParams) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_output_tokens: self.max_tokens.unwrap_or(defaults.max_output_tokens),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            top_k: self.top_k.unwrap_or(defaults.top_k),
        }
    }
}

/// Model listing response.
#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
    pub default: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub owned_by: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub active_relays: i64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidConversation(_) | RelayError::UnsupportedModel(_) => {
                StatusCode::BAD_REQUEST
            }
            RelayError::MissingCredential(_) => StatusCode::UNAUTHORIZED,
            RelayError::UpstreamConnect(_)
            | RelayError::SendFailure { .. }
            | RelayError::UpstreamStream(_) => StatusCode::BAD_GATEWAY,
            // Nginx's "client closed request"; never actually delivered.
            RelayError::TransportClosedByCaller => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
            }
        }
    }
}

fn error_response(status: StatusCode, kind: &str, message: String) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            kind: kind.to_string(),
            message,
        },
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        error_response(self.status_code(), self.kind(), self.to_string())
    }
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            debug!("Rejected request body: {}", rejection.body_text());
            return error_response(rejection.status(), "invalid_request", rejection.body_text());
        }
    };
    let request_id = Uuid::new_v4().to_string();

    info!(
        request_id = %request_id,
        model = ?req.model,
        messages = req.messages.len(),
        stream = req.stream,
        "Chat completion request"
    );

    let generation = req.generation(&state.config.generation);
    let stream = req.stream;
    let relay_request = RelayRequest {
        turns: req.messages,
        model: req.model,
        generation,
    };
    let mut relay = state.relay(&request_id);

    if stream {
        // Live mode: the relay runs on its own task and pushes frames into
        // the channel backing the SSE body.
        let on_complete = state.completion_callback(request_id, "live");
        let (mut sink, rx) = LiveSink::channel(state.config.server.event_buffer);
        tokio::spawn(async move {
            let _ = relay.run(relay_request, &mut sink, on_complete).await;
        });
        Sse::new(frames_to_sse_stream(rx))
            .keep_alive(KeepAlive::default())
            .into_response()
    } else {
        // Aggregate mode. The relay runs on its own task so it always reaches
        // finalize; dropping `_caller` (this handler cancelled) signals the
        // disconnect.
        let on_complete = state.completion_callback(request_id, "aggregate");
        let (_caller, cancel) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            relay
                .run_aggregate(relay_request, Some(cancel), on_complete)
                .await
        });

        match handle.await {
            Ok(Ok(completion)) => Json(completion).into_response(),
            Ok(Err(err)) => err.into_response(),
            Err(e) => {
                error!("Relay task failed: {e}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(ModelList {
        object: "list".to_string(),
        data: state
            .catalog
            .list_models()
            .into_iter()
            .map(|id| ModelInfo {
                id,
                object: "model".to_string(),
                owned_by: "google".to_string(),
            })
            .collect(),
        default: state.catalog.default_model().ok(),
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_relays: state.metrics.active(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
