//! Scripted upstream and collaborator doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use gemini_live_relay::config::{ConversationConfig, GenerationParams};
use gemini_live_relay::conversation::{ContentPart, Role};
use gemini_live_relay::credentials::{Credential, CredentialResolver, ModelCatalog};
use gemini_live_relay::error::RelayError;
use gemini_live_relay::relay::{CompletionCallback, Relay, SessionOpener};
use gemini_live_relay::upstream::{
    ConnectRequest, LiveConnector, LiveSession, OutgoingTurn, UpstreamError, UpstreamEvent,
};

/// One send observed by the scripted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTurn {
    pub role: Role,
    pub parts: Vec<ContentPart>,
    pub end_of_turn: bool,
}

/// What the scripted upstream does.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Events pushed once the end-of-turn send arrives.
    pub events: Vec<UpstreamEvent>,
    /// Fail `connect` with this message.
    pub connect_error: Option<String>,
    /// Fail the send with this zero-based index.
    pub fail_send_at: Option<usize>,
    /// Drop the event sender after the scripted events, ending the channel.
    pub hang_up_after_events: bool,
}

impl Script {
    pub fn events(events: Vec<UpstreamEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }
}

/// Everything the scripted upstream observed.
#[derive(Default)]
pub struct Recorder {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub sends: Mutex<Vec<SentTurn>>,
    pub requests: Mutex<Vec<ConnectRequest>>,
}

impl Recorder {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> Vec<SentTurn> {
        self.sends.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.requests.lock().unwrap().clone()
    }
}

pub struct ScriptedConnector {
    script: Script,
    recorder: Arc<Recorder>,
}

impl ScriptedConnector {
    pub fn new(script: Script) -> (Arc<Self>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (
            Arc::new(Self {
                script,
                recorder: recorder.clone(),
            }),
            recorder,
        )
    }
}

#[async_trait]
impl LiveConnector for ScriptedConnector {
    async fn connect(&self, request: ConnectRequest) -> Result<Box<dyn LiveSession>, UpstreamError> {
        self.recorder.connects.fetch_add(1, Ordering::SeqCst);
        self.recorder.requests.lock().unwrap().push(request);
        if let Some(message) = &self.script.connect_error {
            return Err(UpstreamError::Connect(message.clone()));
        }

        let (tx, rx) = mpsc::channel(64);
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
            recorder: self.recorder.clone(),
            tx: Some(tx),
            rx: Some(rx),
            sent: 0,
        }))
    }
}

pub struct ScriptedSession {
    script: Script,
    recorder: Arc<Recorder>,
    tx: Option<mpsc::Sender<UpstreamEvent>>,
    rx: Option<mpsc::Receiver<UpstreamEvent>>,
    sent: usize,
}

#[async_trait]
impl LiveSession for ScriptedSession {
    async fn send(&mut self, turn: OutgoingTurn<'_>) -> Result<(), UpstreamError> {
        let now = self.recorder.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorder.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.recorder.in_flight.fetch_sub(1, Ordering::SeqCst);

        let index = self.sent;
        self.sent += 1;
        if self.script.fail_send_at == Some(index) {
            return Err(UpstreamError::Send("connection reset".to_string()));
        }

        self.recorder.sends.lock().unwrap().push(SentTurn {
            role: turn.role,
            parts: turn.parts.to_vec(),
            end_of_turn: turn.end_of_turn,
        });

        if turn.end_of_turn {
            if let Some(tx) = &self.tx {
                for event in self.script.events.drain(..) {
                    let _ = tx.try_send(event);
                }
            }
            if self.script.hang_up_after_events {
                self.tx = None;
            }
        }
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<UpstreamEvent>> {
        self.rx.take()
    }

    async fn close(&mut self) {
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        self.tx = None;
    }
}

/// Resolver returning a fixed credential, or a fixed failure.
pub struct StaticCredentials(pub Option<Credential>);

#[async_trait]
impl CredentialResolver for StaticCredentials {
    async fn resolve(&self) -> Result<Credential, String> {
        self.0.clone().ok_or_else(|| "no key configured".to_string())
    }
}

pub struct StaticCatalog {
    pub default: Option<String>,
    pub models: Vec<String>,
}

impl ModelCatalog for StaticCatalog {
    fn default_model(&self) -> Result<String, String> {
        self.default.clone().ok_or_else(|| "no default model".to_string())
    }

    fn list_models(&self) -> Vec<String> {
        self.models.clone()
    }
}

pub const DEFAULT_MODEL: &str = "gemini-test-live";

pub fn catalog() -> Arc<StaticCatalog> {
    Arc::new(StaticCatalog {
        default: Some(DEFAULT_MODEL.to_string()),
        models: vec![DEFAULT_MODEL.to_string(), "gemini-other-live".to_string()],
    })
}

pub fn credentials() -> Arc<StaticCredentials> {
    Arc::new(StaticCredentials(Some(Credential::ApiKey("test-key".to_string()))))
}

pub fn opener(connector: Arc<ScriptedConnector>) -> SessionOpener {
    SessionOpener::new(credentials(), catalog(), connector)
}

pub fn relay(opener: SessionOpener) -> Relay {
    Relay::new(opener, ConversationConfig::default()).with_request_id("test-request")
}

pub type Calls = Arc<Mutex<Vec<(Option<RelayError>, String)>>>;

/// A completion callback that records every invocation.
pub fn recording_callback() -> (CompletionCallback, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    let callback: CompletionCallback = Box::new(move |err, text| {
        sink.lock().unwrap().push((err.cloned(), text.to_string()));
    });
    (callback, calls)
}

pub fn generation() -> GenerationParams {
    GenerationParams::default()
}

pub fn text_parts(text: &str) -> Vec<ContentPart> {
    vec![ContentPart::text(text)]
}
