//! Gemini Live sessions over WebSocket.
//!
//! Opening a session connects, sends the `setup` message and waits for
//! `setupComplete`. After that a reader task translates server frames into
//! [`UpstreamEvent`]s on a bounded channel while the session handle keeps
//! the write half for sends.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::UpstreamConfig;
use crate::credentials::Credential;
use crate::upstream::wire::{encode_setup, encode_turn, ServerMessage};
use crate::upstream::{
    ConnectRequest, LiveConnector, LiveSession, OutgoingTurn, UpstreamError, UpstreamEvent,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the upstream event channel.
const EVENT_BUFFER: usize = 64;

/// Opens sessions against the Gemini Live `BidiGenerateContent` endpoint.
pub struct GeminiLiveConnector {
    config: UpstreamConfig,
}

impl GeminiLiveConnector {
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }

    /// Service URL, with the API key attached when that is the credential.
    pub fn session_url(&self, credential: &Credential) -> String {
        let base = format!(
            "{}/ws/google.ai.generativelanguage.{}.GenerativeService.BidiGenerateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.api_version
        );
        match credential {
            Credential::ApiKey(key) => format!("{base}?key={}", urlencoding::encode(key)),
            Credential::AccessToken(_) => base,
        }
    }

    async fn open(&self, request: &ConnectRequest) -> Result<GeminiLiveSession, UpstreamError> {
        let mut ws_request = self
            .session_url(&request.credential)
            .into_client_request()
            .map_err(|e| UpstreamError::Connect(e.to_string()))?;

        if let Credential::AccessToken(token) = &request.credential {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| UpstreamError::Connect(e.to_string()))?;
            ws_request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws, _) = connect_async(ws_request)
            .await
            .map_err(|e| UpstreamError::Connect(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let setup = encode_setup(&request.model, &request.generation)
            .map_err(|e| UpstreamError::Handshake(e.to_string()))?;
        sink.send(Message::Text(setup.into()))
            .await
            .map_err(|e| UpstreamError::Handshake(e.to_string()))?;

        wait_for_setup_complete(&mut stream).await?;
        debug!(model = %request.model, "Live session setup complete");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(read_events(stream, tx));

        Ok(GeminiLiveSession {
            sink,
            events: Some(rx),
            reader,
            closed: false,
        })
    }
}

#[async_trait]
impl LiveConnector for GeminiLiveConnector {
    async fn connect(&self, request: ConnectRequest) -> Result<Box<dyn LiveSession>, UpstreamError> {
        info!(model = %request.model, "Opening live session");

        let session = match request.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.open(&request))
                .await
                .map_err(|_| UpstreamError::Timeout(deadline))??,
            None => self.open(&request).await?,
        };

        Ok(Box::new(session))
    }
}

async fn wait_for_setup_complete(stream: &mut SplitStream<WsStream>) -> Result<(), UpstreamError> {
    while let Some(frame) = stream.next().await {
        let frame = frame.map_err(|e| UpstreamError::Handshake(e.to_string()))?;
        let payload = match frame {
            Message::Text(text) => text.as_bytes().to_vec(),
            Message::Binary(data) => data.to_vec(),
            Message::Close(close) => {
                return Err(UpstreamError::Handshake(close_reason(close.as_ref())));
            }
            _ => continue,
        };

        match ServerMessage::decode(&payload) {
            Ok(msg) if msg.is_setup_complete() => return Ok(()),
            Ok(_) => debug!("Ignoring message received before setupComplete"),
            Err(e) => warn!("Undecodable message during setup: {e}"),
        }
    }
    Err(UpstreamError::Handshake(
        "connection closed before setupComplete".to_string(),
    ))
}

/// Reader task: server frames → events. Exits after the first terminal
/// event or when the receiver is dropped.
async fn read_events(mut stream: SplitStream<WsStream>, tx: mpsc::Sender<UpstreamEvent>) {
    while let Some(frame) = stream.next().await {
        let payload = match frame {
            Ok(Message::Text(text)) => text.as_bytes().to_vec(),
            Ok(Message::Binary(data)) => data.to_vec(),
            Ok(Message::Close(close)) => {
                let terminal = match close.as_ref() {
                    Some(frame) if frame.code == CloseCode::Normal => {
                        UpstreamEvent::Error("upstream closed the session".to_string())
                    }
                    other => UpstreamEvent::Error(close_reason(other)),
                };
                let _ = tx.send(terminal).await;
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                let _ = tx.send(UpstreamEvent::Error(e.to_string())).await;
                return;
            }
        };

        let msg = match ServerMessage::decode(&payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Skipping undecodable upstream message: {e}");
                continue;
            }
        };

        if let Some(go_away) = &msg.go_away {
            warn!(time_left = ?go_away.time_left, "Upstream announced session shutdown");
        }
        if msg.tool_call.is_some() {
            debug!("Ignoring tool call; no tools are declared");
        }

        for event in msg.into_events() {
            let terminal = !matches!(event, UpstreamEvent::Data(_));
            if tx.send(event).await.is_err() {
                return;
            }
            if terminal {
                return;
            }
        }
    }

    let _ = tx
        .send(UpstreamEvent::Error(
            "upstream connection dropped".to_string(),
        ))
        .await;
}

fn close_reason(frame: Option<&CloseFrame>) -> String {
    match frame {
        Some(frame) if !frame.reason.is_empty() => frame.reason.to_string(),
        Some(frame) => format!("upstream closed the session ({})", u16::from(frame.code)),
        None => "upstream closed the session".to_string(),
    }
}

/// An open Gemini Live session.
pub struct GeminiLiveSession {
    sink: SplitSink<WsStream, Message>,
    events: Option<mpsc::Receiver<UpstreamEvent>>,
    reader: JoinHandle<()>,
    closed: bool,
}

#[async_trait]
impl LiveSession for GeminiLiveSession {
    async fn send(&mut self, turn: OutgoingTurn<'_>) -> Result<(), UpstreamError> {
        if self.closed {
            return Err(UpstreamError::Closed);
        }
        let message = encode_turn(&turn).map_err(|e| UpstreamError::Send(e.to_string()))?;
        self.sink
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| UpstreamError::Send(e.to_string()))
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<UpstreamEvent>> {
        self.events.take()
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.reader.abort();
        if let Err(e) = self.sink.send(Message::Close(None)).await {
            debug!("Close frame not delivered: {e}");
        }
        let _ = self.sink.close().await;
    }
}

impl Drop for GeminiLiveSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::accept_async;

    use super::*;
    use crate::conversation::{ContentPart, Role};

    type ServerWs = WebSocketStream<TcpStream>;

    /// Local endpoint accepting a single WebSocket connection.
    async fn local_endpoint() -> (TcpListener, UpstreamConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = UpstreamConfig {
            endpoint: format!("ws://{}", listener.local_addr().unwrap()),
            ..UpstreamConfig::default()
        };
        (listener, config)
    }

    async fn accept(listener: &TcpListener) -> ServerWs {
        let (tcp, _) = listener.accept().await.unwrap();
        accept_async(tcp).await.unwrap()
    }

    async fn next_text(ws: &mut ServerWs) -> serde_json::Value {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                Message::Binary(data) => return serde_json::from_slice(&data).unwrap(),
                _ => continue,
            }
        }
    }

    /// Read the setup message and acknowledge it.
    async fn complete_setup(ws: &mut ServerWs) -> serde_json::Value {
        let setup = next_text(ws).await;
        ws.send(Message::text(r#"{"setupComplete":{}}"#.to_string()))
            .await
            .unwrap();
        setup
    }

    fn connect_request(deadline: Option<Duration>) -> ConnectRequest {
        ConnectRequest {
            credential: Credential::ApiKey("k".into()),
            model: "gemini-test-live".into(),
            generation: Default::default(),
            deadline,
        }
    }

    async fn send_final(session: &mut dyn LiveSession, text: &str) {
        let parts = vec![ContentPart::text(text)];
        session
            .send(OutgoingTurn {
                role: Role::User,
                parts: &parts,
                end_of_turn: true,
            })
            .await
            .unwrap();
    }

    async fn drain(rx: &mut mpsc::Receiver<UpstreamEvent>) -> Vec<UpstreamEvent> {
        let mut events = Vec::new();
        while let Some(event) =
            tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap()
        {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_session_url_with_api_key() {
        let connector = GeminiLiveConnector::new(UpstreamConfig::default());
        assert_eq!(
            connector.session_url(&Credential::ApiKey("k".into())),
            "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent?key=k"
        );
    }

    #[test]
    fn test_session_url_encodes_api_key() {
        let connector = GeminiLiveConnector::new(UpstreamConfig::default());
        let url = connector.session_url(&Credential::ApiKey("a+b/c=&d e".into()));
        assert!(url.ends_with("?key=a%2Bb%2Fc%3D%26d%20e"));
        assert!(url.as_str().into_client_request().is_ok());
    }

    #[test]
    fn test_session_url_with_access_token_has_no_query() {
        let connector = GeminiLiveConnector::new(UpstreamConfig {
            endpoint: "ws://127.0.0.1:9000/".into(),
            api_version: "v1alpha".into(),
            connect_timeout_secs: None,
        });
        let url = connector.session_url(&Credential::AccessToken("t".into()));
        assert_eq!(
            url,
            "ws://127.0.0.1:9000/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connect_error() {
        let connector = GeminiLiveConnector::new(UpstreamConfig {
            endpoint: "ws://127.0.0.1:1".into(),
            ..UpstreamConfig::default()
        });
        let result = connector
            .connect(ConnectRequest {
                credential: Credential::ApiKey("k".into()),
                model: "gemini-2.0-flash-live-001".into(),
                generation: Default::default(),
                deadline: Some(std::time::Duration::from_secs(5)),
            })
            .await;
        assert!(matches!(
            result,
            Err(UpstreamError::Connect(_)) | Err(UpstreamError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_session_streams_text_and_binary_frames() {
        let (listener, config) = local_endpoint().await;
        let (closed_tx, closed_rx) = oneshot::channel();

        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            let setup = complete_setup(&mut ws).await;
            assert_eq!(setup["setup"]["model"], "models/gemini-test-live");
            assert_eq!(
                setup["setup"]["generationConfig"]["responseModalities"][0],
                "TEXT"
            );

            let turn = next_text(&mut ws).await;
            assert_eq!(turn["clientContent"]["turnComplete"], true);
            assert_eq!(turn["clientContent"]["turns"][0]["role"], "user");
            assert_eq!(turn["clientContent"]["turns"][0]["parts"][0]["text"], "Hi");

            ws.send(Message::text(
                r#"{"serverContent":{"modelTurn":{"parts":[{"text":"Hel"}]}}}"#.to_string(),
            ))
            .await
            .unwrap();
            ws.send(Message::binary(
                br#"{"serverContent":{"modelTurn":{"parts":[{"text":"lo"}]},"turnComplete":true}}"#
                    .to_vec(),
            ))
            .await
            .unwrap();
            // Anything after the terminal event must never reach the relay.
            ws.send(Message::text(
                r#"{"serverContent":{"modelTurn":{"parts":[{"text":"late"}]}}}"#.to_string(),
            ))
            .await
            .unwrap();

            while let Some(Ok(message)) = ws.next().await {
                if message.is_close() {
                    let _ = closed_tx.send(());
                    break;
                }
            }
        });

        let connector = GeminiLiveConnector::new(config);
        let mut session = connector
            .connect(connect_request(Some(Duration::from_secs(5))))
            .await
            .unwrap();
        let mut events = session.take_events().unwrap();
        assert!(session.take_events().is_none());

        send_final(session.as_mut(), "Hi").await;

        assert_eq!(
            drain(&mut events).await,
            vec![
                UpstreamEvent::Data("Hel".into()),
                UpstreamEvent::Data("lo".into()),
                UpstreamEvent::End,
            ]
        );

        session.close().await;
        tokio::time::timeout(Duration::from_secs(5), closed_rx)
            .await
            .unwrap()
            .unwrap();
        server.await.unwrap();

        let parts = vec![ContentPart::text("again")];
        let after_close = session
            .send(OutgoingTurn {
                role: Role::User,
                parts: &parts,
                end_of_turn: true,
            })
            .await;
        assert_eq!(after_close, Err(UpstreamError::Closed));
    }

    #[tokio::test]
    async fn test_abnormal_close_becomes_error_event() {
        let (listener, config) = local_endpoint().await;

        tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            complete_setup(&mut ws).await;
            next_text(&mut ws).await;
            ws.close(Some(CloseFrame {
                code: CloseCode::Error,
                reason: "quota exceeded".to_string().into(),
            }))
            .await
            .unwrap();
            while ws.next().await.is_some() {}
        });

        let connector = GeminiLiveConnector::new(config);
        let mut session = connector.connect(connect_request(None)).await.unwrap();
        let mut events = session.take_events().unwrap();
        send_final(session.as_mut(), "Hi").await;

        assert_eq!(
            drain(&mut events).await,
            vec![UpstreamEvent::Error("quota exceeded".into())]
        );
        session.close().await;
    }

    #[tokio::test]
    async fn test_close_during_setup_is_handshake_error() {
        let (listener, config) = local_endpoint().await;

        tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            next_text(&mut ws).await;
            ws.close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "API key not valid".to_string().into(),
            }))
            .await
            .unwrap();
            while ws.next().await.is_some() {}
        });

        let connector = GeminiLiveConnector::new(config);
        let result = connector.connect(connect_request(None)).await;
        assert_eq!(
            result.err(),
            Some(UpstreamError::Handshake("API key not valid".into()))
        );
    }

    #[tokio::test]
    async fn test_missing_setup_complete_hits_deadline() {
        let (listener, config) = local_endpoint().await;

        tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            next_text(&mut ws).await;
            // Never acknowledge the setup.
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(ws);
        });

        let connector = GeminiLiveConnector::new(config);
        let deadline = Duration::from_millis(200);
        let result = connector.connect(connect_request(Some(deadline))).await;
        assert_eq!(result.err(), Some(UpstreamError::Timeout(deadline)));
    }
}
