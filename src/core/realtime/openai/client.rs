//! OpenAI Realtime API client implementation.
//!
//! This module provides the OpenAI Realtime client that implements the `BaseRealtime` trait
//! using OpenAI's WebSocket-based Realtime API.
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: WebSocket with JSON events
//! - Audio: G.711 u-law, 8kHz, base64 encoded (passed through untouched)
//!
//! # Tasks
//!
//! Each connection runs two tasks. The writer drains a bounded queue of
//! [`ClientEvent`]s into the socket; the reader decodes server events and
//! forwards them to the session as [`RealtimeEvent`]s. Keeping them apart
//! means a full inbound queue never stalls outbound writes.
//!
//! # Example
//!
//! ```rust,ignore
//! use hotline_gateway::core::realtime::{BaseRealtime, OpenAIRealtime, RealtimeConfig};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RealtimeConfig {
//!         api_key: "sk-...".to_string(),
//!         voice: Some("alloy".to_string()),
//!         ..Default::default()
//!     };
//!
//!     let (tx, mut rx) = mpsc::channel(256);
//!     let mut realtime = OpenAIRealtime::new(config).unwrap();
//!     realtime.connect(tx).await.unwrap();
//!
//!     while let Some(event) = rx.recv().await {
//!         println!("{event:?}");
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::config::{
    OPENAI_BETA_HEADER, OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat, OpenAIRealtimeModel,
    OpenAIRealtimeVoice,
};
use super::messages::{
    ClientEvent, ConversationItem, LOGGED_EVENT_TYPES, ServerEvent, SessionConfig, ToolDef,
    TurnDetection,
};
use crate::core::realtime::base::{
    BaseRealtime, BoxedRealtime, ConnectionState, FunctionCallRequest, RealtimeConfig,
    RealtimeError, RealtimeEvent, RealtimeEventSender, RealtimeFactory, RealtimeResult,
    TurnDetectionConfig,
};

/// Channel capacity for WebSocket message sending.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Handshake bound used when the configuration does not set one.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// How long `disconnect` waits for the writer to flush and send the close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// OpenAI Realtime Client
// =============================================================================

/// OpenAI Realtime API client implementation.
///
/// One instance serves exactly one call. There is no reconnection: when the
/// server goes away a [`RealtimeEvent::Closed`] is delivered and the session
/// is expected to end the call.
pub struct OpenAIRealtime {
    /// Configuration
    config: RealtimeConfig,
    /// Parsed model
    model: OpenAIRealtimeModel,
    /// Parsed voice
    voice: OpenAIRealtimeVoice,
    /// Audio format, used for both directions
    audio_format: OpenAIRealtimeAudioFormat,
    /// Connected flag shared with the reader task
    connected: Arc<AtomicBool>,
    /// Set when the connection ended without `disconnect` being called
    failed: Arc<AtomicBool>,
    /// Suppresses the `Closed` event when the gateway hangs up itself
    intentional_disconnect: Arc<AtomicBool>,
    /// Outbound queue to the writer task
    ws_sender: Option<mpsc::Sender<ClientEvent>>,
    /// Writer task handle
    writer_handle: Option<JoinHandle<()>>,
    /// Reader task handle
    reader_handle: Option<JoinHandle<()>>,
}

impl OpenAIRealtime {
    /// Create a client from configuration. Does not connect.
    pub fn new(config: RealtimeConfig) -> RealtimeResult<Self> {
        if config.api_key.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        let model = if config.model.is_empty() {
            OpenAIRealtimeModel::default()
        } else {
            OpenAIRealtimeModel::from_str_or_default(&config.model)
        };

        let voice = config
            .voice
            .as_deref()
            .map(OpenAIRealtimeVoice::from_str_or_default)
            .unwrap_or_default();

        let audio_format = config
            .input_audio_format
            .as_deref()
            .map(OpenAIRealtimeAudioFormat::from_str_or_default)
            .unwrap_or_default();

        Ok(Self {
            config,
            model,
            voice,
            audio_format,
            connected: Arc::new(AtomicBool::new(false)),
            failed: Arc::new(AtomicBool::new(false)),
            intentional_disconnect: Arc::new(AtomicBool::new(false)),
            ws_sender: None,
            writer_handle: None,
            reader_handle: None,
        })
    }

    /// Build the WebSocket URL with model parameter.
    fn build_ws_url(&self) -> RealtimeResult<Url> {
        let base = if self.config.url.is_empty() {
            OPENAI_REALTIME_URL
        } else {
            self.config.url.as_str()
        };

        let mut url = Url::parse(base).map_err(|e| {
            RealtimeError::InvalidConfiguration(format!("Invalid realtime URL '{base}': {e}"))
        })?;
        url.query_pairs_mut()
            .append_pair("model", self.model.as_str());
        Ok(url)
    }

    /// Build the initial session configuration.
    fn build_session_config(&self) -> SessionConfig {
        let output_format = self
            .config
            .output_audio_format
            .as_deref()
            .map(OpenAIRealtimeAudioFormat::from_str_or_default)
            .unwrap_or(self.audio_format);

        SessionConfig {
            turn_detection: self
                .config
                .turn_detection
                .clone()
                .unwrap_or_default()
                .into_wire(),
            input_audio_format: Some(self.audio_format.as_str().to_string()),
            output_audio_format: Some(output_format.as_str().to_string()),
            voice: Some(self.voice.as_str().to_string()),
            instructions: self.config.instructions.clone(),
            modalities: Some(
                self.config
                    .modalities
                    .clone()
                    .unwrap_or_else(|| vec!["text".to_string(), "audio".to_string()]),
            ),
            temperature: self.config.temperature,
            tools: self.config.tools.as_ref().map(|tools| {
                tools
                    .iter()
                    .map(|t| ToolDef {
                        tool_type: t.tool_type.clone(),
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.clone(),
                    })
                    .collect()
            }),
        }
    }

    /// Queue an event for the writer task.
    async fn send_event(&self, event: ClientEvent) -> RealtimeResult<()> {
        if !self.is_ready() {
            return Err(RealtimeError::NotConnected);
        }

        match self.ws_sender.as_ref() {
            Some(sender) => sender
                .send(event)
                .await
                .map_err(|e| RealtimeError::WebSocketError(e.to_string())),
            None => Err(RealtimeError::NotConnected),
        }
    }
}

impl TurnDetectionConfig {
    fn into_wire(self) -> Option<TurnDetection> {
        match self {
            TurnDetectionConfig::ServerVad {
                threshold,
                prefix_padding_ms,
                silence_duration_ms,
            } => Some(TurnDetection::ServerVad {
                threshold,
                prefix_padding_ms,
                silence_duration_ms,
            }),
            TurnDetectionConfig::None => None,
        }
    }
}

/// Decode one text frame from the server and forward what the session needs.
///
/// Returns `false` once the session has stopped listening.
async fn dispatch_server_text(
    text: &str,
    events: &RealtimeEventSender,
    pending_function_names: &mut HashMap<String, String>,
) -> bool {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse server message: {} - {}", e, text);
            return true;
        }
    };

    if let Some(event_type) = value.get("type").and_then(|t| t.as_str())
        && LOGGED_EVENT_TYPES.contains(&event_type)
    {
        info!(event_type, raw = %text, "Received realtime event");
    }

    let event = match serde_json::from_value::<ServerEvent>(value) {
        Ok(event) => event,
        Err(e) => {
            warn!("Failed to decode server event: {} - {}", e, text);
            return true;
        }
    };

    let forward = match event {
        ServerEvent::SessionCreated { session } => {
            info!(
                session_id = %session.id,
                model = session.model.as_deref().unwrap_or("unknown"),
                "OpenAI Realtime session created"
            );
            None
        }

        ServerEvent::SessionUpdated { session } => {
            debug!("OpenAI Realtime session updated: {}", session.id);
            None
        }

        ServerEvent::Error { error } => {
            error!(
                "OpenAI Realtime error: {} - {}",
                error.error_type, error.message
            );
            Some(RealtimeEvent::Error {
                message: format!("{}: {}", error.error_type, error.message),
            })
        }

        ServerEvent::SpeechStarted {
            audio_start_ms,
            item_id,
        } => {
            debug!(
                item_id = item_id.as_deref().unwrap_or(""),
                "Speech started at {}ms", audio_start_ms
            );
            Some(RealtimeEvent::SpeechStarted { audio_start_ms })
        }

        ServerEvent::AudioDelta { item_id, delta } => {
            if delta.is_empty() {
                trace!("Skipping empty audio delta");
                None
            } else {
                Some(RealtimeEvent::AudioDelta {
                    payload: delta,
                    item_id,
                })
            }
        }

        // FunctionCallArgumentsDone does not always carry the name
        ServerEvent::OutputItemAdded { item } => {
            if item.item_type == "function_call"
                && let (Some(call_id), Some(name)) = (item.call_id, item.name)
            {
                debug!(call_id = %call_id, name = %name, "Tracking function call");
                pending_function_names.insert(call_id, name);
            }
            None
        }

        ServerEvent::FunctionCallArgumentsDone {
            call_id,
            arguments,
            name,
            item_id,
        } => {
            let tracked = pending_function_names.remove(&call_id);
            let name = name.or(tracked).unwrap_or_else(|| {
                warn!(call_id = %call_id, "Function name not announced for call");
                String::new()
            });
            Some(RealtimeEvent::FunctionCall(FunctionCallRequest {
                call_id,
                name,
                arguments,
                item_id,
            }))
        }

        ServerEvent::ConversationItemCreated { .. } => None,

        ServerEvent::ResponseDone { response } => {
            debug!(
                response_id = %response.id,
                status = response.status.as_deref().unwrap_or("unknown"),
                "Response done"
            );
            None
        }

        ServerEvent::Other => {
            trace!("Unhandled server event");
            None
        }
    };

    match forward {
        Some(event) => events.send(event).await.is_ok(),
        None => true,
    }
}

#[async_trait]
impl BaseRealtime for OpenAIRealtime {
    async fn connect(&mut self, events: RealtimeEventSender) -> RealtimeResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.intentional_disconnect.store(false, Ordering::SeqCst);
        self.failed.store(false, Ordering::SeqCst);

        let url = self.build_ws_url()?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        request.headers_mut().insert(http::header::AUTHORIZATION, auth);
        request
            .headers_mut()
            .insert("openai-beta", HeaderValue::from_static(OPENAI_BETA_HEADER));

        let timeout_ms = self
            .config
            .connect_timeout_ms
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS);
        let handshake = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            tokio_tungstenite::connect_async(request),
        )
        .await;

        let (ws_stream, _response) = match handshake {
            Ok(Ok(conn)) => conn,
            Ok(Err(tungstenite::Error::Http(response)))
                if response.status() == http::StatusCode::UNAUTHORIZED =>
            {
                self.failed.store(true, Ordering::SeqCst);
                return Err(RealtimeError::AuthenticationFailed(
                    "OpenAI rejected the API key".to_string(),
                ));
            }
            Ok(Err(e)) => {
                self.failed.store(true, Ordering::SeqCst);
                return Err(RealtimeError::ConnectionFailed(e.to_string()));
            }
            Err(_) => {
                warn!(timeout_ms, "OpenAI Realtime handshake timed out");
                self.failed.store(true, Ordering::SeqCst);
                return Err(RealtimeError::ConnectTimeout(timeout_ms));
            }
        };

        info!(model = %self.model, "Connected to OpenAI Realtime API");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);

        let writer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let json = match serde_json::to_string(&event) {
                    Ok(j) => j,
                    Err(e) => {
                        error!("Failed to serialize event: {}", e);
                        continue;
                    }
                };

                if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                    warn!("Failed to send WebSocket message: {}", e);
                    return;
                }
            }

            // Queue closed by disconnect()
            if let Err(e) = ws_sink.send(Message::Close(None)).await {
                debug!("Close frame not delivered: {}", e);
            }
            let _ = ws_sink.close().await;
        });

        let connected = self.connected.clone();
        let failed = self.failed.clone();
        let intentional_disconnect = self.intentional_disconnect.clone();

        let reader = tokio::spawn(async move {
            let mut pending_function_names = HashMap::new();

            let reason = loop {
                match ws_stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if !dispatch_server_text(&text, &events, &mut pending_function_names).await
                        {
                            debug!("Session stopped listening to realtime events");
                            break None;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("WebSocket closed by server");
                        break frame.map(|f| f.reason.to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break Some(e.to_string());
                    }
                    None => break Some("stream ended".to_string()),
                }
            };

            connected.store(false, Ordering::SeqCst);

            if !intentional_disconnect.load(Ordering::SeqCst) {
                failed.store(true, Ordering::SeqCst);
                let _ = events.send(RealtimeEvent::Closed { reason }).await;
            }
            debug!("OpenAI Realtime reader task ended");
        });

        self.ws_sender = Some(tx);
        self.writer_handle = Some(writer);
        self.reader_handle = Some(reader);
        self.connected.store(true, Ordering::SeqCst);

        // Must be the first message on the wire
        let session = self.build_session_config();
        self.send_event(ClientEvent::SessionUpdate { session }).await
    }

    async fn disconnect(&mut self) -> RealtimeResult<()> {
        let sender = self.ws_sender.take();
        let writer = self.writer_handle.take();
        let reader = self.reader_handle.take();

        if sender.is_none() && writer.is_none() && reader.is_none() {
            return Ok(());
        }

        self.intentional_disconnect.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);

        // Dropping the sender lets the writer flush and send the close frame
        drop(sender);
        if let Some(writer) = writer {
            let abort = writer.abort_handle();
            if tokio::time::timeout(CLOSE_TIMEOUT, writer).await.is_err() {
                warn!("Timed out closing OpenAI Realtime connection");
                abort.abort();
            }
        }
        if let Some(reader) = reader {
            reader.abort();
        }

        info!("Disconnected from OpenAI Realtime API");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn get_connection_state(&self) -> ConnectionState {
        if self.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else if self.failed.load(Ordering::SeqCst) {
            ConnectionState::Failed
        } else {
            ConnectionState::Disconnected
        }
    }

    async fn send_audio(&mut self, payload: String) -> RealtimeResult<()> {
        self.send_event(ClientEvent::InputAudioBufferAppend { audio: payload })
            .await
    }

    async fn send_text(&mut self, text: &str) -> RealtimeResult<()> {
        self.send_event(ClientEvent::ConversationItemCreate {
            item: ConversationItem::user_text(text),
        })
        .await
    }

    async fn create_response(&mut self) -> RealtimeResult<()> {
        self.send_event(ClientEvent::ResponseCreate).await
    }

    async fn truncate_item(&mut self, item_id: &str, audio_end_ms: u64) -> RealtimeResult<()> {
        self.send_event(ClientEvent::ConversationItemTruncate {
            item_id: item_id.to_string(),
            content_index: 0,
            audio_end_ms,
        })
        .await
    }

    async fn submit_function_result(&mut self, call_id: &str, output: &str) -> RealtimeResult<()> {
        self.send_event(ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_call_output(call_id, output),
        })
        .await
    }

    fn get_provider_info(&self) -> serde_json::Value {
        serde_json::json!({
            "provider": "openai",
            "api_type": "WebSocket Realtime",
            "endpoint": if self.config.url.is_empty() { OPENAI_REALTIME_URL } else { self.config.url.as_str() },
            "model": self.model.as_str(),
            "voice": self.voice.as_str(),
            "audio_format": self.audio_format.as_str(),
            "sample_rate": self.audio_format.sample_rate(),
        })
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Builds [`OpenAIRealtime`] clients for new calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAIRealtimeFactory;

impl RealtimeFactory for OpenAIRealtimeFactory {
    fn create(&self, config: RealtimeConfig) -> RealtimeResult<BoxedRealtime> {
        Ok(Box::new(OpenAIRealtime::new(config)?))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::base::{FunctionDefinition, ToolDefinition};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

    fn test_config() -> RealtimeConfig {
        RealtimeConfig {
            api_key: "test_key".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_openai_realtime_creation() {
        let config = RealtimeConfig {
            api_key: "test_key".to_string(),
            model: "gpt-4o-mini-realtime-preview".to_string(),
            voice: Some("shimmer".to_string()),
            ..Default::default()
        };

        let realtime = OpenAIRealtime::new(config).unwrap();
        assert_eq!(realtime.model, OpenAIRealtimeModel::Gpt4oMiniRealtimePreview);
        assert_eq!(realtime.voice, OpenAIRealtimeVoice::Shimmer);
        assert_eq!(realtime.audio_format, OpenAIRealtimeAudioFormat::G711Ulaw);
        assert!(!realtime.is_ready());
        assert_eq!(
            realtime.get_connection_state(),
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn test_api_key_required() {
        let result = OpenAIRealtime::new(RealtimeConfig::default());
        assert!(matches!(
            result,
            Err(RealtimeError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_send_audio_requires_connection() {
        let mut realtime = OpenAIRealtime::new(test_config()).unwrap();
        let result = realtime.send_audio("AAAA".to_string()).await;
        assert!(matches!(result, Err(RealtimeError::NotConnected)));
    }

    #[tokio::test]
    async fn test_disconnect_without_connect_is_noop() {
        let mut realtime = OpenAIRealtime::new(test_config()).unwrap();
        assert!(realtime.disconnect().await.is_ok());
        assert!(realtime.disconnect().await.is_ok());
        assert_eq!(
            realtime.get_connection_state(),
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn test_build_ws_url() {
        let realtime = OpenAIRealtime::new(test_config()).unwrap();
        assert_eq!(
            realtime.build_ws_url().unwrap().as_str(),
            "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-10-01"
        );

        let custom = OpenAIRealtime::new(RealtimeConfig {
            url: "ws://127.0.0.1:9000/v1/realtime?region=eu".to_string(),
            ..test_config()
        })
        .unwrap();
        assert_eq!(
            custom.build_ws_url().unwrap().as_str(),
            "ws://127.0.0.1:9000/v1/realtime?region=eu&model=gpt-4o-realtime-preview-2024-10-01"
        );
    }

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let realtime = OpenAIRealtime::new(RealtimeConfig {
            url: "not a url".to_string(),
            ..test_config()
        })
        .unwrap();
        assert!(matches!(
            realtime.build_ws_url(),
            Err(RealtimeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_session_config_for_telephony() {
        let realtime = OpenAIRealtime::new(RealtimeConfig {
            instructions: Some("Sei knapp.".to_string()),
            temperature: Some(0.6),
            tools: Some(vec![ToolDefinition {
                tool_type: "function".to_string(),
                function: FunctionDefinition {
                    name: "bewerte_reise_preis".to_string(),
                    description: Some("Preis".to_string()),
                    parameters: Some(serde_json::json!({"type": "object"})),
                },
            }]),
            ..test_config()
        })
        .unwrap();

        let json = serde_json::to_value(realtime.build_session_config()).unwrap();
        assert_eq!(json["input_audio_format"], "g711_ulaw");
        assert_eq!(json["output_audio_format"], "g711_ulaw");
        assert_eq!(json["turn_detection"]["type"], "server_vad");
        assert_eq!(json["voice"], "alloy");
        assert_eq!(json["instructions"], "Sei knapp.");
        assert_eq!(json["modalities"], serde_json::json!(["text", "audio"]));
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["name"], "bewerte_reise_preis");
        assert!(json["tools"][0].get("function").is_none());
    }

    #[test]
    fn test_provider_info() {
        let realtime = OpenAIRealtime::new(test_config()).unwrap();
        let info = realtime.get_provider_info();
        assert_eq!(info["provider"], "openai");
        assert_eq!(info["audio_format"], "g711_ulaw");
        assert_eq!(info["model"], "gpt-4o-realtime-preview-2024-10-01");
        assert_eq!(info["voice"], "alloy");
        assert_eq!(info["sample_rate"], 8000);
        assert!(info.get("features").is_none());
    }

    #[tokio::test]
    async fn test_dispatch_audio_delta_and_speech_started() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pending = HashMap::new();

        assert!(
            dispatch_server_text(
                r#"{"type":"response.audio.delta","item_id":"item_1","delta":"AAAA"}"#,
                &tx,
                &mut pending
            )
            .await
        );
        assert!(
            dispatch_server_text(
                r#"{"type":"input_audio_buffer.speech_started","audio_start_ms":420,"item_id":"item_2"}"#,
                &tx,
                &mut pending
            )
            .await
        );

        assert_eq!(
            rx.recv().await,
            Some(RealtimeEvent::AudioDelta {
                payload: "AAAA".to_string(),
                item_id: Some("item_1".to_string()),
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(RealtimeEvent::SpeechStarted { audio_start_ms: 420 })
        );
    }

    #[tokio::test]
    async fn test_dispatch_skips_empty_delta_and_unknown_events() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pending = HashMap::new();

        dispatch_server_text(r#"{"type":"response.audio.delta","delta":""}"#, &tx, &mut pending)
            .await;
        dispatch_server_text(r#"{"type":"rate_limits.updated"}"#, &tx, &mut pending).await;
        dispatch_server_text("not json", &tx, &mut pending).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_function_call_uses_tracked_name() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pending = HashMap::new();

        dispatch_server_text(
            r#"{"type":"response.output_item.added","item":{"id":"item_7","type":"function_call","call_id":"call_1","name":"bewerte_reise_preis"}}"#,
            &tx,
            &mut pending,
        )
        .await;
        assert_eq!(pending.get("call_1").map(String::as_str), Some("bewerte_reise_preis"));

        dispatch_server_text(
            r#"{"type":"response.function_call_arguments.done","call_id":"call_1","arguments":"{\"dauer\":20}","item_id":"item_7"}"#,
            &tx,
            &mut pending,
        )
        .await;

        match rx.recv().await {
            Some(RealtimeEvent::FunctionCall(request)) => {
                assert_eq!(request.call_id, "call_1");
                assert_eq!(request.name, "bewerte_reise_preis");
                assert_eq!(request.arguments, "{\"dauer\":20}");
                assert_eq!(request.item_id.as_deref(), Some("item_7"));
            }
            other => panic!("Expected function call, got {other:?}"),
        }
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_reports_closed_session() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut pending = HashMap::new();

        let alive = dispatch_server_text(
            r#"{"type":"error","error":{"type":"server_error","message":"boom"}}"#,
            &tx,
            &mut pending,
        )
        .await;
        assert!(!alive);
    }

    #[tokio::test]
    async fn test_connect_sends_headers_and_session_update_first() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut captured = None;
            let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
                captured = Some((
                    req.headers()
                        .get("authorization")
                        .map(|v| v.to_str().unwrap().to_string()),
                    req.headers()
                        .get("openai-beta")
                        .map(|v| v.to_str().unwrap().to_string()),
                    req.uri().to_string(),
                ));
                Ok(resp)
            })
            .await
            .unwrap();
            let (_sink, mut stream) = ws.split();
            let first = match stream.next().await {
                Some(Ok(Message::Text(text))) => text.to_string(),
                other => panic!("Expected text frame, got {other:?}"),
            };
            (captured.unwrap(), first)
        });

        let mut realtime = OpenAIRealtime::new(RealtimeConfig {
            url: format!("ws://{addr}/v1/realtime"),
            ..test_config()
        })
        .unwrap();
        let (tx, _rx) = mpsc::channel(8);
        realtime.connect(tx).await.unwrap();
        assert!(realtime.is_ready());

        let ((auth, beta, uri), first) = server.await.unwrap();
        assert_eq!(auth.as_deref(), Some("Bearer test_key"));
        assert_eq!(beta.as_deref(), Some("realtime=v1"));
        assert!(uri.contains("model=gpt-4o-realtime-preview-2024-10-01"));

        let first: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(first["type"], "session.update");

        realtime.disconnect().await.unwrap();
        assert!(!realtime.is_ready());
    }

    #[tokio::test]
    async fn test_server_close_delivers_closed_event() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // Wait for session.update, then hang up
            let _ = ws.next().await;
            let _ = ws.close(None).await;
        });

        let mut realtime = OpenAIRealtime::new(RealtimeConfig {
            url: format!("ws://{addr}/v1/realtime"),
            ..test_config()
        })
        .unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        realtime.connect(tx).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(RealtimeEvent::Closed { .. })));
        assert_eq!(realtime.get_connection_state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut realtime = OpenAIRealtime::new(RealtimeConfig {
            url: format!("ws://{addr}/v1/realtime"),
            ..test_config()
        })
        .unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let result = realtime.connect(tx).await;
        assert!(matches!(result, Err(RealtimeError::ConnectionFailed(_))));
        assert_eq!(realtime.get_connection_state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_stalled_handshake_times_out() {
        // Accepts TCP but never answers the upgrade request
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let mut realtime = OpenAIRealtime::new(RealtimeConfig {
            url: format!("ws://{addr}/v1/realtime"),
            connect_timeout_ms: Some(200),
            ..test_config()
        })
        .unwrap();
        let (tx, _rx) = mpsc::channel(8);

        let result = tokio::time::timeout(Duration::from_secs(5), realtime.connect(tx))
            .await
            .expect("connect was not bounded");
        assert!(matches!(result, Err(RealtimeError::ConnectTimeout(200))));
        assert_eq!(realtime.get_connection_state(), ConnectionState::Failed);
        server.abort();
    }

    #[test]
    fn test_factory_rejects_missing_key() {
        let factory = OpenAIRealtimeFactory;
        assert!(factory.create(RealtimeConfig::default()).is_err());
        assert!(factory.create(test_config()).is_ok());
    }
}
