//! Base traits and types for the AI side of a call.
//!
//! A realtime backend consumes the caller's audio and produces generated
//! speech, barge-in signals and tool calls. The gateway talks to it through
//! [`BaseRealtime`] so the session manager never depends on a concrete
//! provider protocol.
//!
//! # Audio Format
//!
//! Audio is exchanged as base64 text in the telephony codec (G.711 u-law,
//! 8kHz). The gateway never decodes it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur on the AI leg.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The provider did not complete the handshake in time
    #[error("Connection timed out after {0}ms")]
    ConnectTimeout(u64),

    /// Not connected
    #[error("Not connected")]
    NotConnected,
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Configuration for one AI-leg connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// API key for authentication
    pub api_key: String,

    /// WebSocket endpoint; the provider default is used when empty
    #[serde(default)]
    pub url: String,

    /// Model to use (e.g., "gpt-4o-realtime-preview-2024-10-01")
    #[serde(default)]
    pub model: String,

    /// Voice for audio output
    #[serde(default)]
    pub voice: Option<String>,

    /// System instructions for the assistant
    #[serde(default)]
    pub instructions: Option<String>,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Input audio format
    #[serde(default)]
    pub input_audio_format: Option<String>,

    /// Output audio format
    #[serde(default)]
    pub output_audio_format: Option<String>,

    /// Turn detection configuration
    #[serde(default)]
    pub turn_detection: Option<TurnDetectionConfig>,

    /// Tool definitions for function calling
    #[serde(default)]
    pub tools: Option<Vec<ToolDefinition>>,

    /// Response modalities (text, audio, or both)
    #[serde(default)]
    pub modalities: Option<Vec<String>>,

    /// Upper bound on the WebSocket handshake; the provider default when unset
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
}

/// Configuration for turn detection (VAD).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetectionConfig {
    /// Server-side VAD; the backend decides when the caller starts and stops
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold (0.0 to 1.0)
        #[serde(default)]
        threshold: Option<f32>,
        /// Amount of audio to include before voice detection (ms)
        #[serde(default)]
        prefix_padding_ms: Option<u32>,
        /// Silence duration before end of turn (ms)
        #[serde(default)]
        silence_duration_ms: Option<u32>,
    },
    /// No automatic turn detection
    #[serde(rename = "none")]
    None,
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        TurnDetectionConfig::ServerVad {
            threshold: None,
            prefix_padding_ms: None,
            silence_duration_ms: None,
        }
    }
}

/// Tool definition for function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool type (always "function")
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function definition
    pub function: FunctionDefinition,
}

/// Function definition for tool calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name
    pub name: String,
    /// Function description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of the AI leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected to the provider
    #[default]
    Disconnected,
    /// Currently connecting
    Connecting,
    /// Connected and ready
    Connected,
    /// Connection lost or refused
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Inbound Events
// =============================================================================

/// Function call request from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallRequest {
    /// Call ID for the function call
    pub call_id: String,
    /// Function name, empty when the provider did not announce it
    pub name: String,
    /// JSON arguments as text
    pub arguments: String,
    /// Item ID
    pub item_id: Option<String>,
}

/// Provider-agnostic events delivered from the AI leg to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// A fragment of generated speech, base64 in the output codec
    AudioDelta {
        /// Opaque audio payload
        payload: String,
        /// Conversation item the fragment belongs to
        item_id: Option<String>,
    },
    /// The backend detected the caller speaking
    SpeechStarted {
        /// Position in the input buffer in milliseconds
        audio_start_ms: u64,
    },
    /// The model finished emitting arguments for a tool call
    FunctionCall(FunctionCallRequest),
    /// The backend reported an error event
    Error {
        /// Error description
        message: String,
    },
    /// The connection ended without the gateway asking for it
    Closed {
        /// Close reason when known
        reason: Option<String>,
    },
}

/// Channel the AI leg uses to deliver events to its session.
pub type RealtimeEventSender = mpsc::Sender<RealtimeEvent>;

// =============================================================================
// Base Trait
// =============================================================================

/// Base trait for realtime conversational backends.
///
/// `connect` must send the session configuration before it returns, so that
/// callers can rely on it being the first message on the wire.
#[async_trait]
pub trait BaseRealtime: Send + Sync {
    /// Connect to the backend; inbound events are delivered on `events`.
    async fn connect(&mut self, events: RealtimeEventSender) -> RealtimeResult<()>;

    /// Disconnect from the backend. Calling it on a closed leg is a no-op.
    async fn disconnect(&mut self) -> RealtimeResult<()>;

    /// Check if the provider is connected and ready.
    fn is_ready(&self) -> bool;

    /// Get the current connection state.
    fn get_connection_state(&self) -> ConnectionState;

    /// Append caller audio (base64, passed through untouched).
    async fn send_audio(&mut self, payload: String) -> RealtimeResult<()>;

    /// Add a user text message to the conversation.
    async fn send_text(&mut self, text: &str) -> RealtimeResult<()>;

    /// Request the model to generate a response.
    async fn create_response(&mut self) -> RealtimeResult<()>;

    /// Shorten the backend's record of an assistant item to what was played.
    async fn truncate_item(&mut self, item_id: &str, audio_end_ms: u64) -> RealtimeResult<()>;

    /// Submit a function call result.
    async fn submit_function_result(&mut self, call_id: &str, output: &str)
    -> RealtimeResult<()>;

    /// Get provider information.
    fn get_provider_info(&self) -> serde_json::Value;
}

// =============================================================================
// Factory
// =============================================================================

/// Boxed trait object for realtime providers.
pub type BoxedRealtime = Box<dyn BaseRealtime>;

/// Creates one AI-leg client per call.
pub trait RealtimeFactory: Send + Sync {
    /// Create a new, not yet connected provider from configuration.
    fn create(&self, config: RealtimeConfig) -> RealtimeResult<BoxedRealtime>;
}

/// Shared handle to a factory.
pub type SharedRealtimeFactory = Arc<dyn RealtimeFactory>;
