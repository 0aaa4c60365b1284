//! Configuration module for the hotline gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `env`: Environment variable loading
//! - `yaml`: YAML configuration file loading and overrides
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use hotline_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use zeroize::Zeroizing;

use crate::core::realtime::{RealtimeConfig, ToolDefinition, TurnDetectionConfig};

mod env;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

/// Default system instructions for the assistant.
pub const DEFAULT_ASSISTANT_INSTRUCTIONS: &str = "Du bist ein hilfsbereiter Sprachassistent, der Fragen kurz und bündig beantwortet ohne viel zu reden.";

/// Default text sent as the caller's first turn so the assistant speaks first.
pub const DEFAULT_GREETING_TRIGGER: &str = "Hallo";

/// Default greeting spoken by Twilio before the stream is connected.
pub const DEFAULT_CALL_GREETING: &str = "Viel Spaß beim Testen des Sprachassistenten!";

/// Default language of the spoken greeting.
pub const DEFAULT_CALL_GREETING_LANGUAGE: &str = "de-DE";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No OpenAI API key was configured
    #[error("OPENAI_API_KEY is required but was not set")]
    MissingApiKey,

    /// A value could not be parsed or is out of range
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },

    /// The YAML file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The YAML file could not be parsed
    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway:
/// - Server settings (host, port, TLS, public host for TwiML)
/// - OpenAI Realtime connection and assistant behaviour
/// - Call greeting
/// - Session tuning (queue sizes, timeouts)
/// - Security settings (rate limiting, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// Host used in the TwiML stream URL; the request `Host` header when unset
    pub public_host: Option<String>,

    // OpenAI Realtime
    /// API key, empty until validated; wiped from memory on drop
    pub openai_api_key: Zeroizing<String>,
    pub realtime_url: String,
    pub realtime_model: String,
    pub realtime_voice: String,
    /// Bound on the AI-leg WebSocket handshake
    pub realtime_connect_timeout_ms: u64,

    // Assistant
    pub assistant_instructions: String,
    pub assistant_temperature: f32,
    /// User text sent right after session setup so the assistant greets first
    pub assistant_greeting_trigger: String,

    // Call setup
    pub call_greeting: String,
    pub call_greeting_language: String,

    // Session tuning
    /// Capacity of each per-leg outbound queue
    pub session_channel_capacity: usize,
    /// Close calls with no caller frames for this long
    pub session_idle_timeout_seconds: Option<u64>,
    /// Maximum time a tool resolver may take
    pub tool_timeout_ms: u64,

    // Rate limiting configuration
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,

    // Connection limits
    /// Maximum concurrent WebSocket connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            tls: None,
            public_host: None,
            openai_api_key: Zeroizing::new(String::new()),
            realtime_url: crate::core::realtime::OPENAI_REALTIME_URL.to_string(),
            realtime_model: crate::core::realtime::OpenAIRealtimeModel::default()
                .as_str()
                .to_string(),
            realtime_voice: crate::core::realtime::OpenAIRealtimeVoice::default()
                .as_str()
                .to_string(),
            realtime_connect_timeout_ms: 10_000,
            assistant_instructions: DEFAULT_ASSISTANT_INSTRUCTIONS.to_string(),
            assistant_temperature: 0.6,
            assistant_greeting_trigger: DEFAULT_GREETING_TRIGGER.to_string(),
            call_greeting: DEFAULT_CALL_GREETING.to_string(),
            call_greeting_language: DEFAULT_CALL_GREETING_LANGUAGE.to_string(),
            session_channel_capacity: 256,
            session_idle_timeout_seconds: None,
            tool_timeout_ms: 5000,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_websocket_connections: None,
            max_connections_per_ip: 100,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// The .env file is loaded in main.rs before this is called, so its values
    /// appear here as ordinary environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = env::load_from_env()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After merging, the final configuration is validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;
        let mut config = env::load_from_env()?;
        yaml_config.apply_to(&mut config);
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Tool timeout as a `Duration`.
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    /// Idle timeout as a `Duration`, if configured.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.session_idle_timeout_seconds.map(Duration::from_secs)
    }

    /// Configuration for one AI leg, declaring `tools` to the backend.
    pub fn realtime_config(&self, tools: Vec<ToolDefinition>) -> RealtimeConfig {
        RealtimeConfig {
            api_key: self.openai_api_key.as_str().to_string(),
            url: self.realtime_url.clone(),
            model: self.realtime_model.clone(),
            voice: Some(self.realtime_voice.clone()),
            instructions: Some(self.assistant_instructions.clone()),
            temperature: Some(self.assistant_temperature),
            input_audio_format: Some("g711_ulaw".to_string()),
            output_audio_format: Some("g711_ulaw".to_string()),
            turn_detection: Some(TurnDetectionConfig::default()),
            tools: if tools.is_empty() { None } else { Some(tools) },
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
            connect_timeout_ms: Some(self.realtime_connect_timeout_ms),
        }
    }
}
