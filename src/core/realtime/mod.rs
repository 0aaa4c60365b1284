//! Realtime conversational backend module (the AI leg of a call).
//!
//! # Architecture
//!
//! - `BaseRealtime` trait for provider abstraction
//! - `RealtimeFactory` so the session manager can open one leg per call
//! - Inbound events are delivered over a bounded channel as [`RealtimeEvent`]s
//!
//! # Supported Providers
//!
//! - **OpenAI Realtime API** - full duplex audio with GPT-4o
//!
//! # Example
//!
//! ```rust,ignore
//! use hotline_gateway::core::realtime::{create_realtime_provider, RealtimeConfig};
//! use tokio::sync::mpsc;
//!
//! let config = RealtimeConfig {
//!     api_key: "sk-...".to_string(),
//!     ..Default::default()
//! };
//!
//! let (tx, rx) = mpsc::channel(256);
//! let mut provider = create_realtime_provider("openai", config)?;
//! provider.connect(tx).await?;
//! ```

mod base;
pub mod openai;

pub use base::{
    BaseRealtime, BoxedRealtime, ConnectionState, FunctionCallRequest, FunctionDefinition,
    RealtimeConfig, RealtimeError, RealtimeEvent, RealtimeEventSender, RealtimeFactory,
    RealtimeResult, SharedRealtimeFactory, ToolDefinition, TurnDetectionConfig,
};
pub use openai::{
    OPENAI_REALTIME_URL, OpenAIRealtime, OpenAIRealtimeAudioFormat, OpenAIRealtimeFactory,
    OpenAIRealtimeModel, OpenAIRealtimeVoice,
};

/// Supported realtime providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeProvider {
    /// OpenAI Realtime API
    OpenAI,
}

impl RealtimeProvider {
    /// Parse provider from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(RealtimeProvider::OpenAI),
            _ => None,
        }
    }
}

impl std::fmt::Display for RealtimeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RealtimeProvider::OpenAI => write!(f, "openai"),
        }
    }
}

/// Factory function to create a realtime provider by name.
pub fn create_realtime_provider(
    provider_type: &str,
    config: RealtimeConfig,
) -> RealtimeResult<BoxedRealtime> {
    match RealtimeProvider::parse(provider_type) {
        Some(RealtimeProvider::OpenAI) => OpenAIRealtimeFactory.create(config),
        None => Err(RealtimeError::InvalidConfiguration(format!(
            "Unsupported realtime provider '{}'. Supported providers: {}",
            provider_type,
            get_supported_realtime_providers().join(", ")
        ))),
    }
}

/// Get list of supported realtime providers.
pub fn get_supported_realtime_providers() -> Vec<&'static str> {
    vec!["openai"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_realtime_provider_case_insensitive() {
        let config = RealtimeConfig {
            api_key: "test_key".to_string(),
            ..Default::default()
        };

        assert!(create_realtime_provider("openai", config.clone()).is_ok());
        assert!(create_realtime_provider("OPENAI", config.clone()).is_ok());
        assert!(create_realtime_provider("OpenAI", config).is_ok());
    }

    #[test]
    fn test_get_supported_providers() {
        assert_eq!(get_supported_realtime_providers(), vec!["openai"]);
    }

    #[test]
    fn test_provider_parse_and_display() {
        assert_eq!(
            RealtimeProvider::parse("OPENAI"),
            Some(RealtimeProvider::OpenAI)
        );
        assert_eq!(RealtimeProvider::parse("hume"), None);
        assert_eq!(RealtimeProvider::OpenAI.to_string(), "openai");
    }

    #[test]
    fn test_invalid_provider_error_message() {
        let result = create_realtime_provider("invalid_provider", RealtimeConfig::default());

        match result {
            Err(RealtimeError::InvalidConfiguration(msg)) => {
                assert!(msg.contains("invalid_provider"));
                assert!(msg.contains("openai"));
            }
            _ => panic!("Expected InvalidConfiguration error"),
        }
    }
}
