//! Environment variable loading.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use zeroize::Zeroizing;

use super::{ConfigError, ServerConfig, TlsConfig};

/// Read a variable, treating unset and blank values alike.
pub(super) fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse a variable.
pub(super) fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::invalid(key, format!("'{raw}': {e}"))),
        None => Ok(None),
    }
}

/// Build a configuration from environment variables, falling back to defaults.
///
/// The result is not validated; a missing API key is allowed here so a YAML
/// file can still supply it.
pub(super) fn load_from_env() -> Result<ServerConfig, ConfigError> {
    let defaults = ServerConfig::default();

    let tls = match (env_string("TLS_CERT_PATH"), env_string("TLS_KEY_PATH")) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        }),
        (None, None) => None,
        _ => {
            return Err(ConfigError::invalid(
                "TLS_CERT_PATH/TLS_KEY_PATH",
                "both paths must be set to enable TLS",
            ));
        }
    };

    Ok(ServerConfig {
        host: env_string("HOST").unwrap_or(defaults.host.clone()),
        port: env_parse("PORT")?.unwrap_or(defaults.port),
        tls,
        public_host: env_string("PUBLIC_HOST"),
        openai_api_key: Zeroizing::new(env_string("OPENAI_API_KEY").unwrap_or_default()),
        realtime_url: env_string("OPENAI_REALTIME_URL").unwrap_or(defaults.realtime_url.clone()),
        realtime_model: env_string("OPENAI_REALTIME_MODEL")
            .unwrap_or(defaults.realtime_model.clone()),
        realtime_voice: env_string("OPENAI_REALTIME_VOICE")
            .unwrap_or(defaults.realtime_voice.clone()),
        realtime_connect_timeout_ms: env_parse("OPENAI_REALTIME_CONNECT_TIMEOUT_MS")?
            .unwrap_or(defaults.realtime_connect_timeout_ms),
        assistant_instructions: env_string("ASSISTANT_INSTRUCTIONS")
            .unwrap_or(defaults.assistant_instructions.clone()),
        assistant_temperature: env_parse("ASSISTANT_TEMPERATURE")?
            .unwrap_or(defaults.assistant_temperature),
        assistant_greeting_trigger: env_string("ASSISTANT_GREETING_TRIGGER")
            .unwrap_or(defaults.assistant_greeting_trigger.clone()),
        call_greeting: env_string("CALL_GREETING").unwrap_or(defaults.call_greeting.clone()),
        call_greeting_language: env_string("CALL_GREETING_LANGUAGE")
            .unwrap_or(defaults.call_greeting_language.clone()),
        session_channel_capacity: env_parse("SESSION_CHANNEL_CAPACITY")?
            .unwrap_or(defaults.session_channel_capacity),
        session_idle_timeout_seconds: env_parse("SESSION_IDLE_TIMEOUT_SECONDS")?,
        tool_timeout_ms: env_parse("TOOL_TIMEOUT_MS")?.unwrap_or(defaults.tool_timeout_ms),
        rate_limit_requests_per_second: env_parse("RATE_LIMIT_REQUESTS_PER_SECOND")?
            .unwrap_or(defaults.rate_limit_requests_per_second),
        rate_limit_burst_size: env_parse("RATE_LIMIT_BURST_SIZE")?
            .unwrap_or(defaults.rate_limit_burst_size),
        max_websocket_connections: env_parse("MAX_WEBSOCKET_CONNECTIONS")?,
        max_connections_per_ip: env_parse("MAX_CONNECTIONS_PER_IP")?
            .unwrap_or(defaults.max_connections_per_ip),
    })
}
