use serde::Deserialize;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use super::{ConfigError, ServerConfig, TlsConfig};

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3000
///   public_host: "hotline.example.com"
///   tls:
///     cert_path: "/etc/hotline/cert.pem"
///     key_path: "/etc/hotline/key.pem"
///
/// realtime:
///   api_key: "sk-..."
///   url: "wss://api.openai.com/v1/realtime"
///   model: "gpt-4o-realtime-preview-2024-10-01"
///   voice: "alloy"
///   connect_timeout_ms: 10000
///
/// assistant:
///   instructions: "Du bist ein hilfsbereiter Sprachassistent ..."
///   temperature: 0.6
///   greeting_trigger: "Hallo"
///
/// call:
///   greeting: "Viel Spaß beim Testen des Sprachassistenten!"
///   greeting_language: "de-DE"
///
/// session:
///   channel_capacity: 256
///   idle_timeout_seconds: 600
///   tool_timeout_ms: 5000
///
/// security:
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///   max_websocket_connections: 1000
///   max_connections_per_ip: 100
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub assistant: Option<AssistantYaml>,
    pub call: Option<CallYaml>,
    pub session: Option<SessionYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_host: Option<String>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// OpenAI Realtime connection from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub connect_timeout_ms: Option<u64>,
}

/// Assistant behaviour from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AssistantYaml {
    pub instructions: Option<String>,
    pub temperature: Option<f32>,
    pub greeting_trigger: Option<String>,
}

/// Call setup from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CallYaml {
    pub greeting: Option<String>,
    pub greeting_language: Option<String>,
}

/// Session tuning from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub channel_capacity: Option<usize>,
    pub idle_timeout_seconds: Option<u64>,
    pub tool_timeout_ms: Option<u64>,
}

/// Security settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Override `config` with every value present in the file.
    pub fn apply_to(self, config: &mut ServerConfig) {
        if let Some(server) = self.server {
            if let Some(host) = server.host {
                config.host = host;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
            if let Some(public_host) = server.public_host {
                config.public_host = Some(public_host);
            }
            if let Some(tls) = server.tls {
                if tls.enabled == Some(false) {
                    config.tls = None;
                } else if let (Some(cert), Some(key)) = (tls.cert_path, tls.key_path) {
                    config.tls = Some(TlsConfig {
                        cert_path: PathBuf::from(cert),
                        key_path: PathBuf::from(key),
                    });
                }
            }
        }

        if let Some(realtime) = self.realtime {
            if let Some(api_key) = realtime.api_key.filter(|k| !k.trim().is_empty()) {
                config.openai_api_key = Zeroizing::new(api_key);
            }
            if let Some(url) = realtime.url {
                config.realtime_url = url;
            }
            if let Some(model) = realtime.model {
                config.realtime_model = model;
            }
            if let Some(voice) = realtime.voice {
                config.realtime_voice = voice;
            }
            if let Some(timeout) = realtime.connect_timeout_ms {
                config.realtime_connect_timeout_ms = timeout;
            }
        }

        if let Some(assistant) = self.assistant {
            if let Some(instructions) = assistant.instructions {
                config.assistant_instructions = instructions;
            }
            if let Some(temperature) = assistant.temperature {
                config.assistant_temperature = temperature;
            }
            if let Some(trigger) = assistant.greeting_trigger {
                config.assistant_greeting_trigger = trigger;
            }
        }

        if let Some(call) = self.call {
            if let Some(greeting) = call.greeting {
                config.call_greeting = greeting;
            }
            if let Some(language) = call.greeting_language {
                config.call_greeting_language = language;
            }
        }

        if let Some(session) = self.session {
            if let Some(capacity) = session.channel_capacity {
                config.session_channel_capacity = capacity;
            }
            if session.idle_timeout_seconds.is_some() {
                config.session_idle_timeout_seconds = session.idle_timeout_seconds;
            }
            if let Some(timeout) = session.tool_timeout_ms {
                config.tool_timeout_ms = timeout;
            }
        }

        if let Some(security) = self.security {
            if let Some(rps) = security.rate_limit_requests_per_second {
                config.rate_limit_requests_per_second = rps;
            }
            if let Some(burst) = security.rate_limit_burst_size {
                config.rate_limit_burst_size = burst;
            }
            if security.max_websocket_connections.is_some() {
                config.max_websocket_connections = security.max_websocket_connections;
            }
            if let Some(per_ip) = security.max_connections_per_ip {
                config.max_connections_per_ip = per_ip;
            }
        }
    }
}
