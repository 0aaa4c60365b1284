//! Configuration validation logic.

use super::{ConfigError, ServerConfig};

/// Temperatures accepted by the realtime backend.
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.6..=1.2;

/// Validate a fully merged configuration.
pub fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.openai_api_key.trim().is_empty() {
        return Err(ConfigError::MissingApiKey);
    }

    if !TEMPERATURE_RANGE.contains(&config.assistant_temperature) {
        return Err(ConfigError::invalid(
            "ASSISTANT_TEMPERATURE",
            format!(
                "{} is outside {}..={}",
                config.assistant_temperature,
                TEMPERATURE_RANGE.start(),
                TEMPERATURE_RANGE.end()
            ),
        ));
    }

    if config.session_channel_capacity == 0 {
        return Err(ConfigError::invalid(
            "SESSION_CHANNEL_CAPACITY",
            "must be greater than zero",
        ));
    }

    if config.tool_timeout_ms == 0 {
        return Err(ConfigError::invalid(
            "TOOL_TIMEOUT_MS",
            "must be greater than zero",
        ));
    }

    if config.realtime_connect_timeout_ms == 0 {
        return Err(ConfigError::invalid(
            "OPENAI_REALTIME_CONNECT_TIMEOUT_MS",
            "must be greater than zero",
        ));
    }

    if config.session_idle_timeout_seconds == Some(0) {
        return Err(ConfigError::invalid(
            "SESSION_IDLE_TIMEOUT_SECONDS",
            "must be greater than zero when set",
        ));
    }

    if config.rate_limit_requests_per_second == 0 || config.rate_limit_burst_size == 0 {
        return Err(ConfigError::invalid(
            "RATE_LIMIT_REQUESTS_PER_SECOND/RATE_LIMIT_BURST_SIZE",
            "must be greater than zero",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroize::Zeroizing;

    fn valid() -> ServerConfig {
        ServerConfig {
            openai_api_key: Zeroizing::new("sk-test".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid()).is_ok());
    }

    #[test]
    fn test_missing_api_key() {
        let config = ServerConfig::default();
        assert!(matches!(validate(&config), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn test_temperature_bounds() {
        for ok in [0.6, 0.8, 1.2] {
            let config = ServerConfig {
                assistant_temperature: ok,
                ..valid()
            };
            assert!(validate(&config).is_ok(), "{ok} should be accepted");
        }
        for bad in [0.0, 0.59, 1.21, 2.0] {
            let config = ServerConfig {
                assistant_temperature: bad,
                ..valid()
            };
            assert!(validate(&config).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = ServerConfig {
            session_channel_capacity: 0,
            ..valid()
        };
        assert!(validate(&config).is_err());

        let config = ServerConfig {
            tool_timeout_ms: 0,
            ..valid()
        };
        assert!(validate(&config).is_err());

        let config = ServerConfig {
            realtime_connect_timeout_ms: 0,
            ..valid()
        };
        assert!(validate(&config).is_err());

        let config = ServerConfig {
            session_idle_timeout_seconds: Some(0),
            ..valid()
        };
        assert!(validate(&config).is_err());

        let config = ServerConfig {
            rate_limit_burst_size: 0,
            ..valid()
        };
        assert!(validate(&config).is_err());
    }
}
