use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::RelayError;
use crate::types::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};

pub const DEFAULT_PROVIDER_URL: &str = "https://api.deepseek.com/v1/chat/completions";
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(55);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(25);

/// Client-side relay settings.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Upstream completions endpoint used with a direct key.
    pub provider_url: String,
    /// Gateway base URL; `/chatStream` is appended.
    pub gateway_url: String,
    pub model: String,
    pub max_tokens: u32,
    /// Deadline for a whole session, headers and body included.
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, RelayError> {
        let defaults = Self::default();
        Ok(Self {
            provider_url: env::var("RELAY_PROVIDER_URL").unwrap_or(defaults.provider_url),
            gateway_url: env::var("RELAY_GATEWAY_URL").unwrap_or(defaults.gateway_url),
            model: env::var("RELAY_MODEL").unwrap_or(defaults.model),
            max_tokens: parse_env("RELAY_MAX_TOKENS")?.unwrap_or(defaults.max_tokens),
            timeout: parse_env("RELAY_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            connect_timeout: parse_env("RELAY_CONNECT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
        })
    }

    pub fn with_provider_url(mut self, url: impl Into<String>) -> Self {
        self.provider_url = url.into();
        self
    }

    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, RelayError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RelayError::Configuration(format!("{key} is not a valid number: {raw}"))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_mobile_budget() {
        let config = RelayConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(55));
        assert_eq!(config.model, "deepseek-chat");
        assert_eq!(config.max_tokens, 4096);
    }

    #[test]
    fn builders_override() {
        let config = RelayConfig::default()
            .with_provider_url("http://provider")
            .with_gateway_url("http://gateway")
            .with_timeout(Duration::from_millis(10));
        assert_eq!(config.provider_url, "http://provider");
        assert_eq!(config.gateway_url, "http://gateway");
        assert_eq!(config.timeout, Duration::from_millis(10));
    }
}
