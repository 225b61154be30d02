use std::fmt;
use std::time::Duration;

use super::error::GatewayError;
use crate::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_PROVIDER_URL};
use crate::types::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};

/// Server-side settings. The provider secret lives only here.
#[derive(Clone)]
pub struct GatewayConfig {
    pub upstream_url: String,
    pub provider_secret: Option<String>,
    pub default_model: String,
    pub default_max_tokens: u32,
    pub connect_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_PROVIDER_URL.to_string(),
            provider_secret: None,
            default_model: DEFAULT_MODEL.to_string(),
            default_max_tokens: DEFAULT_MAX_TOKENS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl GatewayConfig {
    pub fn with_upstream_url(mut self, url: impl Into<String>) -> Self {
        self.upstream_url = url.into();
        self
    }

    pub fn with_provider_secret(mut self, secret: impl Into<String>) -> Self {
        self.provider_secret = Some(secret.into());
        self
    }

    /// The server-held key, or `FailedPrecondition` when the gateway was
    /// deployed without one.
    pub fn provider_secret(&self) -> Result<&str, GatewayError> {
        self.provider_secret
            .as_deref()
            .map(str::trim)
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| {
                GatewayError::FailedPrecondition("provider API key is not configured".into())
            })
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("upstream_url", &self.upstream_url)
            .field(
                "provider_secret",
                &self.provider_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("default_model", &self.default_model)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_secret_is_failed_precondition() {
        let config = GatewayConfig::default();
        assert!(matches!(
            config.provider_secret(),
            Err(GatewayError::FailedPrecondition(_))
        ));

        let config = GatewayConfig::default().with_provider_secret("  ");
        assert!(config.provider_secret().is_err());

        let config = GatewayConfig::default().with_provider_secret("sk-live");
        assert_eq!(config.provider_secret().unwrap(), "sk-live");
    }

    #[test]
    fn debug_hides_secret() {
        let config = GatewayConfig::default().with_provider_secret("sk-live");
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-live"));
        assert!(printed.contains("<redacted>"));
    }
}
