use std::time::Duration;

use clap::Parser;

use chatrelay::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_PROVIDER_URL};
use chatrelay::gateway::GatewayConfig;
use chatrelay::types::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};

#[derive(Parser)]
#[command(name = "relay-gateway", about = "Trusted-credential chat completion gateway")]
pub(crate) struct Cli {
    #[arg(long, env = "GATEWAY_HOST", default_value = "127.0.0.1")]
    pub(crate) host: String,
    #[arg(long, env = "GATEWAY_PORT", default_value_t = 8080)]
    pub(crate) port: u16,
    #[arg(long, env = "UPSTREAM_URL", default_value = DEFAULT_PROVIDER_URL)]
    pub(crate) upstream_url: String,
    #[arg(long, env = "PROVIDER_API_KEY", hide_env_values = true)]
    pub(crate) provider_api_key: Option<String>,
    #[arg(long, env = "GATEWAY_MODEL", default_value = DEFAULT_MODEL)]
    pub(crate) model: String,
    #[arg(long, env = "GATEWAY_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub(crate) max_tokens: u32,
    #[arg(long, env = "GATEWAY_CONNECT_TIMEOUT_SECS", default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs())]
    pub(crate) connect_timeout_secs: u64,
    /// Accepted identity tokens as `uid=token,uid=token`.
    #[arg(long, env = "GATEWAY_TOKENS", default_value = "", hide_env_values = true)]
    pub(crate) tokens: String,
}

impl Cli {
    pub(crate) fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            upstream_url: self.upstream_url.clone(),
            provider_secret: self.provider_api_key.clone(),
            default_model: self.model.clone(),
            default_max_tokens: self.max_tokens,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    pub(crate) fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
