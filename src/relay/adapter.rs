use std::fmt;

use reqwest::Client;
use reqwest::header::ACCEPT;

use crate::config::RelayConfig;
use crate::types::ChatRequest;
use crate::wire::CompletionBody;

const GATEWAY_STREAM_PATH: &str = "/chatStream";

/// The credential a single request is sent with.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// The user's own provider key; the provider is called directly.
    DirectKey { secret: String },
    /// The caller's identity token; the gateway holds the provider key.
    ManagedToken { bearer: String },
}

impl CredentialSource {
    pub fn route(&self) -> Route {
        match self {
            CredentialSource::DirectKey { .. } => Route::Direct,
            CredentialSource::ManagedToken { .. } => Route::Gateway,
        }
    }

    fn bearer(&self) -> &str {
        match self {
            CredentialSource::DirectKey { secret } => secret,
            CredentialSource::ManagedToken { bearer } => bearer,
        }
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::DirectKey { .. } => f.write_str("DirectKey { secret: <redacted> }"),
            CredentialSource::ManagedToken { .. } => {
                f.write_str("ManagedToken { bearer: <redacted> }")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Direct,
    Gateway,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Direct => "direct",
            Route::Gateway => "gateway",
        }
    }
}

/// Direct whenever a non-blank key is configured, gateway otherwise.
pub fn select_route(direct_key: Option<&str>) -> Route {
    match direct_key {
        Some(key) if !key.trim().is_empty() => Route::Direct,
        _ => Route::Gateway,
    }
}

/// A fully formed outbound call, ready to hand to `reqwest`.
#[derive(Debug)]
pub struct OutboundRequest<'a> {
    pub url: String,
    pub credential: &'a CredentialSource,
    pub body: CompletionBody<'a>,
}

impl OutboundRequest<'_> {
    pub fn route(&self) -> Route {
        self.credential.route()
    }

    pub fn into_builder(self, client: &Client) -> reqwest::RequestBuilder {
        client
            .post(&self.url)
            .header(ACCEPT, "text/event-stream")
            .bearer_auth(self.credential.bearer())
            .json(&self.body)
    }
}

/// Builds requests for the one upstream provider, either directly or via the gateway.
#[derive(Clone, Debug)]
pub struct ProviderAdapter {
    provider_url: String,
    gateway_stream_url: String,
}

impl ProviderAdapter {
    pub fn new(provider_url: impl Into<String>, gateway_base_url: &str) -> Self {
        Self {
            provider_url: provider_url.into(),
            gateway_stream_url: format!(
                "{}{GATEWAY_STREAM_PATH}",
                gateway_base_url.trim_end_matches('/')
            ),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.provider_url.clone(), &config.gateway_url)
    }

    pub fn url_for(&self, route: Route) -> &str {
        match route {
            Route::Direct => &self.provider_url,
            Route::Gateway => &self.gateway_stream_url,
        }
    }

    /// Both routes carry the same body; only the target and bearer differ.
    pub fn build<'a>(
        &self,
        request: &'a ChatRequest,
        credential: &'a CredentialSource,
    ) -> OutboundRequest<'a> {
        OutboundRequest {
            url: self.url_for(credential.route()).to_string(),
            credential,
            body: CompletionBody {
                model: request.model(),
                messages: request.messages(),
                stream: request.stream(),
                max_tokens: request.max_tokens(),
            },
        }
    }
}
