//! Server-side gateway: the trusted-credential hop.
//!
//! Callers without a provider key authenticate with an identity token; the
//! gateway re-issues their completion request with the server-held secret and
//! pipes the upstream event stream back to them.
//!
//! Routes:
//! - `POST /chat` - non-streaming, answers `{content, usage}`
//! - `POST /chatStream` - `text/event-stream`, upstream frames forwarded verbatim
//! - `GET /health`

mod auth;
mod config;
mod error;
mod forward;
mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderMap;
use axum::http::header::ACCEPT;
use axum::routing::{get, post};
use reqwest::{Client, RequestBuilder};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use auth::{Caller, StaticTokenVerifier, TokenVerifier, bearer_token};
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use forward::SseForwarder;
pub use handlers::{GatewayRequest, parse_request};

use crate::wire::CompletionBody;

#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub verifier: Arc<dyn TokenVerifier>,
    http: Client,
}

impl GatewayState {
    pub fn new(config: GatewayConfig, verifier: Arc<dyn TokenVerifier>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            verifier,
            http,
        })
    }

    /// Checks the bearer token before anything touches the upstream provider.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Caller, GatewayError> {
        let Some(token) = bearer_token(headers) else {
            warn!("rejected request without bearer token");
            return Err(GatewayError::Unauthenticated(
                "Missing or invalid Authorization header".into(),
            ));
        };
        match self.verifier.verify(token).await {
            Some(caller) => Ok(caller),
            None => {
                warn!("rejected request with unknown token");
                Err(GatewayError::Unauthenticated("Invalid token".into()))
            }
        }
    }

    fn upstream_request(&self, secret: &str, body: &CompletionBody<'_>) -> RequestBuilder {
        let request = self
            .http
            .post(&self.config.upstream_url)
            .bearer_auth(secret)
            .json(body);
        if body.stream {
            request.header(ACCEPT, "text/event-stream")
        } else {
            request
        }
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/chat", post(handlers::chat))
        .route("/chatStream", post(handlers::chat_stream))
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// Serves the gateway on an already-bound listener until the process stops.
pub async fn serve(listener: TcpListener, state: GatewayState) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, upstream = %state.config.upstream_url, "gateway listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
