use std::io;

use async_stream::stream;
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::GatewayState;
use super::error::GatewayError;
use super::forward::SseForwarder;
use crate::types::ChatMessage;
use crate::wire::{CompletionBody, CompletionResponse};

/// Caller payload for both chat routes: `{messages, stream?, model?, max_tokens?}`.
#[derive(Debug, Deserialize)]
pub struct GatewayRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

pub fn parse_request(body: &[u8]) -> Result<GatewayRequest, GatewayError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| GatewayError::InvalidArgument("Invalid JSON body".into()))?;
    let request: GatewayRequest = serde_json::from_value(value).map_err(|err| {
        GatewayError::InvalidArgument(format!("messages must be role/content objects: {err}"))
    })?;
    if request.messages.is_empty() {
        return Err(GatewayError::InvalidArgument(
            "messages array is required".into(),
        ));
    }
    Ok(request)
}

impl GatewayRequest {
    fn completion_body<'a>(&'a self, state: &'a GatewayState, stream: bool) -> CompletionBody<'a> {
        CompletionBody {
            model: self.model.as_deref().unwrap_or(&state.config.default_model),
            messages: &self.messages,
            stream,
            max_tokens: self.max_tokens.unwrap_or(state.config.default_max_tokens),
        }
    }
}

/// `POST /chat`: one upstream call with `stream: false`, answered as `{content, usage}`.
pub async fn chat(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    let caller = state.authenticate(&headers).await?;
    let request = parse_request(&body)?;
    let secret = state.config.provider_secret()?;

    info!(caller = %caller.uid, messages = request.messages.len(), "chat request");
    let response = state
        .upstream_request(secret, &request.completion_body(&state, false))
        .send()
        .await
        .map_err(|err| GatewayError::Internal(format!("upstream unreachable: {err}")))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        warn!(caller = %caller.uid, status = status.as_u16(), "upstream rejected chat request");
        return Err(GatewayError::Internal(format!(
            "upstream provider error: {} - {}",
            status.as_u16(),
            text
        )));
    }

    let completion: CompletionResponse = response
        .json()
        .await
        .map_err(|err| GatewayError::Internal(format!("unreadable upstream response: {err}")))?;
    Ok(Json(json!({
        "content": completion.first_content(),
        "usage": completion.usage,
    })))
}

/// `POST /chatStream`: pipes the upstream event stream through frame by frame.
pub async fn chat_stream(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let caller = state.authenticate(&headers).await?;
    let request = parse_request(&body)?;
    let secret = state.config.provider_secret()?;

    info!(caller = %caller.uid, messages = request.messages.len(), "chat stream request");
    let response = state
        .upstream_request(secret, &request.completion_body(&state, true))
        .send()
        .await
        .map_err(|err| GatewayError::Internal(format!("upstream unreachable: {err}")))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        warn!(caller = %caller.uid, status = status.as_u16(), "upstream rejected stream request");
        return Err(GatewayError::Upstream {
            status: status.as_u16(),
            body: text,
        });
    }

    let uid = caller.uid;
    let upstream = response.bytes_stream();
    let frames = stream! {
        let mut forwarder = SseForwarder::new();
        futures::pin_mut!(upstream);
        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in forwarder.push(&bytes) {
                        yield Ok::<Bytes, io::Error>(frame);
                    }
                    if forwarder.is_closed() {
                        info!(caller = %uid, "stream complete");
                        return;
                    }
                }
                Err(err) => {
                    warn!(caller = %uid, error = %err, "upstream stream broke");
                    yield Err(io::Error::other(err));
                    return;
                }
            }
        }
        if let Some(frame) = forwarder.finish() {
            yield Ok(frame);
        }
        info!(caller = %uid, "upstream closed without [DONE]");
    };

    let mut response = Body::from_stream(frames).into_response();
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    Ok(response)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
