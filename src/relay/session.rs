use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_stream::stream;
use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::adapter::{CredentialSource, ProviderAdapter, Route};
use super::credentials::{Connectivity, IdentityTokenProvider};
use super::decoder::{BodyKind, FrameDecoder, decode_json_body};
use crate::error::{RelayError, upstream_error};
use crate::types::{ChatRequest, StreamEvent};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingCredential,
    AwaitingResponseHeaders,
    StreamingBody,
    Succeeded,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Receives a session's output in wire order.
///
/// `on_done` fires exactly once when the session reaches a terminal state
/// (success or failure); the result returned by [`RelaySession::run`] says
/// which. A cancelled session never calls either method again.
pub trait StreamSink: Send {
    fn on_chunk(&mut self, text: &str);
    fn on_done(&mut self);
}

pub struct FnSink<C, D> {
    on_chunk: C,
    on_done: D,
}

/// Builds a [`StreamSink`] from two closures.
pub fn callbacks<C, D>(on_chunk: C, on_done: D) -> FnSink<C, D>
where
    C: FnMut(&str) + Send,
    D: FnMut() + Send,
{
    FnSink { on_chunk, on_done }
}

impl<C, D> StreamSink for FnSink<C, D>
where
    C: FnMut(&str) + Send,
    D: FnMut() + Send,
{
    fn on_chunk(&mut self, text: &str) {
        (self.on_chunk)(text)
    }

    fn on_done(&mut self) {
        (self.on_done)()
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<SessionState>,
    terminal: AtomicBool,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: SessionState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
    }

    /// Moves between non-terminal states. Ignored once the terminal guard is
    /// claimed; the flag is read under the state lock so a racing cancel
    /// always writes last.
    fn advance(&self, next: SessionState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.is_terminal() {
            return false;
        }
        *state = next;
        true
    }

    fn is_terminal(&self) -> bool {
        self.terminal.load(Ordering::Acquire)
    }

    /// True for exactly one caller: whoever ends the session first.
    fn claim_terminal(&self) -> bool {
        self.terminal
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Cancels or observes a session from outside the task driving it.
#[derive(Clone, Debug)]
pub struct SessionControl {
    id: u64,
    cancel: CancellationToken,
    shared: Arc<Shared>,
}

impl SessionControl {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Closes the connection and silences the session. Returns `false` when
    /// the session already ended.
    pub fn cancel(&self) -> bool {
        if !self.shared.claim_terminal() {
            return false;
        }
        self.shared.set_state(SessionState::Cancelled);
        self.cancel.cancel();
        info!(session = self.id, "relay session cancelled");
        true
    }
}

/// One request/response exchange, from credential selection to the terminal event.
pub struct RelaySession {
    id: u64,
    request: ChatRequest,
    /// Snapshot taken when the session was created.
    direct_key: Option<String>,
    adapter: ProviderAdapter,
    http: Client,
    identity: Arc<dyn IdentityTokenProvider>,
    connectivity: Arc<dyn Connectivity>,
    timeout: Duration,
    cancel: CancellationToken,
    shared: Arc<Shared>,
}

impl RelaySession {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        id: u64,
        request: ChatRequest,
        direct_key: Option<String>,
        adapter: ProviderAdapter,
        http: Client,
        identity: Arc<dyn IdentityTokenProvider>,
        connectivity: Arc<dyn Connectivity>,
        timeout: Duration,
    ) -> Self {
        Self {
            id,
            request,
            direct_key,
            adapter,
            http,
            identity,
            connectivity,
            timeout,
            cancel: CancellationToken::new(),
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn route(&self) -> Route {
        if self.direct_key.is_some() {
            Route::Direct
        } else {
            Route::Gateway
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn control(&self) -> SessionControl {
        SessionControl {
            id: self.id,
            cancel: self.cancel.clone(),
            shared: self.shared.clone(),
        }
    }

    /// Drives the session into `sink` and resolves once it is terminal.
    pub async fn run<S: StreamSink + ?Sized>(self, sink: &mut S) -> Result<(), RelayError> {
        let events = self.events();
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            match event {
                StreamEvent::Chunk { text } => sink.on_chunk(&text),
                StreamEvent::Done => {
                    sink.on_done();
                    return Ok(());
                }
                StreamEvent::Error(err) => {
                    sink.on_done();
                    return Err(err);
                }
            }
        }
        Err(RelayError::Cancelled)
    }

    /// The session as a pull-based event sequence.
    ///
    /// The body is read only as fast as the consumer polls; dropping the
    /// stream drops the connection. Ends right after the terminal event, or
    /// silently on cancellation.
    pub fn events(self) -> impl Stream<Item = StreamEvent> + Send + 'static {
        stream! {
            if self.shared.is_terminal() {
                return;
            }
            let deadline = Instant::now() + self.timeout;
            debug!(session = self.id, route = self.route().as_str(), "relay session started");

            let response = match self.open(deadline).await {
                Ok(response) => response,
                Err(err) => {
                    if let Some(event) = self.emit(StreamEvent::Error(err)) {
                        yield event;
                    }
                    return;
                }
            };

            self.transition(SessionState::StreamingBody);
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok());

            if BodyKind::from_content_type(content_type) == BodyKind::Json {
                debug!(session = self.id, "response downgraded to a single json body");
                let events = match self.guarded(deadline, response.bytes()).await {
                    Ok(Ok(body)) => decode_json_body(&body),
                    Ok(Err(err)) => vec![StreamEvent::Error(err.into())],
                    Err(err) => vec![StreamEvent::Error(err)],
                };
                for event in events {
                    let terminal = event.is_terminal();
                    match self.emit(event) {
                        Some(event) => {
                            yield event;
                        }
                        None => return,
                    }
                    if terminal {
                        return;
                    }
                }
                return;
            }

            let mut decoder = FrameDecoder::new();
            let body = response.bytes_stream();
            futures::pin_mut!(body);
            loop {
                let events = match self.guarded(deadline, body.next()).await {
                    Ok(Some(Ok(bytes))) => decoder.push(&bytes),
                    Ok(Some(Err(err))) => vec![StreamEvent::Error(err.into())],
                    Ok(None) => decoder.finish(),
                    Err(err) => vec![StreamEvent::Error(err)],
                };
                for event in events {
                    let terminal = event.is_terminal();
                    match self.emit(event) {
                        Some(event) => {
                            yield event;
                        }
                        None => return,
                    }
                    if terminal {
                        return;
                    }
                }
            }
        }
    }

    async fn open(&self, deadline: Instant) -> Result<Response, RelayError> {
        if !self.connectivity.is_online() {
            return Err(RelayError::Network("no internet connection".to_string()));
        }

        self.transition(SessionState::AwaitingCredential);
        let credential = match &self.direct_key {
            Some(secret) => CredentialSource::DirectKey {
                secret: secret.clone(),
            },
            None => CredentialSource::ManagedToken {
                bearer: self.identity_token(deadline, false).await?,
            },
        };

        self.transition(SessionState::AwaitingResponseHeaders);
        let mut response = self.dispatch(deadline, &credential).await?;
        if response.status() == StatusCode::UNAUTHORIZED && credential.route() == Route::Gateway {
            debug!(session = self.id, "gateway rejected identity token, refreshing");
            let refreshed = CredentialSource::ManagedToken {
                bearer: self.identity_token(deadline, true).await?,
            };
            response = self.dispatch(deadline, &refreshed).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = self
                .guarded(deadline, response.text())
                .await?
                .unwrap_or_default();
            let err = upstream_error(status, &body);
            warn!(session = self.id, status = status.as_u16(), "relay request rejected");
            return Err(err);
        }
        Ok(response)
    }

    async fn identity_token(
        &self,
        deadline: Instant,
        force_refresh: bool,
    ) -> Result<String, RelayError> {
        let token = self
            .guarded(deadline, self.identity.identity_token(force_refresh))
            .await??;
        token
            .filter(|token| !token.trim().is_empty())
            .ok_or(RelayError::Unauthenticated)
    }

    async fn dispatch(
        &self,
        deadline: Instant,
        credential: &CredentialSource,
    ) -> Result<Response, RelayError> {
        let outbound = self.adapter.build(&self.request, credential);
        debug!(session = self.id, route = outbound.route().as_str(), url = %outbound.url, "dispatching");
        let response = self
            .guarded(deadline, outbound.into_builder(&self.http).send())
            .await??;
        Ok(response)
    }

    /// Races `fut` against cancellation and the session deadline.
    async fn guarded<F: Future>(&self, deadline: Instant, fut: F) -> Result<F::Output, RelayError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RelayError::Cancelled),
            result = timeout_at(deadline, fut) => result.map_err(|_| RelayError::Timeout),
        }
    }

    /// Passes an event through the terminal guard; `None` means the session
    /// already ended and nothing more may be delivered.
    fn emit(&self, event: StreamEvent) -> Option<StreamEvent> {
        if !event.is_terminal() {
            return (!self.shared.is_terminal()).then_some(event);
        }
        if !self.shared.claim_terminal() {
            return None;
        }
        match &event {
            StreamEvent::Error(err) => {
                self.settle(SessionState::Failed);
                warn!(session = self.id, error = %err, "relay session failed");
            }
            _ => {
                self.settle(SessionState::Succeeded);
                info!(session = self.id, "relay session finished");
            }
        }
        Some(event)
    }

    fn transition(&self, next: SessionState) {
        if self.shared.advance(next) {
            debug!(session = self.id, state = ?next, "relay session state");
        }
    }

    /// Terminal write, only after this session claimed the guard.
    fn settle(&self, next: SessionState) {
        debug!(session = self.id, state = ?next, "relay session state");
        self.shared.set_state(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_state_is_not_overwritten() {
        let shared = Shared::default();
        assert!(shared.advance(SessionState::AwaitingCredential));
        assert!(shared.claim_terminal());
        shared.set_state(SessionState::Cancelled);

        assert!(!shared.advance(SessionState::AwaitingResponseHeaders));
        assert!(!shared.advance(SessionState::StreamingBody));
        assert_eq!(shared.state(), SessionState::Cancelled);
        assert!(!shared.claim_terminal());
    }
}
