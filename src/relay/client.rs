use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use reqwest::Client;
use tokio::sync::mpsc;

use super::adapter::{ProviderAdapter, Route, select_route};
use super::credentials::{AlwaysOnline, Connectivity, DirectKeyProvider, IdentityTokenProvider};
use super::session::{RelaySession, SessionControl, SessionState, StreamSink};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::types::{ChatRequest, StreamEvent};

const EVENT_CHANNEL_CAPACITY: usize = 32;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Entry point for sending chat requests.
///
/// Holds only read-only collaborators; every request gets an independent
/// [`RelaySession`] and nothing is shared between sessions.
pub struct RelayClient {
    http: Client,
    config: RelayConfig,
    adapter: ProviderAdapter,
    identity: Arc<dyn IdentityTokenProvider>,
    keys: Arc<dyn DirectKeyProvider>,
    connectivity: Arc<dyn Connectivity>,
}

impl RelayClient {
    pub fn new(
        config: RelayConfig,
        identity: Arc<dyn IdentityTokenProvider>,
        keys: Arc<dyn DirectKeyProvider>,
    ) -> Result<Self, RelayError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|err| RelayError::Configuration(format!("http client: {err}")))?;
        Ok(Self {
            http,
            adapter: ProviderAdapter::from_config(&config),
            config,
            identity,
            keys,
            connectivity: Arc::new(AlwaysOnline),
        })
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Creates a session, snapshotting the direct key now: a key changed
    /// afterwards only affects later sessions.
    pub fn session(&self, request: ChatRequest) -> RelaySession {
        let direct_key = self
            .keys
            .direct_api_key()
            .filter(|key| select_route(Some(key)) == Route::Direct);
        RelaySession::new(
            SESSION_COUNTER.fetch_add(1, Ordering::Relaxed),
            request,
            direct_key,
            self.adapter.clone(),
            self.http.clone(),
            self.identity.clone(),
            self.connectivity.clone(),
            self.config.timeout,
        )
    }

    pub async fn send<S: StreamSink + ?Sized>(
        &self,
        request: ChatRequest,
        sink: &mut S,
    ) -> Result<(), RelayError> {
        self.session(request).run(sink).await
    }

    /// Runs a session on its own task. Must be called inside a tokio runtime.
    pub fn spawn(&self, request: ChatRequest) -> RelayHandle {
        let session = self.session(request);
        let control = session.control();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let events = session.events();
            futures::pin_mut!(events);
            while let Some(event) = events.next().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        RelayHandle {
            events: rx,
            control,
        }
    }
}

/// Single-consumer view of a spawned session. Dropping it cancels the session.
pub struct RelayHandle {
    events: mpsc::Receiver<StreamEvent>,
    control: SessionControl,
}

impl RelayHandle {
    /// Next event; `None` after the terminal event or after cancellation.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) -> bool {
        self.control.cancel()
    }

    pub fn state(&self) -> SessionState {
        self.control.state()
    }

    pub fn control(&self) -> &SessionControl {
        &self.control
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.control.cancel();
    }
}
