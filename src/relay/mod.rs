//! Streaming chat relay.
//!
//! A [`RelayClient`] turns a [`ChatRequest`](crate::types::ChatRequest) into a
//! [`RelaySession`] that talks to the provider directly (user-supplied key) or
//! through the gateway (identity token), decodes the `data: ` framed body and
//! yields [`StreamEvent`](crate::types::StreamEvent)s ending in exactly one
//! terminal event.
//!
//! # Architecture
//!
//! - `decoder` - line framing and frame decoding, tolerant of any chunking
//! - `adapter` - credential route selection and outbound request building
//! - `session` - per-request state machine, deadline and cancellation
//! - `client` - session factory and the spawned-task handle
//! - `credentials` - collaborator traits (identity token, direct key, connectivity)
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chatrelay::config::RelayConfig;
//! use chatrelay::relay::{KeySlot, RelayClient, StaticIdentity, callbacks};
//! use chatrelay::types::{ChatMessage, ChatRequest};
//!
//! # async fn example() -> Result<(), chatrelay::error::RelayError> {
//! let client = RelayClient::new(
//!     RelayConfig::from_env()?,
//!     Arc::new(StaticIdentity::new("id-token")),
//!     Arc::new(KeySlot::default()),
//! )?;
//! let request = ChatRequest::new(vec![ChatMessage::user("Hello!")])?;
//! let mut text = String::new();
//! client
//!     .send(request, &mut callbacks(|piece| text.push_str(piece), || {}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod adapter;
mod client;
mod credentials;
mod decoder;
mod session;

pub use adapter::{CredentialSource, OutboundRequest, ProviderAdapter, Route, select_route};
pub use client::{RelayClient, RelayHandle};
pub use credentials::{
    AlwaysOnline, Connectivity, DirectKeyProvider, IdentityTokenProvider, KeySlot, StaticIdentity,
};
pub use decoder::{BodyKind, FrameDecoder, decode_json_body};
pub use session::{FnSink, RelaySession, SessionControl, SessionState, StreamSink, callbacks};
