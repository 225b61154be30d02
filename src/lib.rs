pub mod config;
pub mod conversation;
pub mod error;
pub mod relay;
pub mod types;
pub mod wire;

#[cfg(feature = "gateway")]
pub mod gateway;
