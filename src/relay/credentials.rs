use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::RelayError;

/// Issues the caller's identity token for the gateway route.
#[async_trait]
pub trait IdentityTokenProvider: Send + Sync {
    /// `Ok(None)` means signed out. `force_refresh` bypasses any cached token.
    async fn identity_token(&self, force_refresh: bool) -> Result<Option<String>, RelayError>;
}

/// Reads the user's own provider key from local preferences.
pub trait DirectKeyProvider: Send + Sync {
    fn direct_api_key(&self) -> Option<String>;
}

pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// A fixed identity token, or none when signed out.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentity {
    token: Option<String>,
}

impl StaticIdentity {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn signed_out() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl IdentityTokenProvider for StaticIdentity {
    async fn identity_token(&self, _force_refresh: bool) -> Result<Option<String>, RelayError> {
        Ok(self.token.clone())
    }
}

/// In-memory key slot; blank values count as "no key".
#[derive(Debug, Default)]
pub struct KeySlot {
    key: RwLock<Option<String>>,
}

impl KeySlot {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: RwLock::new(normalize(key)),
        }
    }

    pub fn set(&self, key: Option<String>) {
        let mut slot = self.key.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = normalize(key);
    }
}

impl DirectKeyProvider for KeySlot {
    fn direct_api_key(&self) -> Option<String> {
        self.key
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

fn normalize(key: Option<String>) -> Option<String> {
    key.map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_slot_trims_and_clears() {
        let slot = KeySlot::new(Some("  sk-1 ".into()));
        assert_eq!(slot.direct_api_key().as_deref(), Some("sk-1"));
        slot.set(Some("   ".into()));
        assert_eq!(slot.direct_api_key(), None);
        slot.set(Some("sk-2".into()));
        assert_eq!(slot.direct_api_key().as_deref(), Some("sk-2"));
    }

    #[tokio::test]
    async fn static_identity() {
        let identity = StaticIdentity::new("tok");
        assert_eq!(
            identity.identity_token(false).await.unwrap().as_deref(),
            Some("tok")
        );
        assert_eq!(
            StaticIdentity::signed_out().identity_token(true).await.unwrap(),
            None
        );
    }
}
