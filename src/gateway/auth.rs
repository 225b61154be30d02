use std::collections::HashMap;

use anyhow::{Result, bail};
use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

/// The authenticated caller behind a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub uid: String,
}

/// Verifies identity tokens issued by the identity service.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// `None` when the token is unknown, expired or malformed.
    async fn verify(&self, token: &str) -> Option<Caller>;
}

/// Fixed token table, loaded from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, uid: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), uid.into());
        self
    }

    /// Parses `uid=token` pairs separated by commas.
    pub fn parse(table: &str) -> Result<Self> {
        let mut verifier = Self::new();
        for entry in table.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let Some((uid, token)) = entry.split_once('=') else {
                bail!("token entry `{entry}` is not uid=token");
            };
            let (uid, token) = (uid.trim(), token.trim());
            if uid.is_empty() || token.is_empty() {
                bail!("token entry `{entry}` has an empty uid or token");
            }
            verifier = verifier.with_token(uid, token);
        }
        Ok(verifier)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Option<Caller> {
        self.tokens.get(token).map(|uid| Caller { uid: uid.clone() })
    }
}

/// The token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn parses_token_table() {
        let verifier = StaticTokenVerifier::parse(" alice=tok-a, bob=tok-b ,").unwrap();
        assert_eq!(verifier.len(), 2);
        assert!(StaticTokenVerifier::parse("alice").is_err());
        assert!(StaticTokenVerifier::parse("=tok").is_err());
        assert!(StaticTokenVerifier::parse("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn verifies_known_tokens() {
        let verifier = StaticTokenVerifier::new().with_token("alice", "tok-a");
        assert_eq!(
            verifier.verify("tok-a").await,
            Some(Caller {
                uid: "alice".into()
            })
        );
        assert_eq!(verifier.verify("tok-b").await, None);
    }

    #[test]
    fn extracts_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-a"));
        assert_eq!(bearer_token(&headers), Some("tok-a"));
    }
}
