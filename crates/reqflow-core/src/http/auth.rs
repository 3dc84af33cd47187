//! Token injection for outgoing requests
//!
//! Supports several token sources:
//! - Static tokens
//! - Environment variables, read on every request
//! - Closures for tokens held elsewhere in the application

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::http::descriptor::take_header;

/// Default header carrying the access token
pub const DEFAULT_TOKEN_KEY: &str = "x-access-token";

/// Source of the current access token
pub trait TokenProvider: Send + Sync {
    /// The token to send, or `None`/empty when no session is active
    fn token(&self) -> Option<String>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// Fixed token
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.token.clone())
    }
}

/// Token read from an environment variable
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl TokenProvider for EnvToken {
    fn token(&self) -> Option<String> {
        std::env::var(&self.var).ok()
    }
}

/// Header key plus token source
#[derive(Clone)]
pub struct TokenConfig {
    pub key: String,
    pub provider: Arc<dyn TokenProvider>,
}

impl TokenConfig {
    pub fn new(key: impl Into<String>, provider: impl TokenProvider + 'static) -> Self {
        Self {
            key: key.into(),
            provider: Arc::new(provider),
        }
    }

    /// Write the token header, or remove a stale one when no token is available
    pub fn apply(&self, headers: &mut BTreeMap<String, String>) {
        if self.key.is_empty() {
            return;
        }

        take_header(headers, &self.key);
        match self.provider.token().filter(|t| !t.is_empty()) {
            Some(token) => {
                headers.insert(self.key.clone(), token);
            }
            None => tracing::debug!(header = %self.key, "no token available, header removed"),
        }
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig").field("key", &self.key).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_token_is_applied() {
        let config = TokenConfig::new(DEFAULT_TOKEN_KEY, StaticToken::new("abc"));
        let mut headers = BTreeMap::new();
        config.apply(&mut headers);
        assert_eq!(headers.get(DEFAULT_TOKEN_KEY).map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_empty_token_removes_stale_header() {
        let config = TokenConfig::new("Authorization", || Some(String::new()));
        let mut headers = BTreeMap::from([("authorization".to_string(), "old".to_string())]);
        config.apply(&mut headers);
        assert!(headers.is_empty());
    }

    #[test]
    fn test_env_token() {
        // Save original env var value for restoration
        let original = std::env::var("REQFLOW_TEST_TOKEN").ok();

        std::env::set_var("REQFLOW_TEST_TOKEN", "env-token-1");
        let config = TokenConfig::new("x-token", EnvToken::new("REQFLOW_TEST_TOKEN"));
        let mut headers = BTreeMap::new();
        config.apply(&mut headers);
        assert_eq!(headers.get("x-token").map(String::as_str), Some("env-token-1"));

        match original {
            Some(value) => std::env::set_var("REQFLOW_TEST_TOKEN", value),
            None => std::env::remove_var("REQFLOW_TEST_TOKEN"),
        }
    }
}
