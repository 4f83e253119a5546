use std::fmt;

use super::credentials::{resolve_credentials, resolve_oauth_config};
use crate::state::AuthState;

/// Prefix every Google API key starts with.
pub const API_KEY_PREFIX: &str = "AIza";

/// Effective access level. Recomputed on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    None,
    /// Read-only access through a static API key.
    ApiKey,
    /// Read/write access through an OAuth bearer token.
    OAuth2,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthMode::None => "none",
            AuthMode::ApiKey => "api_key",
            AuthMode::OAuth2 => "oauth2",
        })
    }
}

pub fn looks_like_api_key(key: &str) -> bool {
    key.starts_with(API_KEY_PREFIX) && key.len() > API_KEY_PREFIX.len()
}

/// OAuth (configured and holding an access token) beats an API key.
pub fn classify(state: &AuthState) -> AuthMode {
    let has_access_token = state
        .token_pair()
        .is_some_and(|pair| !pair.access_token.is_empty());
    if has_access_token && resolve_oauth_config(state).is_configured() {
        return AuthMode::OAuth2;
    }

    if looks_like_api_key(&resolve_credentials(state).api_key) {
        return AuthMode::ApiKey;
    }

    AuthMode::None
}

pub fn has_full_access(state: &AuthState) -> bool {
    classify(state) == AuthMode::OAuth2
}
