//! Google OAuth2 authorization-code client.
//!
//! This is the only component that writes the token pair. Everything that
//! needs a bearer token goes through [`OAuthClient::get_valid_access_token`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::credentials::{resolve_oauth_config, OAuthConfig};
use super::pkce::{random_token, PkceChallenge};
use crate::error::{Error, Result};
use crate::state::AuthState;
use crate::storage::TokenPair;

pub const CALLBACK_PATH: &str = "/oauth/callback";
pub const DEFAULT_CALLBACK_PORT: u16 = 8484;

/// Google's documented lifetime, used when a response leaves it out.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Consent screens that may still come back; older ones are forgotten.
const MAX_PENDING_AUTHORIZATIONS: usize = 8;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

fn default_expires_in() -> i64 {
    DEFAULT_EXPIRES_IN_SECS
}

impl TokenResponse {
    /// Build the stored pair. Google does not always rotate the refresh
    /// token, so a missing one keeps the previous value. `None` if
    /// `expires_in` does not give a representable expiry.
    fn into_pair(self, previous: Option<&TokenPair>, issued_at: DateTime<Utc>) -> Option<TokenPair> {
        let expires_at = Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))?;
        let refresh_token = self
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| previous.and_then(|p| p.refresh_token.clone()));
        let token_type = self
            .token_type
            .or_else(|| previous.map(|p| p.token_type.clone()))
            .unwrap_or_else(|| "Bearer".to_string());
        let scope = self
            .scope
            .or_else(|| previous.map(|p| p.scope.clone()))
            .unwrap_or_default();

        Some(TokenPair {
            access_token: self.access_token,
            refresh_token,
            token_type,
            scope,
            expires_at,
        })
    }
}

/// A consent-screen URL together with the `state` it was issued with.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
}

/// Token health without the token values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    pub expires_at: DateTime<Utc>,
    pub refresh_due: bool,
    pub has_refresh_token: bool,
    pub scope: String,
}

pub struct OAuthClient {
    state: Arc<AuthState>,
    http: Client,
    redirect_uri: String,
    // (anti-CSRF state, PKCE verifier) for consent screens still open, oldest first.
    pending: Mutex<VecDeque<(String, String)>>,
    refresh_lock: Mutex<()>,
}

impl OAuthClient {
    pub fn new(state: Arc<AuthState>) -> Self {
        Self {
            state,
            http: Client::new(),
            redirect_uri: format!("http://127.0.0.1:{}{}", DEFAULT_CALLBACK_PORT, CALLBACK_PATH),
            pending: Mutex::new(VecDeque::new()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_http(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    /// Must match the origin that will receive the callback.
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    // -- Configuration --------------------------------------------------------

    pub fn configure(&self, client_id: &str, client_secret: &str, scopes: Vec<String>) -> Result<()> {
        self.state.save_oauth_settings(client_id, client_secret, scopes)
    }

    /// Log out and forget the client pair.
    pub fn clear_configuration(&self) -> Result<()> {
        self.logout()?;
        self.state.clear_oauth_settings()
    }

    pub fn is_configured(&self) -> bool {
        resolve_oauth_config(&self.state).is_configured()
    }

    fn configured(&self) -> Result<OAuthConfig> {
        let config = resolve_oauth_config(&self.state);
        if !config.is_configured() {
            return Err(Error::OAuthNotConfigured);
        }
        Ok(config)
    }

    // -- Authorization --------------------------------------------------------

    pub fn build_authorization_url(&self) -> Result<AuthorizationRequest> {
        let config = self.configured()?;
        let endpoints = self.state.config().endpoints;
        let csrf = random_token(32);
        let pkce = PkceChallenge::generate();

        let mut url = Url::parse(&endpoints.auth_url)?;
        url.query_pairs_mut()
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &config.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent") // Force consent to get refresh_token
            .append_pair("state", &csrf)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256");

        let mut pending = self.pending();
        pending.push_back((csrf.clone(), pkce.verifier));
        while pending.len() > MAX_PENDING_AUTHORIZATIONS {
            pending.pop_front();
        }
        drop(pending);

        Ok(AuthorizationRequest { url, state: csrf })
    }

    /// Exchange a code delivered to the callback, checking its `state`.
    pub fn complete_authorization(&self, code: &str, state: &str) -> Result<TokenPair> {
        let verifier = self.take_pending(state).ok_or(Error::StateMismatch)?;
        self.exchange(code, Some(&verifier))
    }

    /// Exchange a code that was obtained without a PKCE challenge.
    pub fn exchange_code(&self, code: &str) -> Result<TokenPair> {
        self.exchange(code, None)
    }

    fn exchange(&self, code: &str, verifier: Option<&str>) -> Result<TokenPair> {
        let config = self.configured()?;
        let endpoints = self.state.config().endpoints;

        let mut form = vec![
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        if let Some(verifier) = verifier {
            form.push(("code_verifier", verifier));
        }

        let response = self.http.post(&endpoints.token_url).form(&form).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::TokenExchange {
                status: status.as_u16(),
                body,
            });
        }

        let pair = response
            .json::<TokenResponse>()?
            .into_pair(None, Utc::now())
            .ok_or_else(|| Error::TokenExchange {
                status: status.as_u16(),
                body: "expires_in is out of range".to_string(),
            })?;
        self.state.store_token_pair(pair.clone())?;
        info!(expires_at = %pair.expires_at, "authorization code exchanged");
        Ok(pair)
    }

    // -- Token lifecycle ------------------------------------------------------

    pub fn refresh(&self) -> Result<TokenPair> {
        let _guard = self.lock_refresh();
        let current = self.state.token_pair().ok_or(Error::NoRefreshToken)?;
        self.refresh_locked(&current)
    }

    /// Caller must hold `refresh_lock`.
    fn refresh_locked(&self, current: &TokenPair) -> Result<TokenPair> {
        let refresh_token = current
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(Error::NoRefreshToken)?;
        let config = self.configured()?;
        let endpoints = self.state.config().endpoints;

        let form = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self.http.post(&endpoints.token_url).form(&form).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::TokenRefresh {
                status: status.as_u16(),
                body,
            });
        }

        let pair = response
            .json::<TokenResponse>()?
            .into_pair(Some(current), Utc::now())
            .ok_or_else(|| Error::TokenRefresh {
                status: status.as_u16(),
                body: "expires_in is out of range".to_string(),
            })?;
        self.state.store_token_pair(pair.clone())?;
        info!(expires_at = %pair.expires_at, "access token refreshed");
        Ok(pair)
    }

    /// The access token, refreshed first if it is inside the grace window.
    pub fn get_valid_access_token(&self) -> Result<String> {
        let pair = self.state.token_pair().ok_or(Error::NotAuthenticated)?;
        if pair.is_usable_at(Utc::now()) {
            return Ok(pair.access_token);
        }

        let _guard = self.lock_refresh();
        // A concurrent caller may have refreshed while we waited for the lock.
        let pair = self.state.token_pair().ok_or(Error::NotAuthenticated)?;
        if pair.is_usable_at(Utc::now()) {
            return Ok(pair.access_token);
        }

        debug!(expires_at = %pair.expires_at, "access token is inside the grace window");
        Ok(self.refresh_locked(&pair)?.access_token)
    }

    /// An access token is held. Says nothing about expiry.
    pub fn is_authenticated(&self) -> bool {
        self.state
            .token_pair()
            .is_some_and(|pair| !pair.access_token.is_empty())
    }

    pub fn token_status(&self) -> Option<TokenStatus> {
        self.state.token_pair().map(|pair| TokenStatus {
            expires_at: pair.expires_at,
            refresh_due: !pair.is_usable_at(Utc::now()),
            has_refresh_token: pair.has_refresh_token(),
            scope: pair.scope,
        })
    }

    /// Revoke at Google if possible, then always drop the local pair.
    pub fn logout(&self) -> Result<()> {
        if let Some(pair) = self.state.token_pair() {
            if let Err(e) = self.revoke(&pair.access_token) {
                warn!(error = %e, "token revocation failed, clearing local tokens anyway");
            }
        }
        self.state.clear_token_pair()
    }

    fn revoke(&self, token: &str) -> Result<()> {
        let endpoints = self.state.config().endpoints;
        let response = self
            .http
            .post(&endpoints.revoke_url)
            .form(&[("token", token)])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Revocation {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Remove and return the verifier issued with `state`.
    fn take_pending(&self, state: &str) -> Option<String> {
        let mut pending = self.pending();
        let index = pending.iter().position(|(issued, _)| issued == state)?;
        pending.remove(index).map(|(_, verifier)| verifier)
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<(String, String)>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh_lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}
