//! The single owner of profile state.
//!
//! Every read goes straight to the state directory so that changes made by
//! other processes are visible immediately. Every write publishes an
//! [`AuthEvent`] to in-process subscribers.

use std::sync::mpsc::Sender;

use tracing::{debug, warn};

use crate::error::Result;
use crate::events::{AuthEvent, Notifier};
use crate::storage::{
    simulated_key, Config, CredentialsFile, StateStore, TokenPair,
};

pub const API_KEY_ENV: &str = "GOOGLE_SHEETS_API_KEY";
pub const SPREADSHEET_ID_ENV: &str = "SPREADSHEET_ID";
pub const CLIENT_ID_ENV: &str = "GOOGLE_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "GOOGLE_CLIENT_SECRET";

/// Deploy-time defaults, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct EnvDefaults {
    pub api_key: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl EnvDefaults {
    pub fn from_env() -> Self {
        fn var(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|v| !v.trim().is_empty())
        }

        Self {
            api_key: var(API_KEY_ENV),
            spreadsheet_id: var(SPREADSHEET_ID_ENV),
            client_id: var(CLIENT_ID_ENV),
            client_secret: var(CLIENT_SECRET_ENV),
        }
    }
}

pub struct AuthState {
    store: StateStore,
    env: EnvDefaults,
    notifier: Notifier,
}

impl AuthState {
    pub fn new(store: StateStore, env: EnvDefaults) -> Self {
        Self {
            store,
            env,
            notifier: Notifier::default(),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn env(&self) -> &EnvDefaults {
        &self.env
    }

    pub fn subscribe_with(&self, tx: Sender<AuthEvent>) {
        self.notifier.subscribe_with(tx);
    }

    // -- Reads (never fail; a broken file reads as empty) ---------------------

    pub fn config(&self) -> Config {
        self.store.load_config().unwrap_or_else(|e| {
            warn!(error = %e, "config.toml is unreadable, using defaults");
            Config::default()
        })
    }

    pub fn secrets(&self) -> CredentialsFile {
        self.store.load_credentials().unwrap_or_else(|e| {
            warn!(error = %e, "credentials.json is unreadable, treating as empty");
            CredentialsFile::default()
        })
    }

    pub fn token_pair(&self) -> Option<TokenPair> {
        self.secrets().tokens
    }

    pub fn simulated_rows(&self, range: &str) -> Vec<Vec<String>> {
        let key = simulated_key(range);
        match self.store.load_simulated() {
            Ok(mut log) => log.ranges.remove(&key).unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "simulated.json is unreadable");
                Vec::new()
            }
        }
    }

    // -- Mutations ------------------------------------------------------------

    /// `None` leaves a field untouched; an empty string removes its override.
    pub fn set_credential_overrides(
        &self,
        api_key: Option<&str>,
        spreadsheet_id: Option<&str>,
    ) -> Result<()> {
        if let Some(key) = api_key {
            self.store
                .update_credentials(|c| c.api_key = non_empty(key))?;
        }
        if let Some(id) = spreadsheet_id {
            self.store
                .update_config(|c| c.spreadsheet_id = non_empty(id))?;
        }
        self.publish(AuthEvent::CredentialsChanged);
        Ok(())
    }

    pub fn clear_credential_overrides(&self) -> Result<()> {
        self.store.update_credentials(|c| c.api_key = None)?;
        self.store.update_config(|c| c.spreadsheet_id = None)?;
        self.publish(AuthEvent::CredentialsChanged);
        Ok(())
    }

    /// Turn OAuth on. Empty values leave the environment defaults in effect.
    pub fn save_oauth_settings(
        &self,
        client_id: &str,
        client_secret: &str,
        scopes: Vec<String>,
    ) -> Result<()> {
        self.store.update_config(|c| {
            c.oauth.configured = true;
            c.oauth.client_id = non_empty(client_id);
            c.oauth.scopes = scopes;
        })?;
        self.store
            .update_credentials(|c| c.client_secret = non_empty(client_secret))?;
        self.publish(AuthEvent::OAuthConfigChanged);
        Ok(())
    }

    pub fn clear_oauth_settings(&self) -> Result<()> {
        self.store.update_config(|c| c.oauth = Default::default())?;
        self.store.update_credentials(|c| c.client_secret = None)?;
        self.publish(AuthEvent::OAuthConfigChanged);
        Ok(())
    }

    pub fn store_token_pair(&self, pair: TokenPair) -> Result<()> {
        self.store.update_credentials(|c| c.tokens = Some(pair))?;
        self.publish(AuthEvent::TokensChanged);
        Ok(())
    }

    pub fn clear_token_pair(&self) -> Result<()> {
        self.store.update_credentials(|c| c.tokens = None)?;
        self.publish(AuthEvent::LoggedOut);
        Ok(())
    }

    pub fn append_simulated(&self, range: &str, rows: &[Vec<String>]) -> Result<usize> {
        let key = simulated_key(range);
        let total = self.store.update_simulated(|log| {
            let held = log.ranges.entry(key.clone()).or_default();
            held.extend(rows.iter().cloned());
            held.len()
        })?;
        self.publish(AuthEvent::SimulatedAppend {
            key,
            rows: rows.len(),
        });
        Ok(total)
    }

    /// Settle a replay of the first `replayed` rows held for `range`.
    /// Those rows are replaced by `kept`; rows appended after the replay
    /// started stay behind them. Returns how many rows remain.
    pub fn settle_simulated(
        &self,
        range: &str,
        replayed: usize,
        kept: Vec<Vec<String>>,
    ) -> Result<usize> {
        let key = simulated_key(range);
        let remaining = self.store.update_simulated(|log| {
            let held = log.ranges.remove(&key).unwrap_or_default();
            let later = held.into_iter().skip(replayed);
            let rows: Vec<Vec<String>> = kept.into_iter().chain(later).collect();
            let remaining = rows.len();
            if !rows.is_empty() {
                log.ranges.insert(key.clone(), rows);
            }
            remaining
        })?;
        self.publish(AuthEvent::SimulatedSynced {
            key,
            remaining,
        });
        Ok(remaining)
    }

    fn publish(&self, event: AuthEvent) {
        debug!(?event, "auth state changed");
        self.notifier.publish(event);
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
