//! Which API key, spreadsheet and OAuth client are active right now.
//!
//! Each field resolves independently: the local override wins, the
//! environment default is the fallback, and anything else is empty.

use crate::state::AuthState;
use crate::storage::DEFAULT_SCOPES;

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Override,
    Environment,
    Unset,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Source::Override => "local override",
            Source::Environment => "environment",
            Source::Unset => "not set",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSet {
    pub api_key: String,
    pub spreadsheet_id: String,
    pub api_key_source: Source,
    pub spreadsheet_id_source: Source,
}

/// Client pair plus scopes. The redirect URI is not part of this; it is
/// chosen per login from the callback server's origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    pub configured: bool,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Explicitly configured and both halves of the client pair present.
    pub fn is_configured(&self) -> bool {
        self.configured && !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

pub fn resolve_credentials(state: &AuthState) -> CredentialSet {
    let config = state.config();
    let secrets = state.secrets();
    let env = state.env();

    let (api_key, api_key_source) = pick(secrets.api_key, env.api_key.clone());
    let (spreadsheet_id, spreadsheet_id_source) =
        pick(config.spreadsheet_id, env.spreadsheet_id.clone());

    CredentialSet {
        api_key,
        spreadsheet_id,
        api_key_source,
        spreadsheet_id_source,
    }
}

pub fn has_credentials(state: &AuthState) -> bool {
    let creds = resolve_credentials(state);
    !creds.api_key.is_empty() && !creds.spreadsheet_id.is_empty()
}

pub fn resolve_oauth_config(state: &AuthState) -> OAuthConfig {
    let config = state.config();
    let secrets = state.secrets();
    let env = state.env();

    let (client_id, _) = pick(config.oauth.client_id, env.client_id.clone());
    let (client_secret, _) = pick(secrets.client_secret, env.client_secret.clone());
    let scopes = if config.oauth.scopes.is_empty() {
        DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
    } else {
        config.oauth.scopes
    };

    OAuthConfig {
        configured: config.oauth.configured,
        client_id,
        client_secret,
        scopes,
    }
}

fn pick(local: Option<String>, env: Option<String>) -> (String, Source) {
    match (local.filter(|v| !v.is_empty()), env.filter(|v| !v.is_empty())) {
        (Some(v), _) => (v, Source::Override),
        (None, Some(v)) => (v, Source::Environment),
        (None, None) => (String::new(), Source::Unset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EnvDefaults;
    use crate::testsupport::temp_state;

    fn env() -> EnvDefaults {
        EnvDefaults {
            api_key: Some("AIzaEnvKey".into()),
            spreadsheet_id: Some("env-sheet".into()),
            client_id: Some("env-client".into()),
            client_secret: Some("env-secret".into()),
        }
    }

    #[test]
    fn environment_fills_missing_fields() {
        let (_dir, state) = temp_state(env());
        let creds = resolve_credentials(&state);
        assert_eq!(creds.api_key, "AIzaEnvKey");
        assert_eq!(creds.spreadsheet_id, "env-sheet");
        assert_eq!(creds.api_key_source, Source::Environment);
        assert!(has_credentials(&state));
    }

    #[test]
    fn override_wins_per_field() {
        let (_dir, state) = temp_state(env());
        state
            .set_credential_overrides(None, Some("local-sheet"))
            .unwrap();

        let creds = resolve_credentials(&state);
        assert_eq!(creds.spreadsheet_id, "local-sheet");
        assert_eq!(creds.spreadsheet_id_source, Source::Override);
        assert_eq!(creds.api_key, "AIzaEnvKey");
        assert_eq!(creds.api_key_source, Source::Environment);

        state
            .set_credential_overrides(Some("AIzaLocalKey"), None)
            .unwrap();
        assert_eq!(resolve_credentials(&state).api_key, "AIzaLocalKey");
    }

    #[test]
    fn nothing_configured_resolves_to_empty() {
        let (_dir, state) = temp_state(EnvDefaults::default());
        let creds = resolve_credentials(&state);
        assert_eq!(creds.api_key, "");
        assert_eq!(creds.spreadsheet_id, "");
        assert_eq!(creds.api_key_source, Source::Unset);
        assert!(!has_credentials(&state));
    }

    #[test]
    fn key_without_spreadsheet_is_not_enough() {
        let (_dir, state) = temp_state(EnvDefaults::default());
        state.set_credential_overrides(Some("AIzaKey"), None).unwrap();
        assert!(!has_credentials(&state));
    }

    #[test]
    fn oauth_config_falls_back_to_environment_and_default_scopes() {
        let (_dir, state) = temp_state(env());
        let oauth = resolve_oauth_config(&state);
        assert_eq!(oauth.client_id, "env-client");
        assert_eq!(oauth.client_secret, "env-secret");
        assert_eq!(oauth.scopes.len(), DEFAULT_SCOPES.len());
        assert!(!oauth.is_configured());

        state
            .save_oauth_settings("local-client", "", vec!["scope-a".into()])
            .unwrap();
        let oauth = resolve_oauth_config(&state);
        assert_eq!(oauth.client_id, "local-client");
        assert_eq!(oauth.client_secret, "env-secret");
        assert_eq!(oauth.scopes, vec!["scope-a".to_string()]);
        assert!(oauth.is_configured());
    }

    #[test]
    fn environment_client_pair_needs_explicit_configure() {
        let (_dir, state) = temp_state(env());
        assert!(!resolve_oauth_config(&state).is_configured());

        state.save_oauth_settings("", "", Vec::new()).unwrap();
        let oauth = resolve_oauth_config(&state);
        assert_eq!(oauth.client_id, "env-client");
        assert!(oauth.is_configured());

        state.clear_oauth_settings().unwrap();
        let oauth = resolve_oauth_config(&state);
        assert_eq!(oauth.client_id, "env-client");
        assert!(!oauth.is_configured());
    }

    #[test]
    fn oauth_needs_both_halves() {
        let (_dir, state) = temp_state(EnvDefaults::default());
        state.save_oauth_settings("client", "", Vec::new()).unwrap();
        assert!(!resolve_oauth_config(&state).is_configured());
    }
}
