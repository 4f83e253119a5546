use thiserror::Error;

/// Errors surfaced by the credential, OAuth and Sheets layers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no usable Sheets credentials: {0}")]
    CredentialMissing(&'static str),

    #[error("not authenticated with Google; run `sheetgate login` first")]
    NotAuthenticated,

    #[error("no refresh token available; run `sheetgate login` to re-authorize")]
    NoRefreshToken,

    #[error("OAuth client is not configured; run `sheetgate oauth configure` first")]
    OAuthNotConfigured,

    #[error("token exchange failed ({status}): {body}")]
    TokenExchange { status: u16, body: String },

    #[error("token refresh failed ({status}): {body}")]
    TokenRefresh { status: u16, body: String },

    #[error("token revocation failed ({status}): {body}")]
    Revocation { status: u16, body: String },

    #[error("Sheets request failed ({status}): {body}")]
    SheetsRequest { status: u16, body: String },

    #[error("could not open a browser window for Google authorization")]
    PopupBlocked,

    #[error("OAuth state mismatch, please try again")]
    StateMismatch,

    #[error("authorization failed: {0}")]
    AuthorizationDenied(String),

    #[error("callback server: {0}")]
    CallbackServer(String),

    #[error("could not determine config directory")]
    NoConfigDir,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
