use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this long before Google says they are.
pub const EXPIRY_GRACE_SECS: i64 = 5 * 60;

pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.file",
];

/// Top-level config file (no secrets). Stored as config.toml.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Local override for the spreadsheet id.
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub oauth: OAuthSettings,
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub ranges: SheetRanges,
}

/// Non-secret half of the OAuth client configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct OAuthSettings {
    /// Set by `oauth configure`, cleared by `oauth clear`. Environment
    /// defaults alone never turn OAuth on.
    #[serde(default)]
    pub configured: bool,
    pub client_id: Option<String>,
    /// Empty means the default Sheets + Drive file scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Remote endpoints. Overridable so the client can talk to a test double.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: String,
    pub sheets_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            revoke_url: "https://oauth2.googleapis.com/revoke".to_string(),
            sheets_base: "https://sheets.googleapis.com/v4/spreadsheets".to_string(),
        }
    }
}

/// A1 ranges of the tabs in the HR spreadsheet template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetRanges {
    pub employees: String,
    pub attendance: String,
    pub payroll: String,
    pub contributions: String,
    pub utang: String,
}

impl Default for SheetRanges {
    fn default() -> Self {
        Self {
            employees: "Employees Masterlist!A:H".to_string(),
            attendance: "Attendance Log!A:H".to_string(),
            payroll: "Payroll Records!A:M".to_string(),
            contributions: "Government Contributions!A:F".to_string(),
            utang: "Utang Tracker!A:F".to_string(),
        }
    }
}

/// Secrets file. Stored as credentials.json with 0600 perms.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CredentialsFile {
    /// Local override for the Sheets API key.
    pub api_key: Option<String>,
    pub client_secret: Option<String>,
    pub tokens: Option<TokenPair>,
}

/// The live OAuth access/refresh token bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenPair {
    /// True while `now` is before the start of the grace window.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - Duration::seconds(EXPIRY_GRACE_SECS)
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Rows that could not be written to Sheets, keyed by sanitized range name.
/// Stored as simulated.json.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SimulatedLog {
    #[serde(default)]
    pub ranges: HashMap<String, Vec<Vec<String>>>,
}

/// Storage key for a range in the simulated log.
pub fn simulated_key(range: &str) -> String {
    let sanitized: String = range
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("sheets_data_{}", sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_expiring_in(secs: i64) -> TokenPair {
        TokenPair {
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            token_type: "Bearer".into(),
            scope: String::new(),
            expires_at: Utc::now() + Duration::seconds(secs),
        }
    }

    #[test]
    fn token_inside_grace_window_is_not_usable() {
        let now = Utc::now();
        assert!(!pair_expiring_in(60).is_usable_at(now));
        assert!(!pair_expiring_in(EXPIRY_GRACE_SECS - 1).is_usable_at(now));
        assert!(pair_expiring_in(EXPIRY_GRACE_SECS + 60).is_usable_at(now));
    }

    #[test]
    fn empty_refresh_token_counts_as_missing() {
        let mut pair = pair_expiring_in(3600);
        assert!(pair.has_refresh_token());
        pair.refresh_token = Some(String::new());
        assert!(!pair.has_refresh_token());
        pair.refresh_token = None;
        assert!(!pair.has_refresh_token());
    }

    #[test]
    fn simulated_key_replaces_non_alphanumerics() {
        assert_eq!(
            simulated_key("Attendance Log!A:H"),
            "sheets_data_Attendance_Log_A_H"
        );
        assert_eq!(simulated_key("Sheet1"), "sheets_data_Sheet1");
    }

    #[test]
    fn config_defaults_apply_to_missing_sections() {
        let config: Config = toml::from_str("spreadsheet_id = \"abc\"\n").unwrap();
        assert_eq!(config.spreadsheet_id.as_deref(), Some("abc"));
        assert_eq!(config.ranges.payroll, "Payroll Records!A:M");
        assert_eq!(config.endpoints.token_url, "https://oauth2.googleapis.com/token");
        assert!(config.oauth.client_id.is_none());
    }

    #[test]
    fn partial_endpoints_keep_remaining_defaults() {
        let config: Config =
            toml::from_str("[endpoints]\ntoken_url = \"http://127.0.0.1:9/token\"\n").unwrap();
        assert_eq!(config.endpoints.token_url, "http://127.0.0.1:9/token");
        assert_eq!(
            config.endpoints.sheets_base,
            "https://sheets.googleapis.com/v4/spreadsheets"
        );
    }
}
