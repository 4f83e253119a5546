use std::sync::Arc;

use reqwest::blocking::{Client, Response};
use reqwest::Method;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use super::records::{self, AttendanceRecord, Employee, PayrollRecord};
use crate::auth::credentials::resolve_credentials;
use crate::auth::mode::{classify, has_full_access, AuthMode};
use crate::auth::oauth::OAuthClient;
use crate::error::{Error, Result};
use crate::state::AuthState;

/// Cell overwritten by the write check in [`SheetsGateway::test_connection`].
pub const WRITE_CHECK_RANGE: &str = "TestSheet!A1";

/// One data row keyed by the header row, in sheet column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// How an append was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Written to the spreadsheet.
    Written,
    /// Held in the local simulated log; nothing reached Google.
    Simulated,
}

impl AppendOutcome {
    /// Both outcomes count as success for the caller's flow.
    pub fn succeeded(self) -> bool {
        true
    }

    pub fn is_durable(self) -> bool {
        self == AppendOutcome::Written
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub mode: AuthMode,
    pub message: String,
    pub has_read_access: bool,
    pub has_write_access: bool,
    pub spreadsheet_id: Option<String>,
    pub error: Option<String>,
}

impl ConnectionTestResult {
    fn failed(mode: AuthMode, message: &str) -> Self {
        Self {
            success: false,
            mode,
            message: message.to_string(),
            has_read_access: false,
            has_write_access: false,
            spreadsheet_id: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub written: usize,
    pub failed: usize,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

enum RequestAuth {
    Bearer(String),
    ApiKey(String),
}

pub struct SheetsGateway {
    state: Arc<AuthState>,
    oauth: Arc<OAuthClient>,
    http: Client,
}

impl SheetsGateway {
    pub fn new(state: Arc<AuthState>, oauth: Arc<OAuthClient>) -> Self {
        Self {
            state,
            oauth,
            http: Client::new(),
        }
    }

    pub fn with_http(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    // -- Reads ----------------------------------------------------------------

    /// Fetch `range` and key every data row by the header row.
    pub fn read_sheet(&self, range: &str) -> Result<Vec<Record>> {
        let url = self.values_url(range, None)?;
        let response = expect_success(self.send(Method::GET, url, None)?)?;
        let data: ValueRange = response.json()?;
        Ok(records_from_values(data.values))
    }

    /// Rows held locally for `range` because they could not be written.
    pub fn local_rows(&self, range: &str) -> Vec<Vec<String>> {
        self.state.simulated_rows(range)
    }

    // -- Writes ---------------------------------------------------------------

    /// Append rows, or hold them in the simulated log without write access.
    pub fn append_to_sheet(&self, range: &str, rows: &[Vec<String>]) -> Result<AppendOutcome> {
        if !has_full_access(&self.state) {
            let held = self.state.append_simulated(range, rows)?;
            warn!(range, held, "no write access, append simulated locally");
            return Ok(AppendOutcome::Simulated);
        }

        self.post_append(range, rows)?;
        info!(range, rows = rows.len(), "rows appended");
        Ok(AppendOutcome::Written)
    }

    pub fn add_employee(&self, employee: &Employee) -> Result<AppendOutcome> {
        let range = self.state.config().ranges.employees;
        self.append_to_sheet(&range, &[employee.to_row()])
    }

    pub fn add_attendance_record(&self, record: &AttendanceRecord) -> Result<AppendOutcome> {
        let range = self.state.config().ranges.attendance;
        self.append_to_sheet(&range, &[record.to_row()])
    }

    pub fn add_payroll_record(&self, record: &PayrollRecord) -> Result<AppendOutcome> {
        let range = self.state.config().ranges.payroll;
        self.append_to_sheet(&range, &[record.to_row()])
    }

    /// Overwrite `range` with `rows`. Requires OAuth.
    pub fn update_sheet(&self, range: &str, rows: &[Vec<String>]) -> Result<()> {
        self.require_full_access()?;
        let mut url = self.values_url(range, None)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        expect_success(self.send(Method::PUT, url, Some(&body))?)?;
        Ok(())
    }

    /// Overwrite several ranges in one request. Requires OAuth.
    pub fn batch_update(&self, updates: &[(String, Vec<Vec<String>>)]) -> Result<()> {
        self.require_full_access()?;
        let url = self.spreadsheet_url(Some("values:batchUpdate"))?;
        let data: Vec<Value> = updates
            .iter()
            .map(|(range, rows)| json!({ "range": range, "majorDimension": "ROWS", "values": rows }))
            .collect();
        let body = json!({ "valueInputOption": "RAW", "data": data });
        expect_success(self.send(Method::POST, url, Some(&body))?)?;
        Ok(())
    }

    /// Write the header row of every template tab.
    pub fn create_sheet_structure(&self) -> Result<()> {
        let ranges = self.state.config().ranges;
        let updates = vec![
            (ranges.employees, vec![records::header_row(records::EMPLOYEE_HEADERS)]),
            (ranges.attendance, vec![records::header_row(records::ATTENDANCE_HEADERS)]),
            (ranges.payroll, vec![records::header_row(records::PAYROLL_HEADERS)]),
            (
                ranges.contributions,
                vec![records::header_row(records::CONTRIBUTION_HEADERS)],
            ),
            (ranges.utang, vec![records::header_row(records::UTANG_HEADERS)]),
        ];
        self.batch_update(&updates)
    }

    /// Push simulated rows for `range` to the spreadsheet one at a time.
    /// A failed row stays in the log and the rest carry on. Rows appended
    /// while the replay runs are left for the next one.
    pub fn replay_simulated(&self, range: &str) -> Result<ReplayReport> {
        self.require_full_access()?;

        let snapshot = self.state.simulated_rows(range);
        let replayed = snapshot.len();
        let mut report = ReplayReport::default();
        let mut kept = Vec::new();
        for row in snapshot {
            match self.post_append(range, std::slice::from_ref(&row)) {
                Ok(()) => report.written += 1,
                Err(e) => {
                    warn!(range, error = %e, "simulated row failed to sync, keeping it");
                    report.failed += 1;
                    kept.push(row);
                }
            }
        }

        self.state.settle_simulated(range, replayed, kept)?;
        info!(range, written = report.written, failed = report.failed, "simulated rows replayed");
        Ok(report)
    }

    // -- Connection test ------------------------------------------------------

    /// Read check always; write check only with OAuth, since an API key can
    /// never write.
    pub fn test_connection(&self) -> ConnectionTestResult {
        let mode = classify(&self.state);
        if mode == AuthMode::None {
            return ConnectionTestResult::failed(mode, "No authentication configured");
        }

        let spreadsheet_id = resolve_credentials(&self.state).spreadsheet_id;
        if spreadsheet_id.is_empty() {
            return ConnectionTestResult::failed(mode, "No spreadsheet ID configured");
        }

        let has_read_access = match self.check_read() {
            Ok(ok) => ok,
            Err(e) => {
                return ConnectionTestResult {
                    spreadsheet_id: Some(spreadsheet_id),
                    error: Some(e.to_string()),
                    ..ConnectionTestResult::failed(mode, "Connection test failed")
                };
            }
        };

        let has_write_access = if mode == AuthMode::OAuth2 && has_read_access {
            self.check_write().unwrap_or_else(|e| {
                warn!(error = %e, "write check failed");
                false
            })
        } else {
            false
        };

        let message = if !has_read_access {
            "Failed to connect to Google Sheets".to_string()
        } else if mode == AuthMode::OAuth2 {
            "Connected successfully with full access".to_string()
        } else {
            "Connected successfully with read-only access".to_string()
        };

        ConnectionTestResult {
            success: has_read_access,
            mode,
            message,
            has_read_access,
            has_write_access,
            spreadsheet_id: Some(spreadsheet_id),
            error: None,
        }
    }

    fn check_read(&self) -> Result<bool> {
        let url = self.spreadsheet_url(None)?;
        let response = self.send(Method::GET, url, None)?;
        debug!(status = %response.status(), "read check");
        Ok(response.status().is_success())
    }

    fn check_write(&self) -> Result<bool> {
        let mut url = self.values_url(WRITE_CHECK_RANGE, None)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = json!({ "values": [["Test"]] });
        let response = self.send(Method::PUT, url, Some(&body))?;
        debug!(status = %response.status(), "write check");
        Ok(response.status().is_success())
    }

    // -- Plumbing -------------------------------------------------------------

    fn post_append(&self, range: &str, rows: &[Vec<String>]) -> Result<()> {
        let mut url = self.values_url(range, Some("append"))?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        expect_success(self.send(Method::POST, url, Some(&body))?)?;
        Ok(())
    }

    fn require_full_access(&self) -> Result<()> {
        if has_full_access(&self.state) {
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }

    fn spreadsheet_id(&self) -> Result<String> {
        let id = resolve_credentials(&self.state).spreadsheet_id;
        if id.is_empty() {
            return Err(Error::CredentialMissing("spreadsheet id is not set"));
        }
        Ok(id)
    }

    /// `{base}/{id}` or `{base}/{id}/{suffix}`.
    fn spreadsheet_url(&self, suffix: Option<&str>) -> Result<Url> {
        let base = self.state.config().endpoints.sheets_base;
        let id = self.spreadsheet_id()?;
        let mut url = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            urlencoding::encode(&id)
        );
        if let Some(suffix) = suffix {
            url.push('/');
            url.push_str(suffix);
        }
        Ok(Url::parse(&url)?)
    }

    /// `{base}/{id}/values/{range}` with an optional `:action`.
    fn values_url(&self, range: &str, action: Option<&str>) -> Result<Url> {
        let mut suffix = format!("values/{}", urlencoding::encode(range));
        if let Some(action) = action {
            suffix.push(':');
            suffix.push_str(action);
        }
        self.spreadsheet_url(Some(&suffix))
    }

    /// Bearer token with OAuth, `key=` query parameter with an API key,
    /// never both.
    fn request_auth(&self) -> Result<RequestAuth> {
        match classify(&self.state) {
            AuthMode::OAuth2 => Ok(RequestAuth::Bearer(self.oauth.get_valid_access_token()?)),
            AuthMode::ApiKey => Ok(RequestAuth::ApiKey(
                resolve_credentials(&self.state).api_key,
            )),
            AuthMode::None => Err(Error::CredentialMissing(
                "no API key or OAuth login configured",
            )),
        }
    }

    fn send(&self, method: Method, mut url: Url, body: Option<&Value>) -> Result<Response> {
        let auth = self.request_auth()?;
        if let RequestAuth::ApiKey(key) = &auth {
            url.query_pairs_mut().append_pair("key", key);
        }

        let mut request = self.http.request(method, url);
        if let RequestAuth::Bearer(token) = &auth {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send()?)
    }
}

fn expect_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(Error::SheetsRequest {
        status: status.as_u16(),
        body,
    })
}

/// First row names the fields; short rows are padded with empty strings.
fn records_from_values(values: Vec<Vec<Value>>) -> Vec<Record> {
    let mut rows = values.into_iter();
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let names: Vec<String> = header.into_iter().map(cell_text).collect();

    rows.map(|row| {
        let mut cells = row.into_iter().map(cell_text);
        let fields = names
            .iter()
            .map(|name| (name.clone(), cells.next().unwrap_or_default()))
            .collect();
        Record { fields }
    })
    .collect()
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
