use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::debug;

use crate::auth::browser::open_browser;
use crate::auth::callback::CallbackServer;
use crate::auth::credentials::{has_credentials, resolve_credentials, resolve_oauth_config};
use crate::auth::mode::classify;
use crate::auth::oauth::{OAuthClient, CALLBACK_PATH};
use crate::error::Error;
use crate::events::{AuthEvent, StateWatcher};
use crate::sheets::records::{AttendanceRecord, Employee, PayrollRecord};
use crate::sheets::{AppendOutcome, SheetsGateway};
use crate::state::{AuthState, EnvDefaults};
use crate::storage::{StateStore, HOME_ENV};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

fn open_state() -> Result<Arc<AuthState>> {
    let store = StateStore::new().context("failed to open state directory")?;
    Ok(Arc::new(AuthState::new(store, EnvDefaults::from_env())))
}

fn gateway(state: &Arc<AuthState>) -> SheetsGateway {
    let oauth = Arc::new(OAuthClient::new(Arc::clone(state)));
    SheetsGateway::new(Arc::clone(state), oauth)
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        return "(not set)".to_string();
    }
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{}", tail)
}

fn report_append(outcome: AppendOutcome, what: &str) {
    debug!(
        succeeded = outcome.succeeded(),
        durable = outcome.is_durable(),
        "append finished"
    );
    if outcome.is_durable() {
        eprintln!("{} written to the spreadsheet.", what);
    } else {
        eprintln!(
            "{} saved locally (no write access). Run `sheetgate login` then `sheetgate sync` to upload it.",
            what
        );
    }
}

pub fn cmd_status() -> Result<()> {
    let state = open_state()?;
    let creds = resolve_credentials(&state);
    let client = OAuthClient::new(Arc::clone(&state));

    println!(
        "state dir: {} (set {} to move it)",
        state.store().root().display(),
        HOME_ENV
    );
    println!("mode: {}", classify(&state));
    println!(
        "api key: {} ({})",
        mask(&creds.api_key),
        creds.api_key_source
    );
    let sheet = if creds.spreadsheet_id.is_empty() {
        "(not set)"
    } else {
        creds.spreadsheet_id.as_str()
    };
    println!("spreadsheet: {} ({})", sheet, creds.spreadsheet_id_source);
    println!(
        "read-only credentials: {}",
        if has_credentials(&state) { "complete" } else { "incomplete" }
    );

    if client.is_configured() {
        println!("oauth client: {}", resolve_oauth_config(&state).client_id);
    } else {
        println!("oauth client: not configured");
    }

    match client.token_status() {
        Some(status) => {
            let left = (status.expires_at - Utc::now()).num_minutes();
            let refresh = if status.has_refresh_token {
                "refresh token held"
            } else {
                "no refresh token"
            };
            let due = if status.refresh_due { ", refresh due" } else { "" };
            println!(
                "tokens: expire in {} min{} | {} | scope: {}",
                left, due, refresh, status.scope
            );
        }
        None => println!("tokens: none"),
    }

    Ok(())
}

pub fn cmd_credentials_set(api_key: Option<&str>, spreadsheet_id: Option<&str>) -> Result<()> {
    if api_key.is_none() && spreadsheet_id.is_none() {
        bail!("nothing to set; pass --api-key and/or --spreadsheet-id");
    }
    let state = open_state()?;
    state.set_credential_overrides(api_key, spreadsheet_id)?;
    eprintln!("Credentials saved. Mode is now {}.", classify(&state));
    Ok(())
}

pub fn cmd_credentials_clear() -> Result<()> {
    let state = open_state()?;
    state.clear_credential_overrides()?;
    eprintln!("Local credential overrides removed.");
    Ok(())
}

/// Omitted values fall back to GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET.
pub fn cmd_oauth_configure(
    client_id: Option<&str>,
    client_secret: Option<&str>,
    scopes: Vec<String>,
) -> Result<()> {
    let state = open_state()?;
    let client = OAuthClient::new(Arc::clone(&state));
    client.configure(
        client_id.unwrap_or_default(),
        client_secret.unwrap_or_default(),
        scopes,
    )?;
    if !client.is_configured() {
        bail!("OAuth enabled but the client pair is incomplete; pass --client-id and --client-secret");
    }
    eprintln!("OAuth client saved. Run `sheetgate login` to authorize.");
    Ok(())
}

pub fn cmd_oauth_clear() -> Result<()> {
    let state = open_state()?;
    OAuthClient::new(Arc::clone(&state)).clear_configuration()?;
    eprintln!("OAuth client and tokens removed.");
    Ok(())
}

pub fn cmd_login(port: u16, no_browser: bool, code: Option<&str>) -> Result<()> {
    let state = open_state()?;
    if !OAuthClient::new(Arc::clone(&state)).is_configured() {
        bail!("OAuth client is not configured; run `sheetgate oauth configure` first");
    }
    if let Some(code) = code {
        return login_with_code(state, port, code);
    }

    let server = CallbackServer::bind(port).context("failed to start callback server")?;
    let client = Arc::new(
        OAuthClient::new(Arc::clone(&state)).with_redirect_uri(server.redirect_uri()),
    );
    let request = client
        .build_authorization_url()
        .context("cannot start authorization")?;

    debug!(redirect_uri = client.redirect_uri(), state = %request.state, "authorization request issued");

    let url = request.url.to_string();
    if no_browser {
        eprintln!("Open this URL to authorize:\n\n  {}\n", url);
    } else {
        match open_browser(&url) {
            Ok(()) => eprintln!("Waiting for authorization in the browser..."),
            Err(Error::PopupBlocked) => {
                eprintln!("Could not open a browser. Open this URL to authorize:\n\n  {}\n", url)
            }
            Err(e) => return Err(e.into()),
        }
    }

    let (tx, rx) = mpsc::channel();
    {
        let client = Arc::clone(&client);
        thread::spawn(move || {
            let _ = tx.send(server.await_authorization(&client));
        });
    }

    let pair = rx
        .recv_timeout(LOGIN_TIMEOUT)
        .context("timed out waiting for authorization")?
        .context("authorization failed")?;

    eprintln!(
        "Logged in. Access token valid until {}.",
        pair.expires_at.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(())
}

/// Exchange a code obtained outside sheetgate. The redirect URI must be the
/// one the code was issued for.
fn login_with_code(state: Arc<AuthState>, port: u16, code: &str) -> Result<()> {
    let redirect_uri = format!("http://127.0.0.1:{}{}", port, CALLBACK_PATH);
    let pair = OAuthClient::new(state)
        .with_redirect_uri(redirect_uri)
        .exchange_code(code)
        .context("authorization code exchange failed")?;
    eprintln!(
        "Logged in. Access token valid until {}.",
        pair.expires_at.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(())
}

pub fn cmd_logout() -> Result<()> {
    let state = open_state()?;
    let client = OAuthClient::new(Arc::clone(&state));
    if !client.is_authenticated() {
        eprintln!("Not logged in.");
        return Ok(());
    }
    client.logout()?;
    eprintln!("Logged out.");
    Ok(())
}

/// Print a valid access token, refreshing first when it is near expiry.
pub fn cmd_token() -> Result<()> {
    let state = open_state()?;
    let token = OAuthClient::new(state)
        .get_valid_access_token()
        .context("no usable access token")?;
    println!("{}", token);
    Ok(())
}

pub fn cmd_refresh() -> Result<()> {
    let state = open_state()?;
    let pair = OAuthClient::new(state).refresh()?;
    eprintln!(
        "Token refreshed, valid until {}.",
        pair.expires_at.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(())
}

pub fn cmd_test() -> Result<()> {
    let state = open_state()?;
    let result = gateway(&state).test_connection();

    println!("{}", result.message);
    println!("  mode: {}", result.mode);
    if let Some(id) = &result.spreadsheet_id {
        println!("  spreadsheet: {}", id);
    }
    println!("  read access: {}", if result.has_read_access { "yes" } else { "no" });
    println!("  write access: {}", if result.has_write_access { "yes" } else { "no" });
    if let Some(error) = &result.error {
        println!("  error: {}", error);
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

pub fn cmd_read(range: &str, field: Option<&str>) -> Result<()> {
    let state = open_state()?;
    let records = gateway(&state)
        .read_sheet(range)
        .with_context(|| format!("failed to read '{}'", range))?;

    match field {
        Some(f) => {
            for record in &records {
                let value = record
                    .get(f)
                    .ok_or_else(|| anyhow::anyhow!("Field '{}' not found", f))?;
                println!("{}", value);
            }
        }
        None => println!("{}", serde_json::to_string_pretty(&records)?),
    }
    Ok(())
}

pub fn cmd_append(range: &str, values: Vec<String>) -> Result<()> {
    let state = open_state()?;
    let outcome = gateway(&state).append_to_sheet(range, &[values])?;
    report_append(outcome, "Row");
    Ok(())
}

pub fn cmd_update(range: &str, values: Vec<String>) -> Result<()> {
    let state = open_state()?;
    gateway(&state)
        .update_sheet(range, &[values])
        .with_context(|| format!("failed to update '{}' (OAuth login required)", range))?;
    eprintln!("Updated {}.", range);
    Ok(())
}

pub fn cmd_add_employee(employee: &Employee) -> Result<()> {
    let state = open_state()?;
    let outcome = gateway(&state).add_employee(employee)?;
    report_append(outcome, "Employee");
    Ok(())
}

pub fn cmd_add_attendance(record: &AttendanceRecord) -> Result<()> {
    let state = open_state()?;
    let outcome = gateway(&state).add_attendance_record(record)?;
    report_append(outcome, "Attendance record");
    Ok(())
}

pub fn cmd_add_payroll(record: &PayrollRecord) -> Result<()> {
    let state = open_state()?;
    let outcome = gateway(&state).add_payroll_record(record)?;
    report_append(outcome, "Payroll record");
    Ok(())
}

pub fn cmd_init_sheets() -> Result<()> {
    let state = open_state()?;
    gateway(&state)
        .create_sheet_structure()
        .context("failed to write header rows (OAuth login required)")?;
    eprintln!("Header rows written to all tabs.");
    Ok(())
}

pub fn cmd_local(range: &str) -> Result<()> {
    let state = open_state()?;
    let rows = gateway(&state).local_rows(range);
    if rows.is_empty() {
        eprintln!("No rows held locally for '{}'.", range);
        return Ok(());
    }
    for row in rows {
        println!("{}", row.join("\t"));
    }
    Ok(())
}

/// Upload locally held rows for the given ranges, or every template range.
pub fn cmd_sync(ranges: Vec<String>) -> Result<()> {
    let state = open_state()?;
    let ranges = if ranges.is_empty() {
        let r = state.config().ranges;
        vec![r.employees, r.attendance, r.payroll, r.contributions, r.utang]
    } else {
        ranges
    };

    let gateway = gateway(&state);
    let mut failed = 0usize;
    for range in ranges {
        if gateway.local_rows(&range).is_empty() {
            continue;
        }
        let report = gateway
            .replay_simulated(&range)
            .with_context(|| format!("cannot sync '{}'", range))?;
        eprintln!(
            "[{}] {} uploaded, {} kept locally",
            range, report.written, report.failed
        );
        failed += report.failed;
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

pub fn cmd_watch(poll: Duration) -> Result<()> {
    let state = open_state()?;
    let watcher = StateWatcher::new(Arc::clone(&state)).with_poll_interval(poll);
    eprintln!(
        "Watching {} (mode: {}). Ctrl-C to stop.",
        state.store().root().display(),
        watcher.current()
    );

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || watcher.run(tx));

    for event in rx {
        if let AuthEvent::ModeChanged { from, to } = event {
            println!("{} mode: {} -> {}", Utc::now().format("%H:%M:%S"), from, to);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_keeps_last_four() {
        assert_eq!(mask("AIzaExampleKey123"), "****y123");
        assert_eq!(mask("abc"), "****abc");
        assert_eq!(mask(""), "(not set)");
    }
}
