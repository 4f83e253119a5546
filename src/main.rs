use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod auth;
mod cli;
mod error;
mod events;
mod sheets;
mod state;
mod storage;
#[cfg(test)]
mod testsupport;

use auth::oauth::DEFAULT_CALLBACK_PORT;
use sheets::records::{AttendanceRecord, Employee, PayrollRecord};

#[derive(Parser)]
#[command(name = "sheetgate", about = "Google Sheets access with API key or OAuth")]
struct Cli {
    /// Log debug output to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective auth mode, credentials and token state
    Status,

    /// Manage the local API key and spreadsheet ID overrides
    Credentials {
        #[command(subcommand)]
        action: CredentialsAction,
    },

    /// Manage the OAuth client used for full access
    Oauth {
        #[command(subcommand)]
        action: OAuthAction,
    },

    /// Authorize with Google in the browser
    Login {
        /// Callback port on 127.0.0.1 (0 picks a free port)
        #[arg(long, default_value_t = DEFAULT_CALLBACK_PORT)]
        port: u16,
        /// Print the consent URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
        /// Exchange an authorization code obtained elsewhere (issued for
        /// http://127.0.0.1:<port>/oauth/callback, without PKCE)
        #[arg(long)]
        code: Option<String>,
    },

    /// Revoke and forget the OAuth tokens
    Logout,

    /// Print a valid access token (refreshes if near expiry)
    Token,

    /// Force an access token refresh
    Refresh,

    /// Check read and write access to the spreadsheet
    Test,

    /// Read a range as JSON records keyed by the header row
    Read {
        /// A1 range, e.g. "Employees Masterlist!A:H"
        range: String,
        /// Print one column per record instead of JSON
        #[arg(short, long)]
        field: Option<String>,
    },

    /// Append one row to a range
    Append {
        range: String,
        /// Cell values in column order
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Overwrite a range with one row (OAuth only)
    Update {
        range: String,
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Add an employee to the masterlist
    AddEmployee(Employee),

    /// Add an attendance log entry
    AddAttendance(AttendanceRecord),

    /// Add a payroll record
    AddPayroll(PayrollRecord),

    /// Write the header row of every template tab (OAuth only)
    InitSheets,

    /// Show rows held locally for a range
    Local { range: String },

    /// Upload locally held rows (all template ranges if none given)
    Sync { ranges: Vec<String> },

    /// Print auth mode transitions as they happen
    Watch {
        /// Reconciliation poll interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        poll_ms: u64,
    },
}

#[derive(Subcommand)]
enum CredentialsAction {
    /// Save overrides (an empty value removes that override)
    Set {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        spreadsheet_id: Option<String>,
    },
    /// Remove all overrides, falling back to the environment
    Clear,
}

#[derive(Subcommand)]
enum OAuthAction {
    /// Save the OAuth client ID and secret
    Configure {
        /// Defaults to GOOGLE_CLIENT_ID
        #[arg(long)]
        client_id: Option<String>,
        /// Defaults to GOOGLE_CLIENT_SECRET
        #[arg(long)]
        client_secret: Option<String>,
        /// OAuth scope (repeatable; replaces the default spreadsheets + drive.file)
        #[arg(long = "scope")]
        scopes: Vec<String>,
    },
    /// Log out and remove the OAuth client
    Clear,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Status => cli::commands::cmd_status(),
        Commands::Credentials { action } => match action {
            CredentialsAction::Set {
                api_key,
                spreadsheet_id,
            } => cli::commands::cmd_credentials_set(api_key.as_deref(), spreadsheet_id.as_deref()),
            CredentialsAction::Clear => cli::commands::cmd_credentials_clear(),
        },
        Commands::Oauth { action } => match action {
            OAuthAction::Configure {
                client_id,
                client_secret,
                scopes,
            } => cli::commands::cmd_oauth_configure(
                client_id.as_deref(),
                client_secret.as_deref(),
                scopes,
            ),
            OAuthAction::Clear => cli::commands::cmd_oauth_clear(),
        },
        Commands::Login {
            port,
            no_browser,
            code,
        } => cli::commands::cmd_login(port, no_browser, code.as_deref()),
        Commands::Logout => cli::commands::cmd_logout(),
        Commands::Token => cli::commands::cmd_token(),
        Commands::Refresh => cli::commands::cmd_refresh(),
        Commands::Test => cli::commands::cmd_test(),
        Commands::Read { range, field } => cli::commands::cmd_read(&range, field.as_deref()),
        Commands::Append { range, values } => cli::commands::cmd_append(&range, values),
        Commands::Update { range, values } => cli::commands::cmd_update(&range, values),
        Commands::AddEmployee(employee) => cli::commands::cmd_add_employee(&employee),
        Commands::AddAttendance(record) => cli::commands::cmd_add_attendance(&record),
        Commands::AddPayroll(record) => cli::commands::cmd_add_payroll(&record),
        Commands::InitSheets => cli::commands::cmd_init_sheets(),
        Commands::Local { range } => cli::commands::cmd_local(&range),
        Commands::Sync { ranges } => cli::commands::cmd_sync(ranges),
        Commands::Watch { poll_ms } => {
            cli::commands::cmd_watch(std::time::Duration::from_millis(poll_ms))
        }
    };

    if let Err(e) = result {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
