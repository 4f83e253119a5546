use std::process::Command;

use crate::error::{Error, Result};

/// Open `url` in the user's browser. Failing to launch one is reported as
/// [`Error::PopupBlocked`] so callers can fall back to printing the URL.
pub fn open_browser(url: &str) -> Result<()> {
    match browser_command(url).status() {
        Ok(s) if s.success() => Ok(()),
        _ => Err(Error::PopupBlocked),
    }
}

/// The URL is always passed as a single argument, never through a shell.
fn browser_command(url: &str) -> Command {
    #[cfg(target_os = "macos")]
    let mut cmd = Command::new("open");

    #[cfg(target_os = "windows")]
    let mut cmd = {
        let mut cmd = Command::new("rundll32");
        cmd.arg("url.dll,FileProtocolHandler");
        cmd
    };

    #[cfg(all(unix, not(target_os = "macos")))]
    let mut cmd = Command::new("xdg-open");

    cmd.arg(url);
    cmd
}
