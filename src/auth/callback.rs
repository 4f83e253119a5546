//! Loopback redirect target for the consent screen.
//!
//! Google redirects the browser to `/oauth/callback` with either `code` and
//! `state` or `error`. The server exchanges the code, tells the browser how it
//! went, and hands the outcome back to whoever is waiting on it.

use std::collections::HashMap;
use std::io::Cursor;

use tiny_http::{Header, Response, Server};
use tracing::{debug, warn};
use url::Url;

use super::oauth::{OAuthClient, CALLBACK_PATH};
use crate::error::{Error, Result};
use crate::storage::TokenPair;

const SUCCESS_HTML: &str = "<html><body><h1>Authentication successful!</h1>\
<p>Sheetgate now has full access to Google Sheets. This window will close automatically.</p>\
<script>setTimeout(function () { window.close(); }, 3000);</script></body></html>";

pub struct CallbackServer {
    server: Server,
    redirect_uri: String,
}

impl CallbackServer {
    /// Listen on 127.0.0.1. Port 0 picks a free port.
    pub fn bind(port: u16) -> Result<Self> {
        let server = Server::http(("127.0.0.1", port))
            .map_err(|e| Error::CallbackServer(format!("failed to start: {}", e)))?;
        let addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| Error::CallbackServer("not listening on an IP socket".to_string()))?;

        Ok(Self {
            redirect_uri: format!("http://{}{}", addr, CALLBACK_PATH),
            server,
        })
    }

    /// The redirect URI for this server's origin.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Serve requests until one carries an authorization outcome.
    pub fn await_authorization(&self, client: &OAuthClient) -> Result<TokenPair> {
        for request in self.server.incoming_requests() {
            let parsed = Url::parse(&format!("http://localhost{}", request.url()))?;
            if parsed.path() != CALLBACK_PATH {
                debug!(path = parsed.path(), "ignoring request outside the callback route");
                let _ = request.respond(Response::from_string("Not found").with_status_code(404));
                continue;
            }
            let params: HashMap<_, _> = parsed.query_pairs().into_owned().collect();

            if let Some(error) = params.get("error") {
                let desc = params.get("error_description").cloned().unwrap_or_default();
                let message = format!("{} {}", error, desc).trim().to_string();
                let _ = request.respond(failure_page(&message));
                return Err(Error::AuthorizationDenied(message));
            }

            let (Some(code), Some(state)) = (params.get("code"), params.get("state")) else {
                let message = "no authorization code received";
                let _ = request.respond(failure_page(message));
                return Err(Error::AuthorizationDenied(message.to_string()));
            };

            return match client.complete_authorization(code, state) {
                Ok(pair) => {
                    let _ = request.respond(html(SUCCESS_HTML.to_string(), 200));
                    Ok(pair)
                }
                Err(e) => {
                    warn!(error = %e, "authorization callback failed");
                    let _ = request.respond(failure_page(&e.to_string()));
                    Err(e)
                }
            };
        }

        Err(Error::CallbackServer(
            "stopped before authorization completed".to_string(),
        ))
    }
}

fn failure_page(message: &str) -> Response<Cursor<Vec<u8>>> {
    let body = format!(
        "<html><body><h1>Authentication failed</h1><p>{}</p>\
         <p>You can close this window and try again.</p></body></html>",
        escape(message)
    );
    html(body, 400)
}

fn html(body: String, status: u16) -> Response<Cursor<Vec<u8>>> {
    let response = Response::from_string(body).with_status_code(status);
    match Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
