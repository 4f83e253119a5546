//! Shared fixtures: a throwaway state directory and a loopback HTTP double
//! standing in for Google's token and Sheets endpoints.

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use chrono::{Duration, Utc};
use tempfile::TempDir;
use tiny_http::{Header, Response, Server};

use crate::auth::oauth::OAuthClient;
use crate::state::{AuthState, EnvDefaults};
use crate::storage::{StateStore, TokenPair};

pub fn temp_state(env: EnvDefaults) -> (TempDir, Arc<AuthState>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = StateStore::open(dir.path()).expect("open store");
    (dir, Arc::new(AuthState::new(store, env)))
}

/// Client that ignores proxy settings so loopback requests stay local.
pub fn test_http() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .no_proxy()
        .build()
        .expect("http client")
}

pub fn oauth_client(state: &Arc<AuthState>) -> OAuthClient {
    OAuthClient::new(Arc::clone(state)).with_http(test_http())
}

pub fn configure_oauth(state: &AuthState) {
    state
        .save_oauth_settings(
            "client-id.apps.googleusercontent.com",
            "client-secret",
            Vec::new(),
        )
        .expect("save oauth settings");
}

/// Store a token pair expiring `expires_in_secs` from now.
pub fn seed_tokens(state: &AuthState, expires_in_secs: i64) -> TokenPair {
    let pair = TokenPair {
        access_token: "seeded-access".to_string(),
        refresh_token: Some("seeded-refresh".to_string()),
        token_type: "Bearer".to_string(),
        scope: "seeded-scope".to_string(),
        expires_at: Utc::now() + Duration::seconds(expires_in_secs),
    };
    state.store_token_pair(pair.clone()).expect("store token pair");
    pair
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    /// Raw request path without the query string.
    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or_default()
    }

    pub fn decoded_path(&self) -> String {
        urlencoding::decode(self.path())
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| self.path().to_string())
    }

    pub fn query(&self, name: &str) -> Option<String> {
        let (_, query) = self.url.split_once('?')?;
        find_pair(query, name)
    }

    /// Field of an `application/x-www-form-urlencoded` body.
    pub fn form(&self, name: &str) -> Option<String> {
        find_pair(&self.body, name)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("json body")
    }
}

fn find_pair(encoded: &str, name: &str) -> Option<String> {
    url::form_urlencoded::parse(encoded.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

pub struct MockResponse {
    status: u16,
    body: String,
}

impl MockResponse {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

/// Serves requests on a background thread, one at a time, recording each.
pub struct MockServer {
    server: Arc<Server>,
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    worker: Option<JoinHandle<()>>,
}

impl MockServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + 'static,
    {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("bind mock server"));
        let addr = server.server_addr().to_ip().expect("ip listener");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let worker = {
            let server = Arc::clone(&server);
            let requests = Arc::clone(&requests);
            thread::spawn(move || {
                for mut request in server.incoming_requests() {
                    let mut body = String::new();
                    let _ = request.as_reader().read_to_string(&mut body);
                    let recorded = RecordedRequest {
                        method: request.method().as_str().to_string(),
                        url: request.url().to_string(),
                        headers: request
                            .headers()
                            .iter()
                            .map(|h| (h.field.to_string(), h.value.as_str().to_string()))
                            .collect(),
                        body,
                    };

                    let reply = handler(&recorded);
                    requests.lock().expect("requests lock").push(recorded);

                    let content_type =
                        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                            .expect("header");
                    let response = Response::from_string(reply.body)
                        .with_status_code(reply.status)
                        .with_header(content_type);
                    let _ = request.respond(response);
                }
            })
        };

        Self {
            server,
            base_url: format!("http://{}", addr),
            requests,
            worker: Some(worker),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Route every Google endpoint in `state`'s config to this server.
    pub fn point_endpoints(&self, state: &AuthState) {
        state
            .store()
            .update_config(|config| {
                config.endpoints.auth_url = self.url("/auth");
                config.endpoints.token_url = self.url("/token");
                config.endpoints.revoke_url = self.url("/revoke");
                config.endpoints.sheets_base = self.url("/v4/spreadsheets");
            })
            .expect("point endpoints");
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
