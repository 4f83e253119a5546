//! Auth-state change notification.
//!
//! Writers publish to in-process subscribers through [`Notifier`]. Other
//! processes sharing the state directory learn about changes through
//! [`StateWatcher`], which combines a filesystem watcher with a fixed
//! reconciliation poll in case an event is missed.

use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::auth::mode::{classify, AuthMode};
use crate::state::AuthState;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    CredentialsChanged,
    OAuthConfigChanged,
    /// A token pair was issued or refreshed.
    TokensChanged,
    LoggedOut,
    SimulatedAppend { key: String, rows: usize },
    /// A replay finished; `remaining` rows are still held for `key`.
    SimulatedSynced { key: String, remaining: usize },
    /// Something under the state directory changed on disk.
    StorageChanged,
    ModeChanged { from: AuthMode, to: AuthMode },
}

#[derive(Default)]
pub struct Notifier {
    subscribers: Mutex<Vec<Sender<AuthEvent>>>,
}

impl Notifier {
    pub fn subscribe_with(&self, tx: Sender<AuthEvent>) {
        self.lock().push(tx);
    }

    /// Deliver to every live subscriber, dropping the ones that hung up.
    pub fn publish(&self, event: AuthEvent) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<AuthEvent>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Follows the effective [`AuthMode`] and reports transitions.
pub struct StateWatcher {
    state: Arc<AuthState>,
    poll_interval: Duration,
    last: AuthMode,
}

impl StateWatcher {
    pub fn new(state: Arc<AuthState>) -> Self {
        let last = classify(&state);
        Self {
            state,
            poll_interval: DEFAULT_POLL_INTERVAL,
            last,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn current(&self) -> AuthMode {
        self.last
    }

    /// Recompute the mode, returning a transition event if it changed.
    pub fn check(&mut self) -> Option<AuthEvent> {
        let now = classify(&self.state);
        if now == self.last {
            return None;
        }
        let event = AuthEvent::ModeChanged {
            from: self.last,
            to: now,
        };
        self.last = now;
        Some(event)
    }

    /// Block, forwarding mode transitions to `out` until its receiver is
    /// dropped.
    pub fn run(mut self, out: Sender<AuthEvent>) {
        let (wake_tx, wake_rx) = mpsc::channel();
        self.state.subscribe_with(wake_tx.clone());
        let _watcher = self.setup_fs_watcher(wake_tx);

        loop {
            match wake_rx.recv_timeout(self.poll_interval) {
                Ok(AuthEvent::SimulatedAppend { key, rows }) => {
                    debug!(key = %key, rows, "rows held locally")
                }
                Ok(AuthEvent::SimulatedSynced { key, remaining }) => {
                    debug!(key = %key, remaining, "local rows replayed")
                }
                Ok(event) => debug!(?event, "watcher woke"),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if let Some(event) = self.check() {
                if out.send(event).is_err() {
                    break;
                }
            }
        }
    }

    /// Watch the state directory. The returned handle must be kept alive.
    fn setup_fs_watcher(&self, wake_tx: Sender<AuthEvent>) -> Option<notify::RecommendedWatcher> {
        use notify::{RecursiveMode, Watcher};

        let mut watcher = notify::recommended_watcher(move |_: notify::Result<notify::Event>| {
            let _ = wake_tx.send(AuthEvent::StorageChanged);
        })
        .map_err(|e| warn!(error = %e, "file watcher unavailable, polling only"))
        .ok()?;

        let root: PathBuf = self.state.store().root().to_path_buf();
        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .map_err(|e| warn!(error = %e, path = %root.display(), "cannot watch state directory"))
            .ok()?;

        Some(watcher)
    }
}
