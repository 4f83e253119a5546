use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use super::types::*;
use crate::error::{Error, Result};

const CONFIG_FILE: &str = "config.toml";
const CREDENTIALS_FILE: &str = "credentials.json";
const SIMULATED_FILE: &str = "simulated.json";

/// Overrides the state directory (normally `$CONFIG_DIR/sheetgate`).
pub const HOME_ENV: &str = "SHEETGATE_HOME";

/// File-backed profile state shared by every process pointed at the same
/// directory.
pub struct StateStore {
    root: PathBuf,
    config_path: PathBuf,
    credentials_path: PathBuf,
    simulated_path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl StateStore {
    pub fn new() -> Result<Self> {
        let root = match std::env::var_os(HOME_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir().ok_or(Error::NoConfigDir)?.join("sheetgate"),
        };
        Self::open(root)
    }

    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        Ok(Self {
            config_path: root.join(CONFIG_FILE),
            credentials_path: root.join(CREDENTIALS_FILE),
            simulated_path: root.join(SIMULATED_FILE),
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // -- Config (no secrets) --------------------------------------------------

    pub fn load_config(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(&self.config_path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn update_config<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Config),
    {
        let _guard = self.lock();
        let mut config = self.load_config()?;
        f(&mut config);
        let contents = toml::to_string_pretty(&config)?;
        write_replace(&self.config_path, contents.as_bytes(), false)
    }

    // -- Credentials (secrets, 0600) ------------------------------------------

    pub fn load_credentials(&self) -> Result<CredentialsFile> {
        load_json(&self.credentials_path)
    }

    pub fn update_credentials<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut CredentialsFile),
    {
        let _guard = self.lock();
        let mut creds = self.load_credentials()?;
        f(&mut creds);
        let contents = serde_json::to_string_pretty(&creds)?;
        write_replace(&self.credentials_path, contents.as_bytes(), true)
    }

    // -- Simulated append log -------------------------------------------------

    pub fn load_simulated(&self) -> Result<SimulatedLog> {
        load_json(&self.simulated_path)
    }

    pub fn update_simulated<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SimulatedLog) -> T,
    {
        let _guard = self.lock();
        let mut log = self.load_simulated()?;
        let out = f(&mut log);
        let contents = serde_json::to_string_pretty(&log)?;
        write_replace(&self.simulated_path, contents.as_bytes(), false)?;
        Ok(out)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Write via a uniquely named temp file in the same directory and rename,
/// so readers and concurrent writers in other processes never see a
/// half-written file.
fn write_replace(path: &Path, contents: &[u8], private: bool) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if private { 0o600 } else { 0o644 };
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = private;

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn missing_files_load_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        assert!(store.load_config().unwrap().spreadsheet_id.is_none());
        assert!(store.load_credentials().unwrap().tokens.is_none());
        assert!(store.load_simulated().unwrap().ranges.is_empty());
    }

    #[test]
    fn updates_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();

        store
            .update_config(|c| c.spreadsheet_id = Some("sheet-1".into()))
            .unwrap();
        store
            .update_credentials(|c| {
                c.api_key = Some("AIzaKey".into());
                c.tokens = Some(TokenPair {
                    access_token: "a".into(),
                    refresh_token: Some("r".into()),
                    token_type: "Bearer".into(),
                    scope: "s".into(),
                    expires_at: Utc::now(),
                });
            })
            .unwrap();

        let reopened = StateStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.load_config().unwrap().spreadsheet_id.as_deref(),
            Some("sheet-1")
        );
        let creds = reopened.load_credentials().unwrap();
        assert_eq!(creds.api_key.as_deref(), Some("AIzaKey"));
        assert_eq!(creds.tokens.unwrap().access_token, "a");
        assert!(!dir.path().join("credentials.tmp").exists());
    }

    // Separate stores stand in for separate processes: no shared mutex.
    #[test]
    fn concurrent_writers_never_corrupt_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let handles: Vec<_> = (0..4)
            .map(|writer| {
                let root = dir.path().to_path_buf();
                std::thread::spawn(move || {
                    let store = StateStore::open(root).unwrap();
                    for i in 0..25 {
                        store
                            .update_credentials(|c| c.api_key = Some(format!("AIza-{writer}-{i}")))
                            .unwrap();
                        store.load_credentials().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = StateStore::open(dir.path()).unwrap();
        assert!(store.load_credentials().unwrap().api_key.is_some());
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![CREDENTIALS_FILE.to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn credentials_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        store.update_credentials(|c| c.api_key = Some("k".into())).unwrap();

        let mode = fs::metadata(dir.path().join(CREDENTIALS_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn update_simulated_returns_closure_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let len = store
            .update_simulated(|log| {
                let rows = log.ranges.entry("k".into()).or_default();
                rows.push(vec!["x".into()]);
                rows.len()
            })
            .unwrap();
        assert_eq!(len, 1);
    }
}
