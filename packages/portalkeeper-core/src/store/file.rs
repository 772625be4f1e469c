//! On-disk store.
//!
//! Storage layout:
//! - Credential list: platform keyring (if `keyring-storage` is enabled and
//!   available), else `<config_dir>/portalkeeper/.credentials` (0600 on Unix)
//! - Session state: `<data_local_dir>/portalkeeper/session_state.json`
//!
//! Every write goes to a uniquely named temp file in the target's directory
//! that is then renamed over it, so readers only ever see a complete value
//! for each key. Session patches hold an exclusive lock on
//! `session_state.lock` across their read-modify-write, which keeps a
//! `portalkeeper stop` from another shell from racing the daemon.

use super::StateStore;
use crate::auth::Credential;
use crate::session::{SessionPatch, SessionState};
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[cfg(feature = "keyring-storage")]
use keyring::Entry;

const APP_DIR: &str = "portalkeeper";
const CREDENTIALS_FILE: &str = ".credentials";
const SESSION_FILE: &str = "session_state.json";
const SESSION_LOCK_FILE: &str = "session_state.lock";
const WORKER_LOCK_FILE: &str = "daemon.lock";

#[cfg(feature = "keyring-storage")]
const KEYRING_SERVICE: &str = "portalkeeper";
#[cfg(feature = "keyring-storage")]
const KEYRING_USER: &str = "credentials";

#[cfg(target_os = "windows")]
const KEYRING_BACKEND: &str = "Windows Credential Manager";
#[cfg(target_os = "macos")]
const KEYRING_BACKEND: &str = "macOS Keychain";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const KEYRING_BACKEND: &str = "Linux Secret Service (GNOME Keyring/KWallet)";

#[derive(Debug)]
pub struct FileStore {
    config_dir: PathBuf,
    data_dir: PathBuf,
    use_keyring: bool,
}

/// Exclusive claim on running the login cycle against a data directory.
///
/// Released when dropped (or when the holding process exits).
#[derive(Debug)]
pub struct WorkerLock {
    _file: File,
    path: PathBuf,
}

impl WorkerLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileStore {
    /// Store rooted at the platform config and data directories.
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .context("Failed to find config directory")?
            .join(APP_DIR);
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .context("Could not find data directory")?
            .join(APP_DIR);

        Ok(Self {
            config_dir,
            data_dir,
            use_keyring: cfg!(feature = "keyring-storage"),
        })
    }

    /// Store rooted at explicit directories. Never touches the keyring.
    pub fn with_dirs(config_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            data_dir: data_dir.into(),
            use_keyring: false,
        }
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.config_dir.join(CREDENTIALS_FILE)
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }

    pub fn worker_lock_path(&self) -> PathBuf {
        self.data_dir.join(WORKER_LOCK_FILE)
    }

    /// Claim the right to run the login cycle.
    ///
    /// Returns `None` when another process (or another handle in this one)
    /// already holds the claim.
    pub fn try_lock_worker(&self) -> Result<Option<WorkerLock>> {
        let path = self.worker_lock_path();
        let file = open_lock_file(&path)?;
        if file.try_lock_exclusive().is_err() {
            tracing::debug!("Worker lock {} is held elsewhere", path.display());
            return Ok(None);
        }
        Ok(Some(WorkerLock { _file: file, path }))
    }

    /// Human-readable description of where credentials live.
    pub fn storage_info(&self) -> String {
        if self.use_keyring {
            return format!("{} (with file fallback)", KEYRING_BACKEND);
        }
        format!("File-based storage: {}", self.credentials_path().display())
    }

    fn load_credentials_from_file(&self) -> Result<Vec<Credential>> {
        let path = self.credentials_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).context("Failed to read credentials file")?;
        let credentials: Vec<Credential> =
            serde_json::from_str(&content).context("Failed to parse credentials file")?;
        tracing::debug!("Loaded {} credentials from file", credentials.len());
        Ok(credentials)
    }

    fn save_credentials_to_file(&self, credentials: &[Credential]) -> Result<()> {
        let json = serde_json::to_string(credentials).context("Failed to serialize credentials")?;
        write_replace(&self.credentials_path(), json.as_bytes(), true)
            .context("Failed to write credentials file")?;
        tracing::debug!("Saved {} credentials to file", credentials.len());
        Ok(())
    }

    fn load_session_from_file(&self) -> Result<SessionState> {
        let path = self.session_path();
        if !path.exists() {
            tracing::debug!("No session file found, using defaults");
            return Ok(SessionState::default());
        }
        let content = fs::read_to_string(&path).context("Failed to read session file")?;
        serde_json::from_str(&content).context("Failed to parse session file")
    }
}

// ============================================================================
// Keyring-backed credential list (optional, platform-specific)
// ============================================================================

#[cfg(feature = "keyring-storage")]
impl FileStore {
    fn keyring_entry() -> Result<Entry> {
        Entry::new(KEYRING_SERVICE, KEYRING_USER)
            .map_err(|e| anyhow::anyhow!("Failed to create keyring entry: {}", e))
    }

    fn load_credentials_from_keyring(&self) -> Result<Vec<Credential>> {
        let entry = match Self::keyring_entry() {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("{}, trying file fallback", e);
                return self.load_credentials_from_file();
            }
        };

        match entry.get_password() {
            Ok(json) => {
                tracing::debug!("Credentials loaded from keyring");
                serde_json::from_str(&json).context("Failed to parse credentials from keyring")
            }
            Err(keyring::Error::NoEntry) => {
                tracing::debug!("No credentials in keyring, trying file fallback");
                self.load_credentials_from_file()
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to load credentials from keyring: {}, trying file fallback",
                    e
                );
                self.load_credentials_from_file()
            }
        }
    }

    fn save_credentials_to_keyring(&self, credentials: &[Credential]) -> Result<()> {
        let entry = match Self::keyring_entry() {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("{}, using file storage", e);
                return self.save_credentials_to_file(credentials);
            }
        };

        let json = serde_json::to_string(credentials).context("Failed to serialize credentials")?;
        if let Err(e) = entry.set_password(&json) {
            tracing::warn!("Failed to save credentials to keyring: {}, using file storage", e);
            return self.save_credentials_to_file(credentials);
        }

        // A stale fallback file would shadow the keyring if it ever became unavailable.
        let path = self.credentials_path();
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!("Failed to delete fallback credentials file: {}", e);
            }
        }
        Ok(())
    }
}

impl StateStore for FileStore {
    fn get_credentials(&self) -> Result<Vec<Credential>> {
        #[cfg(feature = "keyring-storage")]
        {
            if self.use_keyring {
                return self.load_credentials_from_keyring();
            }
        }
        self.load_credentials_from_file()
    }

    fn save_credentials(&self, credentials: &[Credential]) -> Result<()> {
        #[cfg(feature = "keyring-storage")]
        {
            if self.use_keyring {
                return self.save_credentials_to_keyring(credentials);
            }
        }
        self.save_credentials_to_file(credentials)
    }

    fn get_session_state(&self) -> Result<SessionState> {
        self.load_session_from_file()
    }

    fn set_session_state(&self, patch: SessionPatch) -> Result<()> {
        let lock = open_lock_file(&self.data_dir.join(SESSION_LOCK_FILE))?;
        lock.lock_exclusive().context("Failed to lock session state")?;
        let mut state = self.load_session_from_file().unwrap_or_else(|e| {
            tracing::warn!("Discarding unreadable session file: {:#}", e);
            SessionState::default()
        });
        state.apply(patch);
        let json = serde_json::to_string_pretty(&state).context("Failed to serialize session")?;
        write_replace(&self.session_path(), json.as_bytes(), false)
            .context("Failed to write session file")
    }
}

/// Write `contents` to a fresh temp file next to `path`, then rename it into place.
fn write_replace(path: &Path, contents: &[u8], private: bool) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    // NamedTempFile is created 0600 on Unix.
    let mut tmp = NamedTempFile::new_in(parent)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if !private {
            tmp.as_file().set_permissions(fs::Permissions::from_mode(0o644))?;
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create data directory")?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file {}", path.display()))
}
