//! Persistent credential storage.
//!
//! A small key/value store for the current token pair and user identifier,
//! backed by a JSON file that survives process restarts. The session
//! controller is the sole writer; the HTTP gateway and the session monitor
//! only read through it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Credential file name within the tradelink data directory.
pub const STORE_FILE: &str = "credentials.json";

/// A complete stored credential set.
///
/// The three fields are only ever written and cleared together; a partial
/// set on disk reads back as "not authenticated".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub email: String,
}

/// Errors raised by credential persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("Failed to access credential file: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing the store contents failed.
    #[error("Failed to serialize credentials: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// On-disk key/value layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_email: Option<String>,
    /// Transient pre-authentication broker choice. Namespaced apart from the
    /// credential fields: untouched by [`CredentialStore::clear`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selected_broker: Option<String>,
}

impl StoreFile {
    fn credentials(&self) -> Option<Credentials> {
        match (&self.access_token, &self.refresh_token, &self.user_email) {
            (Some(access_token), Some(refresh_token), Some(email)) => Some(Credentials {
                access_token: access_token.clone(),
                refresh_token: refresh_token.clone(),
                email: email.clone(),
            }),
            _ => None,
        }
    }
}

/// Trait for credential persistence.
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    /// Read the stored credential set. `None` unless all three fields are
    /// present.
    fn load(&self) -> Option<Credentials>;

    /// Persist a complete credential set, replacing all three fields.
    fn save(&self, credentials: &Credentials) -> Result<(), StoreError>;

    /// Replace only the token pair, leaving the user identifier untouched.
    fn update_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), StoreError>;

    /// Remove all three credential fields. Clearing an empty store is a
    /// no-op, never an error.
    fn clear(&self);

    /// Current access token, if any.
    fn access_token(&self) -> Option<String>;

    /// Current refresh token, if any.
    fn refresh_token(&self) -> Option<String>;

    /// Transient pre-authentication broker choice.
    fn selected_broker(&self) -> Option<String>;

    /// Remember the broker picked on the selection screen.
    fn set_selected_broker(&self, broker: &str) -> Result<(), StoreError>;

    /// Forget the broker choice (done on successful authentication).
    fn clear_selected_broker(&self);
}

/// Shared credential store for use across components.
pub type SharedCredentialStore = Arc<dyn CredentialStore>;

/// Default data directory for the on-disk store.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tradelink")
}

// ============================================================================
// FileCredentialStore
// ============================================================================

/// File-backed credential store for production use.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    cache: RwLock<Option<StoreFile>>,
}

impl FileCredentialStore {
    /// Create a store under the given data directory.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(STORE_FILE),
            cache: RwLock::new(None),
        }
    }

    /// Create a store with an explicit file path.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            cache: RwLock::new(None),
        }
    }

    /// Get the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> StoreFile {
        if let Some(cached) = self.cache.read().clone() {
            return cached;
        }

        let loaded = self.read_disk();
        *self.cache.write() = Some(loaded.clone());
        loaded
    }

    fn read_disk(&self) -> StoreFile {
        if !self.path.exists() {
            return StoreFile::default();
        }

        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!("credential file is corrupt, treating as empty: {e}");
                    StoreFile::default()
                }
            },
            Err(e) => {
                tracing::warn!("failed to read credential file: {e}");
                StoreFile::default()
            }
        }
    }

    /// Write-replace the whole file, so the fields on disk are never half
    /// updated.
    fn write(&self, file: StoreFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, json)?;
        *self.cache.write() = Some(file);

        tracing::debug!("credential store written to {}", self.path.display());
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<Credentials> {
        self.read().credentials()
    }

    fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let mut file = self.read();
        file.access_token = Some(credentials.access_token.clone());
        file.refresh_token = Some(credentials.refresh_token.clone());
        file.user_email = Some(credentials.email.clone());
        self.write(file)
    }

    fn update_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), StoreError> {
        let mut file = self.read();
        file.access_token = Some(access_token.to_owned());
        file.refresh_token = Some(refresh_token.to_owned());
        self.write(file)
    }

    fn clear(&self) {
        let mut file = self.read();
        file.access_token = None;
        file.refresh_token = None;
        file.user_email = None;
        if let Err(e) = self.write(file) {
            tracing::warn!("failed to clear stored credentials: {e}");
        }
    }

    fn access_token(&self) -> Option<String> {
        self.read().access_token
    }

    fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token
    }

    fn selected_broker(&self) -> Option<String> {
        self.read().selected_broker
    }

    fn set_selected_broker(&self, broker: &str) -> Result<(), StoreError> {
        let mut file = self.read();
        file.selected_broker = Some(broker.to_owned());
        self.write(file)
    }

    fn clear_selected_broker(&self) {
        let mut file = self.read();
        if file.selected_broker.take().is_some() {
            if let Err(e) = self.write(file) {
                tracing::warn!("failed to clear broker choice: {e}");
            }
        }
    }
}

impl tradelink_client::TokenSource for FileCredentialStore {
    fn access_token(&self) -> Option<String> {
        CredentialStore::access_token(self)
    }

    fn clear(&self) {
        CredentialStore::clear(self)
    }
}

// ============================================================================
// MemoryCredentialStore (for testing)
// ============================================================================

/// In-memory credential store for tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: RwLock<StoreFile>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<Credentials> {
        self.state.read().credentials()
    }

    fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.access_token = Some(credentials.access_token.clone());
        state.refresh_token = Some(credentials.refresh_token.clone());
        state.user_email = Some(credentials.email.clone());
        Ok(())
    }

    fn update_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.access_token = Some(access_token.to_owned());
        state.refresh_token = Some(refresh_token.to_owned());
        Ok(())
    }

    fn clear(&self) {
        let mut state = self.state.write();
        state.access_token = None;
        state.refresh_token = None;
        state.user_email = None;
    }

    fn access_token(&self) -> Option<String> {
        self.state.read().access_token.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.state.read().refresh_token.clone()
    }

    fn selected_broker(&self) -> Option<String> {
        self.state.read().selected_broker.clone()
    }

    fn set_selected_broker(&self, broker: &str) -> Result<(), StoreError> {
        self.state.write().selected_broker = Some(broker.to_owned());
        Ok(())
    }

    fn clear_selected_broker(&self) {
        self.state.write().selected_broker = None;
    }
}

impl tradelink_client::TokenSource for MemoryCredentialStore {
    fn access_token(&self) -> Option<String> {
        CredentialStore::access_token(self)
    }

    fn clear(&self) {
        CredentialStore::clear(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Credentials {
        Credentials {
            access_token: "a.b.c".into(),
            refresh_token: "r1".into(),
            email: "u@x.com".into(),
        }
    }

    #[test]
    fn test_round_trip() {
        let temp = tempdir().unwrap();
        let store = FileCredentialStore::new(temp.path());

        assert_eq!(store.load(), None);

        store.save(&sample()).unwrap();
        assert_eq!(store.load(), Some(sample()));
        assert_eq!(
            CredentialStore::access_token(&store).as_deref(),
            Some("a.b.c")
        );
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));
    }

    #[test]
    fn test_survives_restart() {
        let temp = tempdir().unwrap();

        FileCredentialStore::new(temp.path()).save(&sample()).unwrap();

        // A fresh instance over the same path sees the saved set.
        let reopened = FileCredentialStore::new(temp.path());
        assert_eq!(reopened.load(), Some(sample()));
    }

    #[test]
    fn test_clear_removes_all_three() {
        let temp = tempdir().unwrap();
        let store = FileCredentialStore::new(temp.path());

        store.save(&sample()).unwrap();
        store.set_selected_broker("zerodha").unwrap();
        CredentialStore::clear(&store);

        assert_eq!(store.load(), None);
        assert_eq!(CredentialStore::access_token(&store), None);
        assert_eq!(store.refresh_token(), None);
        // The broker key is namespaced apart and survives.
        assert_eq!(store.selected_broker().as_deref(), Some("zerodha"));

        // Clearing an already-empty store is a no-op.
        CredentialStore::clear(&store);
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_update_tokens_is_partial() {
        let temp = tempdir().unwrap();
        let store = FileCredentialStore::new(temp.path());

        store.save(&sample()).unwrap();
        store.update_tokens("new-access", "new-refresh").unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.access_token, "new-access");
        assert_eq!(loaded.refresh_token, "new-refresh");
        assert_eq!(loaded.email, "u@x.com");
    }

    #[test]
    fn test_partial_state_reads_as_unauthenticated() {
        let store = MemoryCredentialStore::new();

        // Tokens without a user identifier: incomplete.
        store.update_tokens("a.b.c", "r1").unwrap();
        assert_eq!(store.load(), None);
        // The raw keys are still individually readable.
        assert_eq!(
            CredentialStore::access_token(&store).as_deref(),
            Some("a.b.c")
        );
    }

    #[test]
    fn test_corrupt_file_treated_as_empty() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(STORE_FILE);
        std::fs::write(&path, "not json at all").unwrap();

        let store = FileCredentialStore::with_path(path);
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_selected_broker_round_trip() {
        let store = MemoryCredentialStore::new();

        assert_eq!(store.selected_broker(), None);
        store.set_selected_broker("upstox").unwrap();
        assert_eq!(store.selected_broker().as_deref(), Some("upstox"));
        store.clear_selected_broker();
        assert_eq!(store.selected_broker(), None);
    }

    #[test]
    fn test_default_data_dir_is_namespaced() {
        assert!(default_data_dir().ends_with("tradelink"));
    }
}
