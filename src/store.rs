//! Persistence of the credential record.
//!
//! The client never reads storage itself. Whoever builds a `Client` loads the record through a
//! `CredentialStore` and hands it over.

use crate::client_error::ClientError;
use crate::credentials::{Credentials, CredentialsUpdate};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

const APP_DIR: &str = "zoho-books";
const CONFIG_FILE: &str = "config.json";

/// Load and save a single credential record.
pub trait CredentialStore {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<Credentials>, ClientError>;

    fn save(&self, credentials: &Credentials) -> Result<(), ClientError>;

    /// Remove the record. Deleting an empty store is not an error.
    fn delete(&self) -> Result<(), ClientError>;
}

/// Apply a partial update to the stored record, creating it if needed.
pub fn update<S: CredentialStore + ?Sized>(
    store: &S,
    update: CredentialsUpdate,
) -> Result<Credentials, ClientError> {
    let mut credentials = store.load()?.unwrap_or_default();
    credentials.merge(update);
    store.save(&credentials)?;

    Ok(credentials)
}

/// JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> FileStore {
        FileStore { path: path.into() }
    }

    /// `<config dir>/zoho-books/config.json`, e.g. `~/.config/zoho-books/config.json` on Linux.
    pub fn default_path() -> Result<PathBuf, ClientError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
            .ok_or_else(|| ClientError::from("Could not determine the configuration directory"))
    }

    pub fn open_default() -> Result<FileStore, ClientError> {
        Ok(FileStore::new(FileStore::default_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileStore {
    fn load(&self) -> Result<Option<Credentials>, ClientError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %self.path.display(), "loaded credentials");

        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, credentials: &Credentials) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&self.path, serde_json::to_string_pretty(credentials)?)?;
        restrict_permissions(&self.path)?;

        debug!(path = %self.path.display(), "saved credentials");

        Ok(())
    }

    fn delete(&self) -> Result<(), ClientError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), ClientError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), ClientError> {
    Ok(())
}

/// Record kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<Credentials>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn with(credentials: Credentials) -> MemoryStore {
        MemoryStore {
            record: Mutex::new(Some(credentials)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Credentials>>, ClientError> {
        self.record
            .lock()
            .map_err(|_| ClientError::from("Credential store lock poisoned"))
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Result<Option<Credentials>, ClientError> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<(), ClientError> {
        *self.lock()? = Some(credentials.clone());

        Ok(())
    }

    fn delete(&self) -> Result<(), ClientError> {
        *self.lock()? = None;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{update, CredentialStore, FileStore, MemoryStore};
    use crate::credentials::{Credentials, CredentialsUpdate};

    fn creds() -> Credentials {
        Credentials::new("org", "id", "secret", "refresh")
    }

    #[test]
    fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("config.json"));

        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn file_store_saves_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("config.json"));

        store.save(&creds()).unwrap();

        assert_eq!(store.load().unwrap(), Some(creds()));
    }

    #[cfg(unix)]
    #[test]
    fn file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("config.json"));
        store.save(&creds()).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("config.json"));

        store.save(&creds()).unwrap();
        store.delete().unwrap();
        store.delete().unwrap();

        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(FileStore::new(path).load().is_err());
    }

    #[test]
    fn update_creates_missing_record() {
        let store = MemoryStore::new();

        let saved = update(
            &store,
            CredentialsUpdate {
                organization_id: Some(String::from("org")),
                ..CredentialsUpdate::default()
            },
        )
        .unwrap();

        assert_eq!(saved.organization_id, "org");
        assert!(!saved.is_complete());
        assert_eq!(store.load().unwrap(), Some(saved));
    }

    #[test]
    fn update_keeps_other_fields() {
        let store = MemoryStore::with(creds());

        update(
            &store,
            CredentialsUpdate {
                refresh_token: Some(String::from("new-refresh")),
                ..CredentialsUpdate::default()
            },
        )
        .unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.refresh_token, "new-refresh");
        assert_eq!(loaded.client_secret, "secret");
    }
}
