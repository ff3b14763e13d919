use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};

use crate::models::UserProfile;

/// Keychain service name
const SERVICE_NAME: &str = "habit-tracker";

/// Keychain account holding the serialized record
const KEYRING_ACCOUNT: &str = "session";

/// The persisted half of a session. Token and user are stored as one unit so
/// a user can never be written without its token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub token: String,
    pub user: UserProfile,
}

/// Durable storage for the current session, surviving restarts.
///
/// Only the session layer writes through this trait.
pub trait CredentialStore: Send + Sync {
    /// Read the stored record, if any.
    fn load(&self) -> Result<Option<CredentialRecord>>;

    /// Replace the stored record.
    fn save(&self, record: &CredentialRecord) -> Result<()>;

    /// Remove the stored record. Succeeds when nothing is stored.
    fn clear(&self) -> Result<()>;
}

/// Stores the record as JSON in a file, by default `session.json` in the data
/// directory.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<CredentialRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .context("Failed to read session file")?;
        let record = serde_json::from_str(&contents)
            .context("Failed to parse session file")?;
        Ok(Some(record))
    }

    fn save(&self, record: &CredentialRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create session directory")?;
        }
        let contents = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, contents).context("Failed to write session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

/// Stores the record in the OS keychain as a single entry.
///
/// The entry is created once and reused, so every operation on one store
/// addresses the same keychain item.
pub struct KeyringCredentialStore {
    entry: Entry,
}

impl KeyringCredentialStore {
    pub fn new() -> Result<Self> {
        Self::with_account(KEYRING_ACCOUNT)
    }

    pub fn with_account(account: &str) -> Result<Self> {
        let entry = Entry::new(SERVICE_NAME, account).context("Failed to create keyring entry")?;
        Ok(Self { entry })
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn load(&self) -> Result<Option<CredentialRecord>> {
        match self.entry.get_password() {
            Ok(secret) => {
                let record = serde_json::from_str(&secret)
                    .context("Failed to parse session from keychain")?;
                Ok(Some(record))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow!(e).context("Failed to retrieve session from keychain")),
        }
    }

    fn save(&self, record: &CredentialRecord) -> Result<()> {
        let secret = serde_json::to_string(record)?;
        self.entry
            .set_password(&secret)
            .context("Failed to store session in keychain")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow!(e).context("Failed to delete session from keychain")),
        }
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryCredentialStore {
    record: Mutex<Option<CredentialRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: CredentialRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<CredentialRecord>>> {
        self.record
            .lock()
            .map_err(|_| anyhow!("Credential store lock poisoned"))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<CredentialRecord>> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, record: &CredentialRecord) -> Result<()> {
        *self.lock()? = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }
}
