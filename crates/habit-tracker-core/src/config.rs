//! Application configuration management.
//!
//! The config file holds the API base URL, the last identifier used to log
//! in, which credential store to use and the request timeout. It lives at
//! `~/.config/habit-tracker/config.json`; the `HABIT_TRACKER_API_URL`
//! environment variable overrides the file's base URL.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::api::gateway::DEFAULT_TIMEOUT_SECS;
use crate::auth::{CredentialStore, FileCredentialStore, KeyringCredentialStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "habit-tracker";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

/// Environment variable supplying the API base URL
pub const API_URL_ENV: &str = "HABIT_TRACKER_API_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub last_identifier: Option<String>,
    #[serde(default)]
    pub credential_backend: CredentialBackend,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Where the file credential store keeps the session.
    pub fn session_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(SESSION_FILE))
    }

    /// API base URL, from the environment first and the config file second.
    pub fn api_base_url(&self) -> Result<String> {
        let env = std::env::var(API_URL_ENV).ok();
        resolve_api_base_url(env.as_deref(), self.api_base_url.as_deref())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// The credential store selected by `credential_backend`.
    pub fn credential_store(&self) -> Result<Arc<dyn CredentialStore>> {
        Ok(match self.credential_backend {
            CredentialBackend::File => Arc::new(FileCredentialStore::new(self.session_path()?)),
            CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new()?),
        })
    }
}

fn resolve_api_base_url(env: Option<&str>, file: Option<&str>) -> Result<String> {
    [env, file]
        .into_iter()
        .flatten()
        .map(|url| url.trim().trim_end_matches('/'))
        .find(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            anyhow!(
                "No API base URL configured. Set {} or api_base_url in the config file.",
                API_URL_ENV
            )
        })
}
