//! Client core for the personal habit tracker.
//!
//! - `auth`: session lifecycle (login, registration, logout, verification)
//!   and durable credential storage
//! - `api`: the authenticated request gateway and the typed habit client
//! - `guard`: navigation gating for protected views
//! - `config`: API base URL, credential backend and other settings
//!
//! [`HabitTracker`] wires them together around one shared session.

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod models;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

pub use api::{ApiError, Gateway, HabitApi};
pub use auth::{
    CredentialRecord, CredentialStore, Session, SessionEvent, SessionManager, SessionState,
    SharedSession, Verification,
};
pub use config::Config;
pub use guard::{Navigation, RedirectReason, Route, RouteGuard};
pub use models::{Activity, Analysis, Frequency, Habit, HabitDraft, HabitId, UserProfile};

/// Everything a view needs, built once at start-up around a single session.
/// Clone is cheap; all clones share the session.
#[derive(Clone)]
pub struct HabitTracker {
    pub sessions: SessionManager,
    pub habits: HabitApi,
    pub guard: RouteGuard,
}

impl HabitTracker {
    /// Hydrate the session from `store` and connect to `base_url`.
    pub fn new(base_url: &str, timeout: Duration, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let session = SharedSession::hydrate(store);
        let gateway = Gateway::new(base_url, timeout, session)?;
        let sessions = SessionManager::new(gateway.clone());
        Ok(Self {
            habits: HabitApi::new(gateway),
            guard: RouteGuard::new(sessions.clone()),
            sessions,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let base_url = config.api_base_url()?;
        let store = config.credential_store()?;
        Ok(Self::new(&base_url, config.request_timeout(), store)?)
    }

    pub fn session(&self) -> &SharedSession {
        self.sessions.session()
    }
}
