use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock, RwLockWriteGuard};
use tracing::{debug, info, warn};

use super::credentials::{CredentialRecord, CredentialStore, MemoryCredentialStore};
use crate::api::error::SESSION_EXPIRED_MESSAGE;
use crate::models::UserProfile;

/// Capacity of the session event channel. Slow subscribers lag rather than
/// block transitions.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Snapshot of the client's authentication state.
///
/// Token and user are held as one optional pair, so one is present exactly
/// when the other is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    credentials: Option<CredentialRecord>,
    last_error: Option<String>,
}

impl Session {
    pub fn token(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.token.as_str())
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.credentials.as_ref().map(|c| &c.user)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    /// True when the last transition was an expiry rather than a logout.
    pub fn is_expired(&self) -> bool {
        !self.is_authenticated() && self.last_error() == Some(SESSION_EXPIRED_MESSAGE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    /// A login or registration is in flight and no credentials are held yet.
    Authenticating,
    Authenticated,
}

/// Broadcast once per real transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn(UserProfile),
    LoggedOut,
    /// The API rejected the session's token.
    Expired,
}

/// A write to the credential store following an in-memory transition.
enum StoreOp {
    Save(CredentialRecord),
    Clear,
}

struct Inner {
    session: RwLock<Session>,
    store: Arc<dyn CredentialStore>,
    /// Held from the end of a transition until its store write finishes, so
    /// store writes land in transition order.
    store_order: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
    authenticating: AtomicUsize,
}

/// The application's single session, shared by the session manager, the
/// request gateway and the route guard. Cloning is cheap and every clone
/// refers to the same session.
///
/// Mutation is crate-private: views read snapshots and subscribe to events.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Inner>,
}

impl SharedSession {
    /// Create a session from whatever the credential store holds.
    ///
    /// A record that fails to load is discarded and the session starts empty.
    pub fn hydrate(store: Arc<dyn CredentialStore>) -> Self {
        let credentials = match store.load() {
            Ok(Some(record)) if !record.token.is_empty() => {
                info!(username = %record.user.username, "Restored saved session");
                Some(record)
            }
            Ok(Some(_)) => {
                warn!("Saved session has an empty token, discarding");
                Self::discard(store.as_ref());
                None
            }
            Ok(None) => {
                debug!("No saved session");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to load saved session, discarding");
                Self::discard(store.as_ref());
                None
            }
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                session: RwLock::new(Session {
                    credentials,
                    last_error: None,
                }),
                store,
                store_order: Mutex::new(()),
                events,
                authenticating: AtomicUsize::new(0),
            }),
        }
    }

    /// An empty session backed by a process-local store.
    pub fn in_memory() -> Self {
        Self::hydrate(Arc::new(MemoryCredentialStore::new()))
    }

    fn discard(store: &dyn CredentialStore) {
        if let Err(e) = store.clear() {
            warn!(error = %e, "Failed to clear saved session");
        }
    }

    pub async fn snapshot(&self) -> Session {
        self.inner.session.read().await.clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.inner.session.read().await.token().map(str::to_string)
    }

    pub async fn state(&self) -> SessionState {
        let authenticated = self.inner.session.read().await.is_authenticated();
        if authenticated {
            SessionState::Authenticated
        } else if self.inner.authenticating.load(Ordering::SeqCst) > 0 {
            SessionState::Authenticating
        } else {
            SessionState::Unauthenticated
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Mark a login/registration attempt as in flight until the guard drops.
    pub(crate) fn begin_authentication(&self) -> AuthenticatingGuard {
        self.inner.authenticating.fetch_add(1, Ordering::SeqCst);
        AuthenticatingGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Install freshly issued credentials, replacing any current session.
    pub(crate) async fn establish(&self, record: CredentialRecord) {
        let user = record.user.clone();
        let mut session = self.inner.session.write().await;
        session.credentials = Some(record.clone());
        session.last_error = None;
        self.persist(session, StoreOp::Save(record)).await;
        info!(username = %user.username, "Session established");
        self.emit(SessionEvent::LoggedIn(user));
    }

    /// Clear the session and the stored record. Returns whether a session
    /// was actually held.
    pub(crate) async fn clear(&self) -> bool {
        let mut session = self.inner.session.write().await;
        let had_session = session.credentials.take().is_some();
        session.last_error = None;
        self.persist(session, StoreOp::Clear).await;
        if had_session {
            info!("Session cleared");
            self.emit(SessionEvent::LoggedOut);
        }
        had_session
    }

    /// End the session because the API rejected `token`.
    ///
    /// Only takes effect while the session still holds that same token, so
    /// any number of concurrent rejections of one token invalidate it once,
    /// and a late rejection cannot end a newer session.
    pub(crate) async fn invalidate(&self, token: &str) -> bool {
        let mut session = self.inner.session.write().await;
        if session.token() != Some(token) {
            debug!("Session already invalidated or replaced");
            return false;
        }
        session.credentials = None;
        session.last_error = Some(SESSION_EXPIRED_MESSAGE.to_string());
        self.persist(session, StoreOp::Clear).await;
        info!("Session expired");
        self.emit(SessionEvent::Expired);
        true
    }

    /// Drop all state without emitting events.
    pub(crate) async fn reset(&self) {
        let mut session = self.inner.session.write().await;
        *session = Session::default();
        self.persist(session, StoreOp::Clear).await;
    }

    /// Release the session lock, then apply `op` to the credential store on
    /// the blocking pool. Readers never wait on file or keychain I/O.
    async fn persist(&self, session: RwLockWriteGuard<'_, Session>, op: StoreOp) {
        let _order = self.inner.store_order.lock().await;
        drop(session);

        let store = Arc::clone(&self.inner.store);
        let result = tokio::task::spawn_blocking(move || match op {
            StoreOp::Save(record) => store.save(&record),
            StoreOp::Clear => store.clear(),
        })
        .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %format!("{:#}", e), "Failed to update saved session"),
            Err(e) => warn!(error = %e, "Credential store task failed"),
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

/// Drop guard returned by `SharedSession::begin_authentication`.
pub(crate) struct AuthenticatingGuard {
    inner: Arc<Inner>,
}

impl Drop for AuthenticatingGuard {
    fn drop(&mut self) {
        self.inner.authenticating.fetch_sub(1, Ordering::SeqCst);
    }
}
