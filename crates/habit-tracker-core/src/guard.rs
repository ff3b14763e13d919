//! Navigation gating for views that need a signed-in user.
//!
//! The guard is consulted on every navigation, not once at start-up: a
//! session can expire while the user is moving between views.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::api::error::{LOGIN_REQUIRED_MESSAGE, SESSION_EXPIRED_MESSAGE};
use crate::api::ApiError;
use crate::auth::{Session, SessionManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// `/`, which shows the login view.
    Home,
    Login,
    Register,
    Dashboard,
    Analysis,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::Register => "/register",
            Route::Dashboard => "/dashboard",
            Route::Analysis => "/analysis",
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, Route::Dashboard | Route::Analysis)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" => Ok(Route::Home),
            "/login" => Ok(Route::Login),
            "/register" => Ok(Route::Register),
            "/dashboard" => Ok(Route::Dashboard),
            "/analysis" => Ok(Route::Analysis),
            _ => Err(format!("no route for '{}'", path)),
        }
    }
}

/// Why navigation was sent to the login view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    NotLoggedIn,
    SessionExpired,
}

impl RedirectReason {
    fn for_session(session: &Session) -> Self {
        if session.is_expired() {
            RedirectReason::SessionExpired
        } else {
            RedirectReason::NotLoggedIn
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            RedirectReason::NotLoggedIn => LOGIN_REQUIRED_MESSAGE,
            RedirectReason::SessionExpired => SESSION_EXPIRED_MESSAGE,
        }
    }

    /// The request error carrying the same message.
    pub fn to_error(&self) -> ApiError {
        match self {
            RedirectReason::NotLoggedIn => ApiError::Unauthenticated,
            RedirectReason::SessionExpired => ApiError::SessionExpired,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Allow(Route),
    Redirect { to: Route, reason: RedirectReason },
}

impl Navigation {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Navigation::Allow(_))
    }

    /// The route actually shown.
    pub fn route(&self) -> Route {
        match self {
            Navigation::Allow(route) => *route,
            Navigation::Redirect { to, .. } => *to,
        }
    }
}

#[derive(Clone)]
pub struct RouteGuard {
    sessions: SessionManager,
}

impl RouteGuard {
    pub fn new(sessions: SessionManager) -> Self {
        Self { sessions }
    }

    /// Decide from the current session alone, without contacting the API.
    pub async fn check(&self, target: Route) -> Navigation {
        let session = self.sessions.snapshot().await;
        Self::decide(target, &session)
    }

    /// Navigate to `target`, verifying the session with the API first when
    /// the route is protected and a session is held.
    ///
    /// A network or server failure during verification keeps the session and
    /// lets navigation proceed; only a rejected token redirects.
    pub async fn enter(&self, target: Route) -> Navigation {
        if target.requires_auth() {
            match self.sessions.verify().await {
                Ok(outcome) => debug!(route = %target, ?outcome, "Verified on entry"),
                Err(ApiError::SessionExpired) => {}
                Err(e) => warn!(route = %target, error = %e, "Could not verify session, using cached state"),
            }
        }
        self.check(target).await
    }

    /// Navigate to `target` and run its first request, letting that request
    /// stand in for verification.
    ///
    /// A route the cached session cannot enter fails with the redirect's
    /// error and sends nothing. A rejected token on `request` ends the
    /// session through the gateway and surfaces as `SessionExpired`.
    pub async fn load<T, F, Fut>(&self, target: Route, request: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if let Navigation::Redirect { reason, .. } = self.check(target).await {
            return Err(reason.to_error());
        }
        request().await
    }

    fn decide(target: Route, session: &Session) -> Navigation {
        if !target.requires_auth() || session.is_authenticated() {
            return Navigation::Allow(target);
        }
        let reason = RedirectReason::for_session(session);
        debug!(route = %target, ?reason, "Redirecting to login");
        Navigation::Redirect {
            to: Route::Login,
            reason,
        }
    }
}
