use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::credentials::CredentialRecord;
use super::session::{Session, SessionEvent, SessionState, SharedSession};
use crate::api::{ApiError, Gateway};
use crate::models::UserProfile;

/// Shortest password accepted at registration.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Cheapest authenticated endpoint, used to check a token is still accepted.
const VERIFY_PATH: &str = "/habits";

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
    username: Option<String>,
    email: Option<String>,
}

/// Outcome of [`SessionManager::verify`] that is not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// The API accepted the current token.
    Verified,
    /// There is no session to verify.
    Unauthenticated,
}

/// The only authority for session transitions.
///
/// Login and registration are atomic: the session changes only once the API
/// has issued a token, and a failed attempt leaves it exactly as it was.
#[derive(Clone)]
pub struct SessionManager {
    session: SharedSession,
    gateway: Gateway,
}

impl SessionManager {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            session: gateway.session().clone(),
            gateway,
        }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub async fn snapshot(&self) -> Session {
        self.session.snapshot().await
    }

    pub async fn state(&self) -> SessionState {
        self.session.state().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    /// Log in with a username or email.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<UserProfile, ApiError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ApiError::Validation("Username or email is required".to_string()));
        }
        if password.is_empty() {
            return Err(ApiError::Validation("Password is required".to_string()));
        }

        // Identifiers may be email addresses; only the username is logged, once known.
        info!("Logging in");
        let _authenticating = self.session.begin_authentication();
        let auth = self
            .authenticate("/login", &LoginRequest { identifier, password }, LOGIN_FAILED)
            .await?;

        let user = match (auth.username, auth.email) {
            (Some(username), Some(email)) => UserProfile { username, email },
            _ => {
                return Err(ApiError::InvalidResponse(
                    "login response is missing the user profile".to_string(),
                ))
            }
        };

        self.session
            .establish(CredentialRecord {
                token: auth.token,
                user: user.clone(),
            })
            .await;
        Ok(user)
    }

    /// Create an account and log into it.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        let username = username.trim();
        let email = email.trim();
        validate_registration(username, email, password)?;

        info!(username = %username, "Registering");
        let _authenticating = self.session.begin_authentication();
        let auth = self
            .authenticate(
                "/register",
                &RegisterRequest {
                    username,
                    email,
                    password,
                },
                REGISTRATION_FAILED,
            )
            .await?;

        // Registration responses may carry only the token.
        let user = UserProfile {
            username: auth.username.unwrap_or_else(|| username.to_string()),
            email: auth.email.unwrap_or_else(|| email.to_string()),
        };

        self.session
            .establish(CredentialRecord {
                token: auth.token,
                user: user.clone(),
            })
            .await;
        Ok(user)
    }

    /// End the session. Safe to call at any time, any number of times.
    pub async fn logout(&self) {
        if !self.session.clear().await {
            debug!("Logout with no active session");
        }
    }

    /// Check that the API still accepts the current token.
    ///
    /// A rejected token ends the session with the "session expired" message
    /// and is returned as `ApiError::SessionExpired`. Network and server
    /// failures leave the session untouched.
    pub async fn verify(&self) -> Result<Verification, ApiError> {
        if self.session.token().await.is_none() {
            debug!("No session to verify");
            return Ok(Verification::Unauthenticated);
        }

        match self.gateway.execute::<()>(Method::GET, VERIFY_PATH, None).await {
            Ok(()) => {
                debug!("Session verified");
                Ok(Verification::Verified)
            }
            // Logged out while the request was being prepared.
            Err(ApiError::Unauthenticated) => Ok(Verification::Unauthenticated),
            Err(e) => Err(e),
        }
    }

    /// Drop the session and stored credentials without notifying
    /// subscribers.
    pub async fn reset(&self) {
        self.session.reset().await;
    }

    async fn authenticate<B: Serialize>(&self, path: &str, body: &B, fallback: &str) -> Result<AuthResponse, ApiError> {
        let response = self.gateway.post_public(path, body).await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(path = path, status = status.as_u16(), "Authentication rejected");
            let message = ApiError::body_message(&text).unwrap_or_else(|| fallback.to_string());
            return Err(ApiError::Authentication(message));
        }

        let auth: AuthResponse = Gateway::parse(response).await?;
        if auth.token.is_empty() {
            return Err(ApiError::InvalidResponse("empty token in response".to_string()));
        }
        Ok(auth)
    }
}

fn validate_registration(username: &str, email: &str, password: &str) -> Result<(), ApiError> {
    if username.is_empty() {
        return Err(ApiError::Validation("Username is required".to_string()));
    }
    if email.is_empty() {
        return Err(ApiError::Validation("Email is required".to_string()));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => return Err(ApiError::Validation("Please enter a valid email address".to_string())),
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}
