use serde::Deserialize;
use thiserror::Error;

/// Shown when a previously valid token is rejected by the API.
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired, please log in again";

/// Shown on a fresh visit to a protected view without a session.
pub const LOGIN_REQUIRED_MESSAGE: &str = "Please log in to continue";

#[derive(Error, Debug)]
pub enum ApiError {
    /// Client-side input failure, raised before any request is sent.
    #[error("{0}")]
    Validation(String),

    /// Login or registration rejected by the API.
    #[error("{0}")]
    Authentication(String),

    #[error("{}", SESSION_EXPIRED_MESSAGE)]
    SessionExpired,

    /// 401/403 on a request that carried no token.
    #[error("{}", LOGIN_REQUIRED_MESSAGE)]
    Unauthenticated,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape returned by the API on 4xx/5xx.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// The `message` field of a JSON error body, if the body is one.
    pub fn body_message(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.trim().is_empty())
    }

    /// Classify a non-success response by status code.
    ///
    /// 401/403 are not handled here: whether they mean an expired session or
    /// a missing one depends on whether the request carried a token, which
    /// only the gateway knows.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::body_message(body).unwrap_or_else(|| Self::truncate_body(body));
        match status.as_u16() {
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            code => ApiError::Rejected {
                status: code,
                message,
            },
        }
    }

    /// True for failures that end the current session.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }

    /// Message suitable for showing to the user next to the failed action.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Validation(m) | ApiError::Authentication(m) => m.clone(),
            ApiError::SessionExpired => SESSION_EXPIRED_MESSAGE.to_string(),
            ApiError::Unauthenticated => LOGIN_REQUIRED_MESSAGE.to_string(),
            ApiError::NotFound(m) | ApiError::ServerError(m) | ApiError::Rejected { message: m, .. }
                if !m.is_empty() =>
            {
                m.clone()
            }
            ApiError::RateLimited => "Too many requests, please try again shortly".to_string(),
            ApiError::Network(e) if e.is_timeout() => {
                "The server took too long to respond, please try again".to_string()
            }
            ApiError::Network(_) => "Could not reach the server, please try again".to_string(),
            _ => "Something went wrong, please try again".to_string(),
        }
    }
}
