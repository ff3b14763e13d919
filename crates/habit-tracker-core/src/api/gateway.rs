//! The single point every API request passes through.
//!
//! Authenticated requests carry the session's bearer token; a 401/403 on such
//! a request ends the session once and is reported as `SessionExpired`.
//! Public requests (login, registration) never carry a token and are never
//! intercepted.

use std::time::Duration;

use reqwest::{header, Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::SharedSession;

/// HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct Gateway {
    client: Client,
    base_url: String,
    session: SharedSession,
    initial_backoff: Duration,
}

impl Gateway {
    pub fn new(base_url: &str, timeout: Duration, session: SharedSession) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Shorten the rate-limit backoff, for tests against a local server.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST to an endpoint that needs no credentials.
    ///
    /// Non-success responses are returned as-is for the caller to classify.
    pub(crate) async fn post_public<B: Serialize>(&self, path: &str, body: &B) -> Result<Response, ApiError> {
        let url = self.url(path);
        debug!(url = %url, "Sending unauthenticated request");
        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;
        Ok(response)
    }

    /// Send an authenticated request, returning the successful response.
    ///
    /// The token is read afresh for every attempt, so a rate-limit retry
    /// after a logout goes out without one. A rejection invalidates the token
    /// that the rejected attempt actually carried.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let token = self.session.token().await;
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header(header::ACCEPT, "application/json");
            match token {
                Some(ref token) => request = request.bearer_auth(token),
                None => debug!(url = %url, "No session token, sending unauthenticated"),
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(url = %url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                continue;
            }

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                warn!(url = %url, status = status.as_u16(), "Request rejected as unauthorized");
                return match token {
                    Some(ref token) => {
                        self.session.invalidate(token).await;
                        Err(ApiError::SessionExpired)
                    }
                    None => Err(ApiError::Unauthenticated),
                };
            }

            let text = response.text().await.unwrap_or_default();
            debug!(url = %url, status = status.as_u16(), "Request failed");
            return Err(ApiError::from_status(status, &text));
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send::<()>(Method::GET, path, None).await?;
        Self::parse(response).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let response = self.send(Method::POST, path, Some(body)).await?;
        Self::parse(response).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let response = self.send(Method::PUT, path, Some(body)).await?;
        Self::parse(response).await
    }

    /// Send a request whose response body is ignored.
    pub async fn execute<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: Option<&B>) -> Result<(), ApiError> {
        self.send(method, path, body).await?;
        Ok(())
    }

    pub(crate) async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let url = response.url().to_string();
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{} from {}", e, url)))
    }
}
