//! In-process stand-in for the habit tracker API, used by unit tests.
//!
//! Accepted credentials: `alice` / `correct-pw` (token `t1`). Tokens `t1` and
//! anything starting with `t-` are valid; every other token is rejected
//! with 401.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

use axum::extract::{Path, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

/// Route keyring entries to keyring's in-memory mock instead of the OS
/// keychain. Mock credentials live only as long as their `Entry`.
pub fn use_mock_keyring() {
    static MOCK: Once = Once::new();
    MOCK.call_once(|| keyring::set_default_credential_builder(keyring::mock::default_credential_builder()));
}

/// Collects formatted log lines from a scoped subscriber.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// A debug-level subscriber writing into this capture; install it with
    /// `tracing::subscriber::set_default`.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(self.clone())
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[derive(Default)]
struct Recorded {
    hits: HashMap<String, usize>,
    last_authorization: Option<String>,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Recorded>>);

impl Recorder {
    fn record(&self, uri: &Uri, headers: &HeaderMap) -> Option<String> {
        let authorization = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let mut recorded = self.0.lock().unwrap();
        *recorded.hits.entry(uri.path().to_string()).or_default() += 1;
        recorded.last_authorization = authorization.clone();
        authorization
    }

    /// Record the request and check its bearer token.
    fn authorize(&self, uri: &Uri, headers: &HeaderMap) -> Result<(), Response> {
        let authorization = self.record(uri, headers);
        let token = authorization
            .as_deref()
            .and_then(|v| v.strip_prefix("Bearer "));
        match token {
            Some(t) if t == "t1" || t.starts_with("t-") => Ok(()),
            _ => Err(error(StatusCode::UNAUTHORIZED, "Invalid token")),
        }
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

pub struct StubApi {
    pub base_url: String,
    recorder: Recorder,
}

impl StubApi {
    pub async fn spawn() -> Self {
        let recorder = Recorder::default();
        let app = Router::new()
            .route("/login", post(login))
            .route("/register", post(register))
            .route("/habits", get(list_habits).post(create_habit))
            .route(
                "/habits/:id",
                get(habit_resource).put(update_habit).delete(delete_habit),
            )
            .route("/habits/:id/log", post(log_activity))
            .route("/habits/:id/history", get(history))
            .route("/busy", get(busy))
            .with_state(recorder.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("stub listener should bind");
        let addr = listener.local_addr().expect("stub address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub server");
        });

        Self {
            base_url: format!("http://{}", addr),
            recorder,
        }
    }

    pub fn hits(&self, path: &str) -> usize {
        self.recorder.0.lock().unwrap().hits.get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.recorder.0.lock().unwrap().hits.values().sum()
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.recorder.0.lock().unwrap().last_authorization.clone()
    }
}

async fn login(State(rec): State<Recorder>, uri: Uri, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    rec.record(&uri, &headers);
    let identifier = body["identifier"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    match (identifier, password) {
        ("alice" | "a@x.com", "correct-pw") => {
            Json(json!({ "token": "t1", "username": "alice", "email": "a@x.com" })).into_response()
        }
        ("noprofile", _) => Json(json!({ "token": "t-noprofile" })).into_response(),
        ("blank", _) => {
            Json(json!({ "token": "", "username": "blank", "email": "b@x.com" })).into_response()
        }
        ("crash", _) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        _ => error(StatusCode::UNAUTHORIZED, "Invalid credentials"),
    }
}

async fn register(State(rec): State<Recorder>, uri: Uri, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    rec.record(&uri, &headers);
    let username = body["username"].as_str().unwrap_or_default();
    if username == "taken" {
        return error(StatusCode::BAD_REQUEST, "Username already exists");
    }
    (StatusCode::CREATED, Json(json!({ "token": format!("t-{}", username) }))).into_response()
}

fn habits() -> Value {
    json!([
        { "id": 1, "name": "Run", "description": "5k", "frequency": "daily", "streak": 4 },
        { "id": 2, "name": "Read", "description": null, "frequency": "weekly", "streak": 0 }
    ])
}

async fn list_habits(State(rec): State<Recorder>, uri: Uri, headers: HeaderMap) -> Response {
    if let Err(denied) = rec.authorize(&uri, &headers) {
        return denied;
    }
    Json(habits()).into_response()
}

async fn create_habit(State(rec): State<Recorder>, uri: Uri, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(denied) = rec.authorize(&uri, &headers) {
        return denied;
    }
    let mut habit = body;
    habit["id"] = json!(3);
    habit["streak"] = json!(0);
    (StatusCode::CREATED, Json(habit)).into_response()
}

async fn habit_resource(State(rec): State<Recorder>, Path(id): Path<String>, uri: Uri, headers: HeaderMap) -> Response {
    if id == "forbidden" {
        rec.record(&uri, &headers);
        return error(StatusCode::FORBIDDEN, "Forbidden");
    }
    if let Err(denied) = rec.authorize(&uri, &headers) {
        return denied;
    }
    if id != "analysis" {
        return error(StatusCode::NOT_FOUND, "Habit not found");
    }
    Json(json!({
        "habits": [
            { "id": 1, "name": "Run", "total_activities": 6 },
            { "id": 2, "name": "Read", "total_activities": 0 }
        ],
        "trends": { "labels": ["Mon", "Tue", "Wed"], "data": { "1": [2, 3, 1] } }
    }))
    .into_response()
}

async fn update_habit(
    State(rec): State<Recorder>,
    Path(id): Path<i64>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(denied) = rec.authorize(&uri, &headers) {
        return denied;
    }
    if id != 1 && id != 2 {
        return error(StatusCode::NOT_FOUND, "Habit not found");
    }
    let mut habit = body;
    habit["id"] = json!(id);
    habit["streak"] = json!(4);
    Json(habit).into_response()
}

async fn delete_habit(State(rec): State<Recorder>, Path(id): Path<i64>, uri: Uri, headers: HeaderMap) -> Response {
    if let Err(denied) = rec.authorize(&uri, &headers) {
        return denied;
    }
    if id != 1 && id != 2 {
        return error(StatusCode::NOT_FOUND, "Habit not found");
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn log_activity(State(rec): State<Recorder>, Path(_id): Path<i64>, uri: Uri, headers: HeaderMap) -> Response {
    if let Err(denied) = rec.authorize(&uri, &headers) {
        return denied;
    }
    (StatusCode::CREATED, Json(json!({ "message": "Activity logged" }))).into_response()
}

async fn history(State(rec): State<Recorder>, Path(id): Path<i64>, uri: Uri, headers: HeaderMap) -> Response {
    if let Err(denied) = rec.authorize(&uri, &headers) {
        return denied;
    }
    if id == 999 {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "History unavailable");
    }
    Json(json!([
        { "id": 10, "completed_at": "2024-03-01T08:30:00Z" },
        { "id": 11, "completed_at": "2024-03-02T07:15:00.250" }
    ]))
    .into_response()
}

async fn busy(State(rec): State<Recorder>, uri: Uri, headers: HeaderMap) -> Response {
    rec.record(&uri, &headers);
    error(StatusCode::TOO_MANY_REQUESTS, "Slow down")
}
