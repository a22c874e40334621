//! JSON HTTP API.
//!
//! Wraps the [`Responder`] and the conversation store behind a small set of
//! routes. Identity arrives in the `x-user-email` header and must name a
//! registered user; authenticating that header is the job of whatever
//! fronts this server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/signup` | Register `{firstname, email, password_hash}` |
//! | `POST` | `/chat` | Answer `{query, session_id?, domain?}` |
//! | `POST` | `/sessions/new` | Mint and register a session id |
//! | `POST` | `/sessions/history` | Full history and timestamps of `{session_id}` |
//! | `POST` | `/sessions/list` | Sessions of the user in the domain, oldest first |
//! | `POST` | `/sessions/delete` | Delete `{session_id}`, or every session when omitted |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! The domain of a request is the body's `domain` field when it names a
//! configured domain, else the first configured domain found in the
//! `Referer` path, else the default domain.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "index_unavailable", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `conflict` (409),
//! `internal` (500), `generation_failed` (502), `index_unavailable` (503).

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::domain::DomainMap;
use crate::embedding::create_embedder;
use crate::error::{AnswerError, UserError};
use crate::generation::create_generator;
use crate::migrate;
use crate::models::{Message, SessionKey, SessionSummary};
use crate::registry::IndexRegistry;
use crate::responder::Responder;
use crate::store::{new_session_id, SqliteConversationStore};
use crate::users::{create_user, find_user, normalize_email};

/// Header carrying the caller's email.
pub const USER_HEADER: &str = "x-user-email";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    responder: Arc<Responder>,
    pool: SqlitePool,
}

impl AppState {
    pub fn new(responder: Arc<Responder>, pool: SqlitePool) -> Self {
        Self { responder, pool }
    }

    fn domains(&self) -> &DomainMap {
        self.responder.registry().domains()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/signup", post(handle_signup))
        .route("/chat", post(handle_chat))
        .route("/sessions/new", post(handle_new_session))
        .route("/sessions/history", post(handle_session_history))
        .route("/sessions/list", post(handle_list_sessions))
        .route("/sessions/delete", post(handle_delete_session))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve on an already-bound listener until the process stops.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Wire every component from configuration and serve on `[server].bind`.
pub async fn run_server(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate(&pool).await?;

    let embedder = create_embedder(&config.embedding)?;
    let generator = create_generator(&config.generation)?;
    let registry = Arc::new(IndexRegistry::new(DomainMap::from_config(config), embedder));
    let store = Arc::new(SqliteConversationStore::new(pool.clone()));
    let responder = Arc::new(Responder::new(
        registry,
        store,
        generator,
        &config.retrieval,
    ));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "listening");
    println!("IntelliSphere server listening on http://{}", config.server.bind);
    serve(listener, AppState::new(responder, pool)).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn unauthorized() -> AppError {
    AppError::new(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "Please log in to continue",
    )
}

fn internal(err: impl std::fmt::Display) -> AppError {
    tracing::error!(error = %err, "request failed");
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string())
}

impl From<AnswerError> for AppError {
    fn from(err: AnswerError) -> Self {
        match err {
            AnswerError::EmptyQuery => bad_request(err.to_string()),
            AnswerError::IndexUnavailable { .. } => AppError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "index_unavailable",
                err.to_string(),
            ),
            AnswerError::Generation { .. } => {
                AppError::new(StatusCode::BAD_GATEWAY, "generation_failed", err.to_string())
            }
            AnswerError::Retrieval { .. } | AnswerError::Store { .. } => internal(err),
        }
    }
}

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::MissingField(_) => bad_request(err.to_string()),
            UserError::EmailExists(_) => {
                AppError::new(StatusCode::CONFLICT, "conflict", "Email already exists")
            }
            UserError::Database(_) => internal(err),
        }
    }
}

// ============ Request helpers ============

/// The registered caller named by the identity header.
async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<String, AppError> {
    let email = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(normalize_email)
        .filter(|e| !e.is_empty())
        .ok_or_else(unauthorized)?;

    match find_user(&state.pool, &email).await? {
        Some(user) => Ok(user.email),
        None => Err(unauthorized()),
    }
}

fn request_domain(state: &AppState, headers: &HeaderMap, client: Option<&str>) -> String {
    let referrer = headers.get(header::REFERER).and_then(|v| v.to_str().ok());
    state.domains().resolve_request_domain(client, referrer)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /signup ============

#[derive(Deserialize)]
struct SignupRequest {
    #[serde(default)]
    firstname: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password_hash: String,
}

#[derive(Serialize)]
struct SignupResponse {
    success: bool,
    email: String,
}

async fn handle_signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), AppError> {
    let user = create_user(&state.pool, &req.firstname, &req.email, &req.password_hash).await?;
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            success: true,
            email: user.email,
        }),
    ))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    domain: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    domain: String,
    session_id: String,
    response: String,
    history: Vec<Message>,
}

async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let user = current_user(&state, &headers).await?;
    let domain = request_domain(&state, &headers, req.domain.as_deref());
    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(new_session_id);

    let answer = state
        .responder
        .answer(&user, &domain, &session_id, &req.query)
        .await?;

    Ok(Json(ChatResponse {
        domain: answer.domain,
        session_id: answer.session_id,
        response: answer.bot_text,
        history: answer.history,
    }))
}

// ============ POST /sessions/* ============

#[derive(Deserialize)]
struct SessionRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    domain: Option<String>,
}

#[derive(Serialize)]
struct NewSessionResponse {
    success: bool,
    domain: String,
    session_id: String,
}

async fn handle_new_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SessionRequest>,
) -> Result<Json<NewSessionResponse>, AppError> {
    let user = current_user(&state, &headers).await?;
    let domain = request_domain(&state, &headers, req.domain.as_deref());
    let session_id = new_session_id();

    state
        .responder
        .store()
        .create(&SessionKey::new(&user, &domain, &session_id))
        .await
        .map_err(internal)?;

    Ok(Json(NewSessionResponse {
        success: true,
        domain,
        session_id,
    }))
}

#[derive(Serialize)]
struct HistoryResponse {
    domain: String,
    session_id: String,
    history: Vec<Message>,
    /// `null` when the session does not exist.
    created_at: Option<DateTime<Utc>>,
    last_updated: Option<DateTime<Utc>>,
}

async fn handle_session_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SessionRequest>,
) -> Result<Json<HistoryResponse>, AppError> {
    let user = current_user(&state, &headers).await?;
    let domain = request_domain(&state, &headers, req.domain.as_deref());
    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| bad_request("session_id is required"))?;

    let session = state
        .responder
        .store()
        .get_session(&SessionKey::new(&user, &domain, &session_id))
        .await
        .map_err(internal)?;

    Ok(Json(match session {
        Some(s) => HistoryResponse {
            domain,
            session_id,
            history: s.messages,
            created_at: Some(s.created_at),
            last_updated: Some(s.last_updated),
        },
        None => HistoryResponse {
            domain,
            session_id,
            history: Vec::new(),
            created_at: None,
            last_updated: None,
        },
    }))
}

#[derive(Serialize)]
struct ListResponse {
    domain: String,
    sessions: Vec<SessionSummary>,
}

async fn handle_list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SessionRequest>,
) -> Result<Json<ListResponse>, AppError> {
    let user = current_user(&state, &headers).await?;
    let domain = request_domain(&state, &headers, req.domain.as_deref());
    let sessions = state
        .responder
        .store()
        .list_sessions(&user, &domain)
        .await
        .map_err(internal)?;
    Ok(Json(ListResponse { domain, sessions }))
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    deleted: u64,
}

async fn handle_delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SessionRequest>,
) -> Result<Json<DeleteResponse>, AppError> {
    let user = current_user(&state, &headers).await?;
    let domain = request_domain(&state, &headers, req.domain.as_deref());
    let session_id = req.session_id.filter(|s| !s.trim().is_empty());

    let deleted = state
        .responder
        .store()
        .delete(&user, &domain, session_id.as_deref())
        .await
        .map_err(internal)?;

    Ok(Json(DeleteResponse {
        success: true,
        deleted,
    }))
}
