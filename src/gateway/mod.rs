//! Axum-based HTTP gateway.
//!
//! Routes:
//! - `GET  /status`                         liveness, account and session counts
//! - `POST /register`                       `{username, password}`
//! - `POST /login`                          `{username, password}` -> `{token}`
//! - `POST /logout`                         revoke the presented token
//! - `POST /upload/{filename}/{timestamp}`  raw body, `Authorization: Token <hex>`
//!
//! Handlers only validate shape and serialize; all blocking work (SQLite,
//! bcrypt, file writes) runs on the blocking pool.

pub mod error;
pub mod validate;

pub use error::ApiError;
pub use validate::{CredentialRules, ValidationError};

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AccountRegistrar, CredentialStore, PasswordHasher, SessionAuthenticator};
use crate::config::Config;
use crate::upload::{UploadIngestor, UploadTarget};

/// How often expired sessions are swept from memory.
const SESSION_SWEEP_INTERVAL_SECS: u64 = 60;

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CredentialStore>,
    pub registrar: Arc<AccountRegistrar>,
    pub sessions: Arc<SessionAuthenticator>,
    pub ingestor: Arc<UploadIngestor>,
    pub rules: CredentialRules,
}

impl AppState {
    /// Wire the components together around one credential store and hasher.
    pub fn new(
        store: Arc<CredentialStore>,
        hasher: Arc<PasswordHasher>,
        session_ttl: Option<Duration>,
        ingestor: UploadIngestor,
        rules: CredentialRules,
    ) -> Self {
        Self {
            registrar: Arc::new(AccountRegistrar::new(Arc::clone(&store), Arc::clone(&hasher))),
            sessions: Arc::new(SessionAuthenticator::new(
                Arc::clone(&store),
                hasher,
                session_ttl,
            )),
            store,
            ingestor: Arc::new(ingestor),
            rules,
        }
    }

    /// Open the credential store and build state from `config`.
    /// Schema bootstrap failure is fatal.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = CredentialStore::open(&config.storage.database).with_context(|| {
            format!(
                "opening credential store {}",
                config.storage.database.display()
            )
        })?;
        let ttl = (config.auth.session_ttl_secs > 0)
            .then(|| Duration::from_secs(config.auth.session_ttl_secs));

        Ok(Self::new(
            Arc::new(store),
            Arc::new(PasswordHasher::new(config.auth.bcrypt_cost)),
            ttl,
            UploadIngestor::new(
                config.storage.store_root.clone(),
                config.storage.collision,
                config.storage.timezone,
            ),
            CredentialRules::from(&config.auth),
        ))
    }
}

/// Build the router with body-limit, timeout and trace layers.
pub fn router(state: AppState, max_upload_bytes: usize, request_timeout: Duration) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/register", post(handle_register))
        .route("/login", post(handle_login))
        .route("/logout", post(handle_logout))
        .route("/upload", post(handle_upload_without_target))
        .route("/upload/{*target}", post(handle_upload))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP gateway until Ctrl-C.
pub async fn run_gateway(config: Config) -> Result<()> {
    let state = AppState::from_config(&config)?;
    std::fs::create_dir_all(&config.storage.store_root).with_context(|| {
        format!(
            "creating store root {}",
            config.storage.store_root.display()
        )
    })?;

    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        store_root = %config.storage.store_root.display(),
        collision = ?config.storage.collision,
        "Gateway listening"
    );

    let sessions = Arc::clone(&state.sessions);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SESSION_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let removed = sessions.sweep_expired();
            if removed > 0 {
                tracing::debug!(removed, "Swept expired sessions");
            }
        }
    });

    let app = router(
        state,
        config.gateway.max_upload_bytes,
        Duration::from_secs(config.gateway.request_timeout_secs),
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Could not listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

/// Request body for register and login.
#[derive(Deserialize)]
struct CredentialsBody {
    username: String,
    password: String,
}

/// Run blocking core work off the async workers.
async fn blocking<T, E, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(Into::into),
        Err(e) => Err(ApiError::internal("request failed", &e)),
    }
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(b)| b)
        .map_err(|e| ApiError::bad_request(format!("problem parsing request: {}", e.body_text())))
}

/// Token from `Authorization: Token <hex>` (or `Bearer <hex>`).
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    (scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer"))
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

/// GET /status
async fn handle_status(State(state): State<AppState>) -> ApiResult {
    let store = Arc::clone(&state.store);
    let accounts = blocking(move || store.account_count()).await?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "accounts": accounts,
        "sessions": state.sessions.session_count(),
    })))
}

/// POST /register
async fn handle_register(
    State(state): State<AppState>,
    body: Result<Json<CredentialsBody>, JsonRejection>,
) -> ApiResult {
    let body = parse_body(body)?;
    let username = state.rules.check(&body.username, &body.password)?.to_string();

    let registrar = Arc::clone(&state.registrar);
    blocking(move || registrar.register(&username, &body.password)).await?;

    Ok(Json(serde_json::json!({ "status": "registered" })))
}

/// POST /login
async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<CredentialsBody>, JsonRejection>,
) -> ApiResult {
    let body = parse_body(body)?;
    let username = body.username.trim().to_string();

    let sessions = Arc::clone(&state.sessions);
    let token = blocking(move || sessions.login(&username, &body.password)).await?;

    Ok(Json(serde_json::json!({ "token": token })))
}

/// POST /logout
async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let token = extract_token(&headers)
        .ok_or_else(|| ApiError::bad_request("token authorization only supported"))?;
    if !state.sessions.logout(token) {
        return Err(ApiError::bad_request("please login"));
    }
    Ok(Json(serde_json::json!({ "status": "logged_out" })))
}

/// POST /upload/{filename}/{timestamp}
async fn handle_upload(
    State(state): State<AppState>,
    Path(target): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let token = extract_token(&headers)
        .ok_or_else(|| ApiError::bad_request("token authorization only supported"))?;
    let username = state
        .sessions
        .authenticate(token)
        .ok_or_else(|| ApiError::bad_request("please login"))?;
    let target = UploadTarget::from_segments(&target)?;

    let ingestor = Arc::clone(&state.ingestor);
    let stored = blocking(move || ingestor.ingest(&target, &username, &body[..])).await?;

    Ok(Json(serde_json::json!({
        "status": "stored",
        "path": stored.relative,
    })))
}

/// POST /upload with no target in the path.
async fn handle_upload_without_target() -> ApiError {
    ApiError::bad_request("expected /upload/<filename>/<timestamp>")
}
