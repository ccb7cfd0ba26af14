//! Backup Automation REST Server
//!
//! Axum-based REST API for the multi-database backup orchestration engine.
//!
//! Security features:
//! - Shared-secret bearer authentication (constant-time comparison)
//! - Restrictive CORS policy
//! - Security headers on every response
//! - Sanitized error responses for internal failures

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{info, warn};

use backup_core::{BackupError, OperationLock, Store};

mod handlers;
mod scheduler;

pub use scheduler::{start_runner, RunnerConfig as SchedulerRunnerConfig};

/// Authorization header for bearer-token auth.
const AUTHORIZATION_HEADER: &str = "authorization";

/// REST server configuration.
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Shared secret every request's `Authorization: Bearer <token>` must match.
    /// `None` disables auth entirely (local development only).
    pub auth_token: Option<String>,
    /// Allowed CORS origins; empty means same-origin only.
    pub allowed_origins: Vec<String>,
}

/// Shared application state.
pub struct AppState {
    pub store: Arc<Store>,
    pub lock: Arc<OperationLock>,
    pub notifier: Arc<dyn backup_core::Notifier>,
    pub config: ServerConfig,
}

/// Bearer-token auth middleware. Compares the provided token against the
/// configured shared secret in constant time; a missing `auth_token`
/// disables the check (local dev), matching the teacher's `require_auth`
/// escape hatch.
async fn auth_middleware(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let Some(token) = state.config.auth_token.as_ref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "));

    let valid = match provided {
        Some(p) if p.len() == token.len() => p.as_bytes().ct_eq(token.as_bytes()).into(),
        _ => false,
    };

    if valid {
        next.run(request).await
    } else {
        warn!(path = %request.uri().path(), "unauthorized request");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "status": "error", "message": "authentication required" })),
        )
            .into_response()
    }
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Build the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let automation_routes = Router::new()
        .route("/targets", get(handlers::targets::list).post(handlers::targets::create))
        .route(
            "/targets/:id",
            get(handlers::targets::get)
                .put(handlers::targets::update)
                .delete(handlers::targets::delete),
        )
        .route("/targets/test-connection", post(handlers::targets::test_connection))
        .route(
            "/destinations",
            get(handlers::destinations::list).post(handlers::destinations::create),
        )
        .route(
            "/destinations/:id",
            get(handlers::destinations::get)
                .put(handlers::destinations::update)
                .delete(handlers::destinations::delete),
        )
        .route("/destinations/:id/backups", get(handlers::backups::list))
        .route("/destinations/:id/backups/download", get(handlers::backups::download))
        .route("/destinations/:id/backups/delete", delete(handlers::backups::delete))
        .route(
            "/schedules",
            get(handlers::schedules::list).post(handlers::schedules::create),
        )
        .route(
            "/schedules/:id",
            get(handlers::schedules::get)
                .put(handlers::schedules::update)
                .delete(handlers::schedules::delete),
        )
        .route("/schedules/:id/run-now", post(handlers::schedules::run_now))
        .route("/schedules/run-enabled-now", post(handlers::schedules::run_enabled_now))
        .route("/runner/run-due", post(handlers::schedules::run_due))
        .route("/backup-now", post(handlers::backup::backup_now))
        .route("/restore-now", post(handlers::backup::restore_now))
        .route(
            "/runs",
            get(handlers::runs::list),
        )
        .route(
            "/runs/:id",
            get(handlers::runs::get).delete(handlers::runs::delete),
        )
        .route("/audit", get(handlers::audit::list))
        .route("/audit/:id", get(handlers::audit::get));

    let cors = if state.config.allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/automation", automation_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'"),
        ))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Start the server, bootstrapping the runner loop when `RUNNER_MODE=api`.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16, runner: Option<backup_core::RunnerConfig>) -> anyhow::Result<()> {
    if state.config.auth_token.is_none() {
        warn!("authentication disabled - BACKUP_AUTH_TOKEN not set, do not expose to a network");
    }

    if let Some(runner_config) = runner {
        if runner_config.mode == backup_core::RunnerMode::Api {
            scheduler::start_runner(state.store.clone(), state.lock.clone(), state.notifier.clone(), runner_config);
        }
    }

    let app = create_router(state);
    let addr = format!("{host}:{port}");
    info!("starting server at http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Error handling
// ============================================================================

/// Application error type, mapping `BackupError` kinds to HTTP status codes
/// per the error-handling design: each kind carries its own status rather
/// than collapsing to a generic 500.
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: msg.into(), internal: None }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: msg.into(), internal: None }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: msg.into(), internal: None }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(err) = &self.internal {
            tracing::error!(error = %err, "internal error");
        }
        let body = Json(serde_json::json!({ "status": "error", "message": self.message }));
        (self.status, body).into_response()
    }
}

impl From<BackupError> for AppError {
    fn from(err: BackupError) -> Self {
        match &err {
            BackupError::NotFound(_) => Self { status: StatusCode::NOT_FOUND, message: err.to_string(), internal: None },
            BackupError::Conflict(_) => Self { status: StatusCode::CONFLICT, message: err.to_string(), internal: None },
            BackupError::Validation(_) | BackupError::EncryptionNotConfigured(_) => {
                Self { status: StatusCode::BAD_REQUEST, message: err.to_string(), internal: None }
            }
            BackupError::CompatibilityReject(_) => {
                Self { status: StatusCode::UNPROCESSABLE_ENTITY, message: err.to_string(), internal: None }
            }
            BackupError::Crypto(_) => Self { status: StatusCode::BAD_REQUEST, message: err.to_string(), internal: None },
            BackupError::AdapterFailure { .. } | BackupError::ProviderFailure(_) => {
                Self { status: StatusCode::BAD_GATEWAY, message: err.to_string(), internal: Some(anyhow::anyhow!(err.to_string())) }
            }
            BackupError::Database(_) | BackupError::Pool(_) | BackupError::Io(_) | BackupError::Json(_) | BackupError::Http(_) => {
                Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: "an internal error occurred".to_string(), internal: Some(anyhow::anyhow!(err.to_string())) }
            }
        }
    }
}

#[cfg(test)]
mod tests;
