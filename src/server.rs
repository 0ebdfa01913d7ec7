//! HTTP tool server.
//!
//! Exposes the tool registry over a JSON API:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call any registered tool by name |
//! | `GET`  | `/api/stats` | Store and sync statistics |
//! | `POST` | `/api/reindex` | Rebuild missing/stale embedding vectors |
//! | `POST` | `/api/resync` | Clear the local mirror and re-pull everything |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "'query' is required" } }
//! ```
//!
//! Codes: `bad_request` (400), `configuration_error` (400), `not_found`
//! (404), `upstream_unavailable` (502), `embedding_failed` (502),
//! `internal` (500).
//!
//! # Authentication
//!
//! When `[server].auth_username` and `auth_password` are both set, every
//! endpoint requires HTTP basic auth. Unauthenticated requests get a 401
//! with a `WWW-Authenticate` challenge.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::Error;
use crate::tools::{ToolContext, ToolInfo, ToolRegistry};

#[derive(Clone)]
struct AppState {
    ctx: Arc<ToolContext>,
    tools: Arc<ToolRegistry>,
}

/// Run the HTTP server until the process is terminated.
pub async fn run_server(ctx: Arc<ToolContext>) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let auth_enabled = ctx.config.server.auth_enabled();

    let state = AppState {
        ctx,
        tools: Arc::new(ToolRegistry::builtin()),
    };

    for t in state.tools.tools() {
        info!("registered tool: POST /tools/{}", t.name());
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/health", get(handle_health))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/api/stats", get(handle_stats))
        .route("/api/reindex", post(handle_reindex))
        .route("/api/resync", post(handle_resync))
        .with_state(state.clone());

    if auth_enabled {
        app = app.layer(middleware::from_fn_with_state(state, basic_auth));
    }
    let app = app.layer(cors);

    info!("listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
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

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
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

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::Configuration(_) => (StatusCode::BAD_REQUEST, "configuration_error"),
            Error::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_unavailable"),
            Error::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_failed"),
            Error::Db(_) | Error::Io(_) | Error::Json(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

// ============ Basic auth ============

async fn basic_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let expected = match (
        &state.ctx.config.server.auth_username,
        &state.ctx.config.server.auth_password,
    ) {
        (Some(user), Some(pass)) => format!("{}:{}", user, pass),
        _ => return Ok(next.run(request).await),
    };

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if authorization_matches(header_value, &expected) {
        Ok(next.run(request).await)
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"context-mirror\"")],
            Json(ErrorBody {
                error: ErrorDetail {
                    code: "unauthorized".to_string(),
                    message: "basic auth required".to_string(),
                },
            }),
        )
            .into_response())
    }
}

fn authorization_matches(header_value: Option<&str>, expected: &str) -> bool {
    header_value
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| base64::engine::general_purpose::STANDARD.decode(encoded).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .map(|credentials| credentials == expected)
        .unwrap_or(false)
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

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters_schema(),
        })
        .collect();

    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let result = tool.execute(params, &state.ctx).await?;
    Ok(Json(serde_json::json!({ "result": result })))
}

// ============ GET /api/stats ============

#[derive(Serialize)]
struct StatsResponse {
    content_count: i64,
    tag_count: i64,
    sources: Vec<crate::models::SourceCount>,
    sync: Vec<crate::models::SyncState>,
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let store = &state.ctx.store;
    Ok(Json(StatsResponse {
        content_count: store.content_count().await?,
        tag_count: store.tag_count().await?,
        sources: store.list_by_source().await?,
        sync: store.sync_states().await?,
    }))
}

// ============ POST /api/reindex ============

async fn handle_reindex(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let stats = crate::reindex::reindex(&state.ctx.store, state.ctx.embedder.as_ref()).await?;
    Ok(Json(serde_json::json!({
        "deleted": stats.deleted,
        "embedded": stats.embedded,
        "failed": stats.failed,
    })))
}

// ============ POST /api/resync ============

async fn handle_resync(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.ctx.orchestrator.full_resync().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "content_count": state.ctx.store.content_count().await?,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(credentials: &str) -> String {
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }

    #[test]
    fn test_valid_credentials_accepted() {
        let header = encode("alice:s3cret");
        assert!(authorization_matches(Some(&header), "alice:s3cret"));
    }

    #[test]
    fn test_wrong_password_rejected() {
        let header = encode("alice:wrong");
        assert!(!authorization_matches(Some(&header), "alice:s3cret"));
    }

    #[test]
    fn test_missing_and_malformed_headers_rejected() {
        assert!(!authorization_matches(None, "alice:s3cret"));
        assert!(!authorization_matches(Some("Bearer token"), "alice:s3cret"));
        assert!(!authorization_matches(Some("Basic not-base64!!"), "alice:s3cret"));
    }

    #[test]
    fn test_error_mapping() {
        let app: AppError = Error::NotFound("content x".to_string()).into();
        assert_eq!(app.status, StatusCode::NOT_FOUND);
        assert_eq!(app.code, "not_found");

        let app: AppError = Error::Upstream("timeout".to_string()).into();
        assert_eq!(app.status, StatusCode::BAD_GATEWAY);
        assert_eq!(app.code, "upstream_unavailable");

        let app: AppError = Error::InvalidArgument("'query' is required".to_string()).into();
        assert_eq!(app.status, StatusCode::BAD_REQUEST);
        assert_eq!(app.code, "bad_request");
    }
}
