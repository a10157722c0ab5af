//! REST API for external integrations.
//!
//! Stateless from the server's side: every request carries the caller's
//! refresh token as `user_token` and gets its own backend session. The rate
//! limiter is shared by all requests.
//!
//! Routes:
//! - GET  /                     service info
//! - GET  /health               liveness
//! - POST /api/workspace-index  whole workspace tree + stats
//! - POST /api/search           title/content search
//! - POST /api/note             create a note
//! - GET  /api/note/{id}        read a note
//! - GET  /api/recent-notes     recently edited notes

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::app_state::AppState;
use crate::commands::{CreateNote, SearchNotes, DEFAULT_COLOR};
use crate::db::Note;
use crate::error::{DeskflowError, DeskflowResult};
use crate::index::WorkspaceIndex;
use crate::rate_limit::{Access, RateLimiter};
use crate::settings::Settings;
use crate::utils::validate_id;

const NOTE_COLUMNS: &str = "id, title, content, desktop_id, color, updated_at, created_at";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builds the per-request `AppState` for a caller's refresh token.
pub type Connector = Arc<dyn Fn(&str) -> DeskflowResult<AppState> + Send + Sync>;

#[derive(Clone)]
struct ApiState {
    connect: Connector,
}

impl ApiState {
    fn session(&self, user_token: &str) -> Result<AppState, AppError> {
        if user_token.trim().is_empty() {
            return Err(AppError(StatusCode::BAD_REQUEST, "user_token is required".to_string()));
        }
        Ok((self.connect)(user_token)?)
    }
}

// ============================================================================
// Error type
// ============================================================================

struct AppError(StatusCode, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({"error": self.1}))).into_response()
    }
}

impl From<DeskflowError> for AppError {
    fn from(e: DeskflowError) -> Self {
        let status = match &e {
            DeskflowError::Validation(_) => StatusCode::BAD_REQUEST,
            DeskflowError::NotFound(_) => StatusCode::NOT_FOUND,
            DeskflowError::Authentication(_) => StatusCode::UNAUTHORIZED,
            DeskflowError::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            DeskflowError::Backend(_) => StatusCode::BAD_GATEWAY,
            DeskflowError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(kind = e.kind(), error = %e, "request failed");
        }
        AppError(status, e.to_string())
    }
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Deserialize)]
struct WorkspaceIndexRequest {
    user_token: String,
    workspace_id: Option<String>,
    #[serde(default)]
    include_content: bool,
}

fn default_search_limit() -> i64 {
    20
}

#[derive(Deserialize)]
struct SearchRequest {
    user_token: String,
    workspace_id: String,
    query: String,
    #[serde(default = "default_search_limit")]
    limit: i64,
}

#[derive(Deserialize)]
struct CreateNoteRequest {
    user_token: String,
    desktop_id: String,
    title: String,
    #[serde(default)]
    content: String,
    color: Option<String>,
}

#[derive(Deserialize)]
struct TokenQuery {
    user_token: String,
}

#[derive(Deserialize)]
struct RecentNotesQuery {
    user_token: String,
    workspace_id: Option<String>,
    limit: Option<i64>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn root_handler() -> Json<Value> {
    Json(json!({
        "service": "DeskFlow API",
        "version": VERSION,
        "endpoints": [
            "GET /health",
            "POST /api/workspace-index",
            "POST /api/search",
            "POST /api/note",
            "GET /api/note/{id}",
            "GET /api/recent-notes",
        ],
    }))
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "deskflow"}))
}

async fn workspace_index_handler(
    State(api): State<ApiState>,
    Json(req): Json<WorkspaceIndexRequest>,
) -> Result<Json<WorkspaceIndex>, AppError> {
    let state = api.session(&req.user_token)?;
    let index = state
        .get_workspace_index(req.workspace_id.as_deref(), req.include_content)
        .await?;
    tracing::info!(
        workspace_id = %index.workspace.id,
        desktops = index.stats.desktops,
        notes = index.stats.notes,
        "workspace index served"
    );
    Ok(Json(index))
}

async fn search_handler(
    State(api): State<ApiState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Value>, AppError> {
    let state = api.session(&req.user_token)?;
    let results = state
        .search_notes(SearchNotes {
            workspace_id: req.workspace_id,
            query: req.query,
            limit: Some(req.limit),
            include_content: false,
        })
        .await?;
    // Counts the results returned after the limit, not every match.
    Ok(Json(json!({"count": results.len(), "results": results})))
}

async fn create_note_handler(
    State(api): State<ApiState>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<Json<Value>, AppError> {
    let state = api.session(&req.user_token)?;
    let mut input = CreateNote::new(req.desktop_id, req.title);
    input.content = Some(req.content);
    input.color = Some(req.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()));
    let note = state.create_note(input).await?;
    Ok(Json(json!({"success": true, "note": note})))
}

async fn get_note_handler(
    State(api): State<ApiState>,
    Path(id): Path<String>,
    Query(q): Query<TokenQuery>,
) -> Result<Json<Note>, AppError> {
    let state = api.session(&q.user_token)?;
    state.guard(Access::Read)?;
    validate_id("note_id", &id)?;
    Ok(Json(state.fetch_note(&id, NOTE_COLUMNS).await?))
}

async fn recent_notes_handler(
    State(api): State<ApiState>,
    Query(q): Query<RecentNotesQuery>,
) -> Result<Json<Value>, AppError> {
    let state = api.session(&q.user_token)?;
    let notes = state.get_recent_notes(q.workspace_id.as_deref(), q.limit).await?;
    Ok(Json(json!({"count": notes.len(), "notes": notes})))
}

// ============================================================================
// Router
// ============================================================================

/// Router backed by the remote store described by `settings`.
pub fn router(settings: Arc<Settings>, limiter: Arc<RateLimiter>) -> Router {
    let connect: Connector =
        Arc::new(move |token: &str| AppState::connect(settings.clone(), limiter.clone(), token));
    router_with(connect)
}

pub fn router_with(connect: Connector) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/workspace-index", post(workspace_index_handler))
        .route("/api/search", post(search_handler))
        .route("/api/note", post(create_note_handler))
        .route("/api/note/{id}", get(get_note_handler))
        .route("/api/recent-notes", get(recent_notes_handler))
        .layer(CorsLayer::permissive())
        .with_state(ApiState { connect })
}
