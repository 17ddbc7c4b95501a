//! REST API for the retirement advisor
//!
//! Thin axum layer over [`SessionManager`]. Every response uses the
//! `ApiResponse` envelope.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AdvisorError;
use crate::profile::ProfileField;
use crate::session::{CalculationRequest, SessionManager};

//
// ================= Request Models =================
//

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    /// Defaults to the pending question's field
    #[serde(default)]
    pub field: Option<ProfileField>,
    pub value: Value,
}

//
// ================= Response Wrapper =================
//

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn ok<T: Serialize>(data: T) -> ApiResult {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

fn respond<T: Serialize>(result: crate::Result<T>) -> ApiResult {
    match result {
        Ok(data) => ok(data),
        Err(e) => failure(e),
    }
}

fn failure(error: AdvisorError) -> ApiResult {
    let status = match &error {
        AdvisorError::SessionNotFound(_) | AdvisorError::CalculationNotFound(_) => StatusCode::NOT_FOUND,
        AdvisorError::Validation(_) | AdvisorError::State(_) => StatusCode::BAD_REQUEST,
        AdvisorError::Domain(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("API request failed: {}", error);
    }
    (status, Json(ApiResponse::error(error.to_string())))
}

//
// ================= API State =================
//

#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<SessionManager>,
}

//
// ================= Handlers =================
//

async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "sessions": state.manager.session_count().await,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn create_session(State(state): State<ApiState>) -> ApiResult {
    let reply = state.manager.create_session().await;
    (StatusCode::CREATED, Json(ApiResponse::success(reply)))
}

async fn get_session(State(state): State<ApiState>, Path(id): Path<Uuid>) -> ApiResult {
    respond(state.manager.snapshot(id).await)
}

async fn delete_session(State(state): State<ApiState>, Path(id): Path<Uuid>) -> ApiResult {
    respond(
        state
            .manager
            .remove_session(id)
            .await
            .map(|_| serde_json::json!({ "session_id": id })),
    )
}

async fn post_message(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<MessageRequest>,
) -> ApiResult {
    if req.content.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Message content is empty".into())),
        );
    }
    respond(state.manager.handle_message(id, &req.content).await)
}

async fn post_answer(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AnswerRequest>,
) -> ApiResult {
    respond(state.manager.answer(id, req.field, &req.value).await)
}

async fn post_skip(State(state): State<ApiState>, Path(id): Path<Uuid>) -> ApiResult {
    respond(state.manager.skip(id).await)
}

async fn post_skip_to_calculation(State(state): State<ApiState>, Path(id): Path<Uuid>) -> ApiResult {
    respond(state.manager.skip_to_calculation(id).await)
}

async fn post_start_over(State(state): State<ApiState>, Path(id): Path<Uuid>) -> ApiResult {
    respond(state.manager.start_over(id).await)
}

async fn post_calculation(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CalculationRequest>,
) -> ApiResult {
    info!(session_id = %id, calculation_type = %request.calculation_type(), "Calculation requested");
    respond(state.manager.request_calculation(id, request).await)
}

async fn get_history(State(state): State<ApiState>, Path(id): Path<Uuid>) -> ApiResult {
    respond(state.manager.history(id).await)
}

async fn get_replay(
    State(state): State<ApiState>,
    Path((id, result_id)): Path<(Uuid, Uuid)>,
) -> ApiResult {
    respond(state.manager.replay(id, result_id).await)
}

//
// ================= Router =================
//

pub fn create_router(manager: Arc<SessionManager>) -> Router {
    let state = ApiState { manager };

    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/messages", post(post_message))
        .route("/api/sessions/:id/answer", post(post_answer))
        .route("/api/sessions/:id/skip", post(post_skip))
        .route("/api/sessions/:id/skip-to-calculation", post(post_skip_to_calculation))
        .route("/api/sessions/:id/start-over", post(post_start_over))
        .route("/api/sessions/:id/calculations", post(post_calculation))
        .route("/api/sessions/:id/calculations/:result_id/replay", get(get_replay))
        .route("/api/sessions/:id/history", get(get_history))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

//
// ================= Server Startup =================
//

pub async fn start_server(
    manager: Arc<SessionManager>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(manager);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
