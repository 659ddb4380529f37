// src/api/mod.rs
// `POST /turn`, `POST /sessions/{id}/clear`, `GET /sessions/{id}` on top
// of the turn pipeline. CORS and rate limiting are handled upstream of
// this service, so only the `trace` feature of `tower-http` is used here.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::{CoreError, ErrorPayload};
use crate::turn::{CorePipeline, TurnRequest, TurnResponse};

pub type SharedPipeline = Arc<CorePipeline>;

pub fn router(pipeline: SharedPipeline) -> axum::Router {
    axum::Router::new()
        .route("/turn", post(turn_handler))
        .route("/sessions/{session_id}/clear", post(clear_handler))
        .route("/sessions/{session_id}", get(describe_handler))
        .route("/admin/reload-prompts", post(reload_prompts_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

#[derive(Debug, Deserialize)]
pub struct TurnBody {
    pub message: String,
    pub user_id: String,
    pub session_id: String,
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default)]
    pub stream: bool,
}

fn default_workspace() -> String {
    "default".to_string()
}

impl From<TurnBody> for TurnRequest {
    fn from(body: TurnBody) -> Self {
        TurnRequest {
            message: body.message,
            user_id: body.user_id,
            session_id: body.session_id,
            workspace: body.workspace,
            stream: body.stream,
        }
    }
}

async fn turn_handler(
    State(pipeline): State<SharedPipeline>,
    Json(body): Json<TurnBody>,
) -> Result<Json<TurnResponse>, ApiError> {
    let response = pipeline.run_turn(body.into()).await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ClearResponse {
    session_id: String,
    cleared: bool,
}

async fn clear_handler(
    State(pipeline): State<SharedPipeline>,
    Path(session_id): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    pipeline.clear_session(&session_id).await?;
    Ok(Json(ClearResponse {
        session_id,
        cleared: true,
    }))
}

async fn describe_handler(
    State(pipeline): State<SharedPipeline>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let summary = pipeline.describe_session(&session_id).await?;
    match summary {
        Some(summary) => Ok(Json(serde_json::to_value(summary).unwrap_or(serde_json::Value::Null))),
        None => Err(ApiError(CoreError::not_found(format!("session {session_id}")))),
    }
}

#[derive(Debug, Serialize)]
struct ReloadPromptsResponse {
    reloaded: bool,
}

/// Reloads the prompt registry this running process actually serves from
/// (spec §4.7: "Reloading is triggered explicitly... without restarting
/// the process"). Unlike a CLI verb that builds its own throwaway
/// registry, this mutates the `Arc<PromptRegistry>` the expert runtime
/// already holds, so the next turn picks up the new templates.
async fn reload_prompts_handler(
    State(pipeline): State<SharedPipeline>,
) -> Result<Json<ReloadPromptsResponse>, ApiError> {
    pipeline.prompts.reload()?;
    Ok(Json(ReloadPromptsResponse { reloaded: true }))
}

/// Wraps `CoreError` so axum can turn it into `{kind, message, retryable}`
/// plus a status code describing the failure class rather than leaking
/// exception text.
struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload: ErrorPayload = self.0.to_payload();
        let status = match payload.kind {
            crate::error::ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            crate::error::ErrorKind::Busy => StatusCode::CONFLICT,
            crate::error::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            crate::error::ErrorKind::Conflict => StatusCode::CONFLICT,
            crate::error::ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
            crate::error::ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
            crate::error::ErrorKind::SchemaMismatch => StatusCode::UNPROCESSABLE_ENTITY,
            crate::error::ErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
            crate::error::ErrorKind::Cancelled => StatusCode::from_u16(499).unwrap(),
            crate::error::ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(payload)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_body_defaults_workspace() {
        let body: TurnBody = serde_json::from_str(
            r#"{"message": "hi", "user_id": "u1", "session_id": "s1"}"#,
        )
        .unwrap();
        assert_eq!(body.workspace, "default");
        assert!(!body.stream);
    }
}
