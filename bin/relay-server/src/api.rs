//! HTTP API
//!
//! Every response uses the `{"status", "timestamp", ...}` envelope.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use relay_common::{Message, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use relay_outbox::{MessageService, SchedulerState, ServiceError};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::error;

pub const VALIDATION_ERR_CODE: &str = "validation_failed";
pub const BODY_PARSER_ERR_CODE: &str = "body_parser_failed";
pub const UNEXPECTED_ERR_CODE: &str = "unexpected_error";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MessageService>,
}

fn timestamp() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub status: &'static str,
    pub timestamp: i64,
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            status: "success",
            timestamp: timestamp(),
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub timestamp: i64,
    pub error: ErrorBody,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BodyParser(String),

    #[error("{0}")]
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation(v) => ApiError::Validation(v.to_string()),
            ServiceError::Store(s) => ApiError::Internal(s.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BodyParser(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, VALIDATION_ERR_CODE, msg),
            ApiError::BodyParser(msg) => (StatusCode::BAD_REQUEST, BODY_PARSER_ERR_CODE, msg),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    UNEXPECTED_ERR_CODE,
                    "An unexpected error has occurred.".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            status: "error",
            timestamp: timestamp(),
            error: ErrorBody { code, message },
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub state: &'static str,
}

impl From<SchedulerState> for ControlResponse {
    fn from(state: SchedulerState) -> Self {
        let state = match state {
            SchedulerState::Running => "started",
            SchedulerState::Stopped => "stopped",
        };
        Self { state }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub to: String,
    pub content: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/messages", post(create_message))
        .route("/messages/start", post(start_scheduler))
        .route("/messages/stop", post(stop_scheduler))
        .route("/messages/sent", get(list_sent))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<SuccessResponse<HashMap<&'static str, &'static str>>> {
    Json(SuccessResponse::new(HashMap::from([("service", "up")])))
}

async fn start_scheduler(State(state): State<AppState>) -> Json<SuccessResponse<ControlResponse>> {
    let scheduler_state = state.service.start_scheduler().await;
    Json(SuccessResponse::new(scheduler_state.into()))
}

async fn stop_scheduler(State(state): State<AppState>) -> Json<SuccessResponse<ControlResponse>> {
    let scheduler_state = state.service.stop_scheduler().await;
    Json(SuccessResponse::new(scheduler_state.into()))
}

async fn create_message(
    State(state): State<AppState>,
    payload: Result<Json<CreateMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SuccessResponse<Message>>), ApiError> {
    let Json(req) = payload?;
    let message = state.service.create_message(&req.to, &req.content).await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(message))))
}

/// Resolve the `limit` query parameter: absent or non-positive means the
/// default, above the maximum is rejected.
fn parse_limit(raw: Option<&str>) -> Result<usize, ApiError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_LIST_LIMIT);
    };

    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::Validation(format!("limit must be an integer (got {:?})", raw)))?;

    if value <= 0 {
        return Ok(DEFAULT_LIST_LIMIT);
    }
    if value > MAX_LIST_LIMIT as i64 {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {} (got {})",
            MAX_LIST_LIMIT, value
        )));
    }
    Ok(value as usize)
}

async fn list_sent(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<SuccessResponse<Vec<relay_common::MessageView>>>, ApiError> {
    let limit = parse_limit(params.get("limit").map(String::as_str))?;
    let messages = state.service.list_sent(limit).await?;
    Ok(Json(SuccessResponse::new(messages)))
}
