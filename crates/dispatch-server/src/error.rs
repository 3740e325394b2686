//! API error type: the single surface every handler's `Result` converts
//! into, modeled on `axon::commands::api::error::ApiError`.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "not found: {msg}"),
            ApiError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            ApiError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            ApiError::Conflict(msg) => write!(f, "conflict: {msg}"),
            ApiError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NotFound", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BadRequest", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "Unauthorized", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg),
        };
        (status, Json(ErrorResponse { error: error_type.to_string(), message })).into_response()
    }
}

impl From<dispatch_store::StoreError> for ApiError {
    fn from(err: dispatch_store::StoreError) -> Self {
        if err.is_not_found() {
            ApiError::NotFound(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<dispatch_sync::SyncError> for ApiError {
    fn from(err: dispatch_sync::SyncError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<dispatch_orchestrator::OrchestratorError> for ApiError {
    fn from(err: dispatch_orchestrator::OrchestratorError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
