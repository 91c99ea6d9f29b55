use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use classmeet_services::{MeetingError, auth::AuthError};
use serde::Serialize;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    Locked(String),
    Internal(String),
    ServiceUnavailable(String),
    Validation(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Locked(msg) => (StatusCode::LOCKED, "locked", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
            ApiError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "validation", msg),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<MeetingError> for ApiError {
    fn from(err: MeetingError) -> Self {
        match err {
            MeetingError::NotAuthorized(msg) => ApiError::Forbidden(msg),
            MeetingError::RoomNotReady => ApiError::Conflict("Meeting not ready yet".to_string()),
            MeetingError::Locked(msg) => ApiError::Locked(msg),
            MeetingError::ExternalServiceUnavailable(detail) => {
                error!(error = %detail, "Conferencing service call failed");
                ApiError::ServiceUnavailable(
                    "The meeting service is temporarily unavailable".to_string(),
                )
            }
            MeetingError::InvalidTransition(reason) => ApiError::Conflict(reason),
            MeetingError::MalformedEvent(msg) => ApiError::BadRequest(msg),
            MeetingError::InvalidSignature(_) => {
                ApiError::Unauthorized("Invalid webhook signature".to_string())
            }
            MeetingError::SessionNotFound(_) => ApiError::NotFound("Session not found".to_string()),
            MeetingError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            MeetingError::Contention(_) => {
                ApiError::ServiceUnavailable("Session is busy, try again".to_string())
            }
            MeetingError::Store(e) => {
                error!(error = %e, "Store operation failed");
                ApiError::Internal("Internal server error".to_string())
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenExpired => ApiError::Unauthorized("Token expired".to_string()),
            AuthError::InvalidToken(msg) => ApiError::Unauthorized(msg),
        }
    }
}
