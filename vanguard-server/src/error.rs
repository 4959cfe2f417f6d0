use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;
use vanguard_queue::{QueueError, ValidationError};

/// Error returned by every handler; renders as `{"error", "message"}`
#[derive(Debug)]
pub enum ApiError {
    Queue(QueueError),
    Validation(ValidationError),
    BadRequest(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Queue(err) => match err {
                QueueError::NotFound(_) | QueueError::NoJobAvailable => StatusCode::NOT_FOUND,
                QueueError::UnknownQueue(_) | QueueError::UnknownStatus(_) => {
                    StatusCode::BAD_REQUEST
                }
                QueueError::AlreadyExists(_)
                | QueueError::NotCancellable { .. }
                | QueueError::NotInFlight { .. }
                | QueueError::RetryBudgetExceeded { .. }
                | QueueError::InvalidTransition { .. } => StatusCode::CONFLICT,
                QueueError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                QueueError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Queue(err) => err.kind(),
            Self::Validation(err) => err.kind(),
            Self::BadRequest(_) => "bad_request",
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queue(err) => err.fmt(f),
            Self::Validation(err) => err.fmt(f),
            Self::BadRequest(message) => f.write_str(message),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self::Queue(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(format!("Failed to parse the request body as JSON: {rejection}"))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), "Request failed: {}", self);
        }

        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
