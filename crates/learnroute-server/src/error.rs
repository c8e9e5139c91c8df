//! Mapping of routing failures onto HTTP responses.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use learnroute_core::protocol::ErrorBody;
use learnroute_engine::RouteError;

/// A failed request: status plus the shared error body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::new(code, message),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "malformed_event", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<RouteError> for ApiError {
    fn from(err: RouteError) -> Self {
        let code = err.reason_code();
        let message = err.to_string();
        match err {
            RouteError::MalformedEvent(_) => Self::malformed(message),
            RouteError::RequiredAgentFailure { agent, cause } => Self {
                status: StatusCode::BAD_GATEWAY,
                body: ErrorBody::new(code, message)
                    .with_details(json!({ "agent": agent, "cause": cause })),
            },
            RouteError::Cancelled => Self::new(StatusCode::SERVICE_UNAVAILABLE, &code, message),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::malformed(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
