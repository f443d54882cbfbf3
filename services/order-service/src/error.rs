use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use application::ServiceError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    pub details: String,
}

/// Error surface of the HTTP API: a status code plus a machine-readable
/// body `{"error": {"code", "message", "details"}}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: String,
}

impl ApiError {
    pub fn invalid_json(details: impl ToString) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_json",
            message: "request body is not valid JSON".to_string(),
            details: details.to_string(),
        }
    }

    pub fn invalid_request(details: impl ToString) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_request",
            message: "order failed validation".to_string(),
            details: details.to_string(),
        }
    }

    pub fn not_found(order_uid: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "order_not_found",
            message: format!("order {order_uid} not found"),
            details: String::new(),
        }
    }

    pub fn internal(details: impl ToString) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error",
            message: "internal server error".to_string(),
            details: details.to_string(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(e) => ApiError::invalid_request(e),
            ServiceError::NotFound => Self {
                status: StatusCode::NOT_FOUND,
                code: "order_not_found",
                message: "order not found".to_string(),
                details: String::new(),
            },
            ServiceError::Store(e) => ApiError::internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };
        (self.status, Json(body)).into_response()
    }
}
