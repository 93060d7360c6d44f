use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use busline_catalog::CatalogError;
use busline_core::CoreError;
use busline_order::{BookingError, FailedSeat, FailureReason, ReconcileError};
use serde::Serialize;
use serde_json::{json, Value};

use crate::response::ApiResponse;

/// Machine-readable failure category carried in `data.errorKind`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ErrorKind {
    SeatUnavailable,
    SeatInUse,
    InvalidTransition,
    SeatNumberConflict,
    NotFound,
    ValidationError,
    TicketActive,
    Forbidden,
    Unauthorized,
    RateLimited,
    InternalError,
}

#[derive(Debug)]
pub enum AppError {
    Unauthorized(String),
    Forbidden(String),
    Validation(String),
    NotFound(String),
    SeatUnavailable { message: String, failed: Vec<FailedSeat> },
    /// Issuance where every seat failed; the reasons pick the status.
    NothingSold(Vec<FailedSeat>),
    SeatInUse(String),
    SeatNumberConflict { message: String, seat_numbers: Vec<String> },
    InvalidTransition(String),
    TicketActive(String),
    RateLimited,
    Internal(String),
    Anyhow(anyhow::Error),
}

impl AppError {
    fn parts(self) -> (StatusCode, ErrorKind, String, Value) {
        match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, ErrorKind::Unauthorized, msg, json!({})),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, ErrorKind::Forbidden, msg, json!({})),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, ErrorKind::ValidationError, msg, json!({})),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorKind::NotFound, msg, json!({})),
            AppError::SeatUnavailable { message, failed } => {
                (StatusCode::CONFLICT, ErrorKind::SeatUnavailable, message, json!({ "failed": failed }))
            }
            AppError::NothingSold(failed) => {
                let has = |reason: FailureReason| failed.iter().any(|f| f.reason == reason);
                let (status, kind) = if has(FailureReason::SeatUnavailable) {
                    (StatusCode::CONFLICT, ErrorKind::SeatUnavailable)
                } else if has(FailureReason::StorageError) {
                    tracing::error!("Issuance failed on storage for {} seat(s)", failed.len());
                    (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::InternalError)
                } else if has(FailureReason::SeatNotFound) {
                    (StatusCode::NOT_FOUND, ErrorKind::NotFound)
                } else {
                    (StatusCode::BAD_REQUEST, ErrorKind::ValidationError)
                };
                let message = "None of the requested seats could be sold".to_string();
                (status, kind, message, json!({ "failed": failed }))
            }
            AppError::SeatInUse(msg) => (StatusCode::CONFLICT, ErrorKind::SeatInUse, msg, json!({})),
            AppError::SeatNumberConflict { message, seat_numbers } => (
                StatusCode::CONFLICT,
                ErrorKind::SeatNumberConflict,
                message,
                json!({ "seatNumbers": seat_numbers }),
            ),
            AppError::InvalidTransition(msg) => (StatusCode::CONFLICT, ErrorKind::InvalidTransition, msg, json!({})),
            AppError::TicketActive(msg) => (StatusCode::CONFLICT, ErrorKind::TicketActive, msg, json!({})),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorKind::RateLimited,
                "Rate limit exceeded".to_string(),
                json!({}),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::InternalError, "Internal Server Error".to_string(), json!({}))
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::InternalError, "Internal Server Error".to_string(), json!({}))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message, mut data) = self.parts();
        if let Value::Object(map) = &mut data {
            map.insert("errorKind".to_string(), json!(kind));
        }

        (status, Json(ApiResponse::failure(data, message))).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => AppError::Validation(msg),
            CoreError::NotFound(msg) => AppError::NotFound(msg),
            // A conflicting concurrent write on the seat inventory.
            CoreError::Conflict(msg) => AppError::SeatUnavailable { message: msg, failed: Vec::new() },
            CoreError::StorageError(msg) => AppError::Internal(msg),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        let message = err.to_string();
        match err {
            CatalogError::SeatNumberConflict { seat_numbers, .. } => AppError::SeatNumberConflict { message, seat_numbers },
            CatalogError::SeatInUse(_) => AppError::SeatInUse(message),
            CatalogError::SeatNotFound(_) | CatalogError::BusNotFound(_) => AppError::NotFound(message),
            CatalogError::Invalid(_) => AppError::Validation(message),
            CatalogError::Core(core) => core.into(),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::TripNotFound(_) | BookingError::TicketNotFound(_) => AppError::NotFound(message),
            BookingError::InvalidTransition { .. } => AppError::InvalidTransition(message),
            BookingError::TicketActive(_) => AppError::TicketActive(message),
            BookingError::Validation(_) => AppError::Validation(message),
            BookingError::Core(core) => core.into(),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::TripNotFound(_) => AppError::NotFound(err.to_string()),
            ReconcileError::Core(core) => core.into(),
        }
    }
}

// Extractor rejections are client mistakes; their text names the bad field.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
