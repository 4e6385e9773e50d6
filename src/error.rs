use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("already terminal: {0}")]
    AlreadyTerminal(String),

    #[error("delivery address is {distance_km} km away, beyond the {max_km} km service radius")]
    OutOfRange { distance_km: f64, max_km: f64 },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("delivery {0} is no longer available")]
    NoLongerAvailable(String),

    #[error("delivery {0} is not assigned to you")]
    NotYourDelivery(String),

    #[error("menu item not found: {0}")]
    ItemNotFound(String),

    #[error("menu item unavailable: {0}")]
    ItemUnavailable(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::AlreadyTerminal(_) => "ALREADY_TERMINAL",
            AppError::OutOfRange { .. } => "OUT_OF_RANGE",
            AppError::Conflict(_) => "CONFLICT",
            AppError::NoLongerAvailable(_) => "NO_LONGER_AVAILABLE",
            AppError::NotYourDelivery(_) => "NOT_YOUR_DELIVERY",
            AppError::ItemNotFound(_) => "ITEM_NOT_FOUND",
            AppError::ItemUnavailable(_) => "ITEM_UNAVAILABLE",
            AppError::InvalidAddress(_) => "INVALID_ADDRESS",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::ItemNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::NotYourDelivery(_) => StatusCode::FORBIDDEN,
            AppError::InvalidTransition(_)
            | AppError::AlreadyTerminal(_)
            | AppError::Conflict(_)
            | AppError::NoLongerAvailable(_)
            | AppError::ItemUnavailable(_) => StatusCode::CONFLICT,
            AppError::OutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidAddress(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
