use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Signature mismatch: {0}")]
    SignatureMismatch(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Gateway fetch failed: {0}")]
    GatewayFetch(anyhow::Error),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Invoice issuance failed: {0}")]
    InvoiceIssuance(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            success: bool,
            error: String,
        }

        let (status, error_message) = match self {
            AppError::ValidationError(err) => {
                (StatusCode::BAD_REQUEST, format!("Validation error: {err}"))
            }
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            AppError::SignatureMismatch(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::UserNotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::GatewayFetch(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
            // Invoicing errors are recovered by the handlers; if one ever
            // reaches the response layer it is a server-side defect.
            AppError::TokenRefresh(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::InvoiceIssuance(err) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
            ),
            AppError::ConfigError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Configuration error: {err}"),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                error: error_message,
            }),
        )
            .into_response()
    }
}
