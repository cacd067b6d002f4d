//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{DomainError, ErrorKind};
use crate::repository::RepositoryError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing X-API-Key header")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("API key is disabled")]
    ApiKeyDisabled,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    // Ledger errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Domain(e) => AppError::Domain(e),
            RepositoryError::Database(e) => AppError::Database(e),
            RepositoryError::Corrupt(msg) => AppError::Internal(msg),
        }
    }
}

impl AppError {
    /// Stable machine-readable reason
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::MissingApiKey => "missing_api_key",
            AppError::InvalidApiKey => "invalid_api_key",
            AppError::ApiKeyDisabled => "api_key_disabled",
            AppError::Forbidden(_) => "forbidden",
            AppError::InvalidHeader(_) => "invalid_header",
            AppError::Domain(e) => e.code(),
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_)
            | AppError::InvalidHeader(_) => StatusCode::BAD_REQUEST,
            AppError::MissingApiKey | AppError::InvalidApiKey | AppError::ApiKeyDisabled => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Domain(e) => match (e.kind(), e) {
                (_, DomainError::InvalidRuleConfiguration(_)) => StatusCode::UNPROCESSABLE_ENTITY,
                (ErrorKind::NotFound, _) => StatusCode::NOT_FOUND,
                (ErrorKind::Conflict, _) => StatusCode::CONFLICT,
                (ErrorKind::Validation, _) => StatusCode::BAD_REQUEST,
                (ErrorKind::State, _) => StatusCode::UNPROCESSABLE_ENTITY,
            },
            AppError::Database(_) | AppError::Internal(_) | AppError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Extra context safe to hand back to the caller
    fn details(&self) -> Option<String> {
        match self {
            AppError::InvalidRequest(msg)
            | AppError::Forbidden(msg)
            | AppError::InvalidHeader(msg) => Some(msg.clone()),
            AppError::Domain(
                DomainError::CustomerNotFound(detail)
                | DomainError::StoreNotFound(detail)
                | DomainError::StoreInactive(detail)
                | DomainError::CardTemplateMissing(detail)
                | DomainError::DuplicateContact(detail)
                | DomainError::InvalidRuleConfiguration(detail)
                | DomainError::InvalidAmount(detail)
                | DomainError::Validation(detail),
            ) => Some(detail.clone()),
            _ => None,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // never leak internals to the caller
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            success: false,
            message,
            error_code: self.error_code().to_string(),
            details: self.details(),
        };

        (status, Json(body)).into_response()
    }
}
