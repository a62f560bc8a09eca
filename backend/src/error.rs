//! Error handling for the inventory tracker
//!
//! Every error renders as `{status: "error", message, details?, field?}`.
//! Internal details are stripped from 5xx bodies in production by [`redact_internal_details`].

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::InventoryError;
use thiserror::Error;

use crate::AppState;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Validation error: {0}")]
    InvalidInput(#[from] validator::ValidationErrors),

    // Business rule errors
    #[error("{0}")]
    Inventory(#[from] InventoryError),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Upload errors
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

/// Error response structure
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record".to_string()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                AppError::DuplicateEntry(unique_violation_field(db.constraint()))
            }
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23514") => {
                AppError::Validation {
                    field: db.constraint().unwrap_or("value").to_string(),
                    message: "Stock levels cannot be negative".to_string(),
                }
            }
            _ => AppError::DatabaseError(err),
        }
    }
}

/// Column name behind a unique constraint such as `items_sku_key`
fn unique_violation_field(constraint: Option<&str>) -> String {
    constraint
        .and_then(|name| name.strip_suffix("_key"))
        .and_then(|name| name.split_once('_').map(|(_, column)| column))
        .unwrap_or("value")
        .to_string()
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for errors a serializable transaction should be retried on
    pub fn is_serialization_failure(&self) -> bool {
        match self {
            AppError::DatabaseError(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. }
            | AppError::ValidationError(_)
            | AppError::InvalidInput(_)
            | AppError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            AppError::Inventory(InventoryError::UnknownItem(_)) => StatusCode::NOT_FOUND,
            AppError::Inventory(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateEntry(_) | AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StorageError(_)
            | AppError::Configuration(_)
            | AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Renders the response body; `hide_details` strips internal causes
    pub fn to_response(&self, hide_details: bool) -> ErrorResponse {
        let (message, details, field) = match self {
            AppError::Validation { field, message } => {
                (message.clone(), None, Some(field.clone()))
            }
            AppError::ValidationError(msg) => (msg.clone(), None, None),
            AppError::InvalidInput(errors) => {
                let field = errors.field_errors().keys().next().map(|f| f.to_string());
                ("Validation failed".to_string(), Some(errors.to_string()), field)
            }
            AppError::Inventory(err) => (err.to_string(), None, err.field().map(str::to_string)),
            AppError::DuplicateEntry(field) => (
                format!("A record with this {} already exists", field),
                None,
                Some(field.clone()),
            ),
            AppError::Conflict { resource, message } => {
                (message.clone(), None, Some(resource.clone()))
            }
            AppError::NotFound(resource) => (format!("{} not found", resource), None, None),
            AppError::InvalidUpload(msg) => (msg.clone(), None, Some("image".to_string())),
            AppError::StorageError(msg) => {
                ("File storage failed".to_string(), Some(msg.clone()), None)
            }
            AppError::Configuration(msg) => {
                ("Server is misconfigured".to_string(), Some(msg.clone()), None)
            }
            AppError::DatabaseError(err) => {
                ("A database error occurred".to_string(), Some(err.to_string()), None)
            }
            AppError::Internal(msg) => {
                ("An internal server error occurred".to_string(), Some(msg.clone()), None)
            }
            AppError::InternalError(err) => (
                "An internal server error occurred".to_string(),
                Some(format!("{:#}", err)),
                None,
            ),
        };

        let details = if hide_details && self.status_code().is_server_error() {
            None
        } else {
            details
        };

        ErrorResponse {
            status: "error",
            message,
            details,
            field,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request failed: {}", self);
        }

        let mut response = (status, Json(self.to_response(false))).into_response();
        if status.is_server_error() {
            response
                .extensions_mut()
                .insert(RedactedBody(self.to_response(true)));
        }
        response
    }
}

/// Body of a server error with its internal details removed
#[derive(Debug, Clone)]
struct RedactedBody(ErrorResponse);

/// Swaps a server error body for its redacted form
pub fn redact(mut response: Response) -> Response {
    match response.extensions_mut().remove::<RedactedBody>() {
        Some(RedactedBody(body)) => {
            let (parts, _) = response.into_parts();
            Response::from_parts(parts, Json(body).into_response().into_body())
        }
        None => response,
    }
}

/// Response middleware hiding internal error details outside development
pub async fn redact_internal_details(
    State(state): State<AppState>,
    response: Response,
) -> Response {
    if state.config.is_production() {
        redact(response)
    } else {
        response
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_field() {
        assert_eq!(unique_violation_field(Some("items_sku_key")), "sku");
        assert_eq!(
            unique_violation_field(Some("sales_invoice_number_key")),
            "invoice_number"
        );
        assert_eq!(unique_violation_field(None), "value");
    }
}
