//! API error types and handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scholar_core::access::AccessDenied;
use scholar_core::auth::password::PasswordError;
use scholar_core::auth::token::TokenError;
use scholar_core::db::{DbError, Dependents};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

pub type ApiResult<T> = Result<T, ApiError>;

/// API error type.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Resource not found, or not visible to the caller.
    #[error("{0}")]
    NotFound(String),

    /// Business-rule violation on the request itself.
    #[error("{0}")]
    BadRequest(String),

    /// Field-level validation failure.
    #[error("{}", .0.message)]
    ValidationError(ValidationErrorDetails),

    /// Missing or invalid credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),

    /// Conflicts with existing state (overlap, duplicate key).
    #[error("{0}")]
    Conflict(String),

    /// Delete refused because child records exist.
    #[error("{message}")]
    DependentsExist {
        message: String,
        dependents: Dependents,
    },

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

/// Field-level validation failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetails {
    pub message: String,
    pub errors: Vec<FieldError>,
}

/// A single field validation error.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    /// Error code (e.g. "required", "length", "range").
    pub code: String,
    pub message: String,
}

impl ValidationErrorDetails {
    pub fn field(field: &str, code: &str, message: &str) -> Self {
        Self::from_errors(vec![FieldError {
            field: field.to_string(),
            code: code.to_string(),
            message: message.to_string(),
        }])
    }

    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        let message = match errors.as_slice() {
            [single] => format!("Validation failed for field '{}'", single.field),
            _ => format!("Validation failed for {} fields", errors.len()),
        };
        Self { message, errors }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub message: String,
    /// Error code for programmatic handling.
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    /// Child-record counts that block a delete.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub dependents: Option<serde_json::Value>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::DependentsExist { .. } => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::DependentsExist { .. } => "DEPENDENTS_EXIST",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Validation error for a single field.
    pub fn validation_field(field: &str, code: &str, message: &str) -> Self {
        ApiError::ValidationError(ValidationErrorDetails::field(field, code, message))
    }

    /// The uniform 404 for "missing" and "not yours".
    pub fn not_found(entity: &str) -> Self {
        ApiError::NotFound(format!("{} not found", entity))
    }

    /// Rejects a delete when anything depends on the row.
    pub fn ensure_clear(entity: &str, dependents: Dependents) -> Result<(), ApiError> {
        if dependents.is_clear() {
            return Ok(());
        }
        Err(ApiError::DependentsExist {
            message: format!("Cannot delete {} with existing dependent records", entity),
            dependents,
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        let body = match self {
            ApiError::ValidationError(details) => ErrorResponse {
                message: details.message,
                code,
                errors: Some(details.errors),
                dependents: None,
            },
            ApiError::DependentsExist {
                message,
                dependents,
            } => ErrorResponse {
                message,
                code,
                errors: None,
                dependents: serde_json::to_value(&dependents).ok(),
            },
            ApiError::Internal(detail) | ApiError::Database(detail) => {
                error!(error = %detail, code = %code, "Request failed");
                ErrorResponse {
                    message: "Internal server error".to_string(),
                    code,
                    errors: None,
                    dependents: None,
                }
            }
            other => ErrorResponse {
                message: other.to_string(),
                code,
                errors: None,
                dependents: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, .. } => ApiError::not_found(&entity),
            DbError::Constraint(msg) => ApiError::Conflict(msg),
            err => ApiError::Database(err.to_string()),
        }
    }
}

impl From<AccessDenied> for ApiError {
    fn from(err: AccessDenied) -> Self {
        ApiError::Forbidden(format!("Access denied: {}", err.reason))
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => ApiError::Internal(msg),
            TokenError::Expired => ApiError::Unauthorized("Access token expired".to_string()),
            TokenError::Invalid(_) => ApiError::Unauthorized("Invalid access token".to_string()),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("JSON error: {}", err))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut errors: Vec<FieldError> = err
            .field_errors()
            .into_iter()
            .flat_map(|(field, field_errors)| {
                let name = camel_case(&field);
                field_errors.iter().map(move |e| FieldError {
                    field: name.clone(),
                    code: e.code.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Field '{}' is invalid", name)),
                })
            })
            .collect();
        errors.sort_by(|a, b| a.field.cmp(&b.field));

        ApiError::ValidationError(ValidationErrorDetails::from_errors(errors))
    }
}

/// Request bodies are camelCase; validator reports Rust field names.
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
