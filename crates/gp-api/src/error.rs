//! API error types and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use utoipa::ToSchema;

use crate::auth::AuthError;

/// API error type.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (invalid input that is not a field-level failure).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Duplicate resource or illegal state transition.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Field-level validation failure.
    #[error("Validation failed")]
    Validation(ValidationDetails),

    /// Too many requests.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Wrong username or password.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Account exists but may not log in.
    #[error("Account disabled")]
    AccountDisabled,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

/// Field-level validation details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationDetails {
    pub message: String,
    /// Field name -> error messages.
    pub fields: HashMap<String, Vec<String>>,
}

impl ValidationDetails {
    /// A validation error for a single field.
    pub fn field(field: &str, message: &str) -> Self {
        let mut fields = HashMap::new();
        fields.insert(field.to_string(), vec![message.to_string()]);
        Self {
            message: format!("Validation failed for field '{field}'"),
            fields,
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable error code for programmatic handling.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Field-level details for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// A validation error for a single field.
    pub fn validation_field(field: &str, message: &str) -> Self {
        ApiError::Validation(ValidationDetails::field(field, message))
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::AccountDisabled => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::RateLimited => "RATE_LIMITED",
            ApiError::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiError::AccountDisabled => "ACCOUNT_DISABLED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (message, details) = match &self {
            ApiError::Validation(details) => (
                details.message.clone(),
                Some(serde_json::to_value(&details.fields).unwrap_or_default()),
            ),
            _ => (self.to_string(), None),
        };

        let body = ErrorResponse {
            code: self.error_code().to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<gp_core::db::DbError> for ApiError {
    fn from(err: gp_core::db::DbError) -> Self {
        use gp_core::db::DbError;
        match err {
            DbError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{entity} with id {id} not found"))
            }
            DbError::Unique(msg) => ApiError::Conflict(msg),
            DbError::State(msg) => ApiError::Conflict(msg),
            DbError::Serialization(msg) => ApiError::Internal(msg),
            err => ApiError::Database(err.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            AuthError::Invalid(_) => ApiError::Unauthorized("Invalid token".to_string()),
            AuthError::Signing(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut fields: HashMap<String, Vec<String>> = HashMap::new();

        for (field_name, field_errors) in err.field_errors() {
            let messages: Vec<String> = field_errors
                .iter()
                .map(|e| {
                    e.message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Field '{field_name}' failed '{}'", e.code))
                })
                .collect();
            fields.insert(field_name.to_string(), messages);
        }

        let message = if fields.len() == 1 {
            let field = fields.keys().next().map(String::as_str).unwrap_or("");
            format!("Validation failed for field '{field}'")
        } else {
            format!("Validation failed for {} fields", fields.len())
        };

        ApiError::Validation(ValidationDetails { message, fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gp_core::db::DbError;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::AccountDisabled.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::RateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn unique_violations_become_conflicts() {
        let err: ApiError = DbError::Unique("passport_number taken".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err: ApiError = DbError::State("Token is already closed".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn not_found_carries_entity_and_id() {
        let err: ApiError = DbError::not_found("Pass", "abc").into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.to_string().contains("Pass"));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn validation_details_serialize_into_body() {
        let err = ApiError::validation_field("passport_number", "required");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
