//! Error types for the CultureHub server
//!
//! A single error hierarchy shared by storage, auth, providers and the HTTP
//! layer:
//! - `thiserror` for the variant definitions
//! - constructors for the common cases
//! - HTTP status and error code mapping for API responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;
use tracing::error;

/// Result type alias for CultureHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the CultureHub server
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    #[error("Configuration error: {message}")]
    Config {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: &'static str },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig {
        key: &'static str,
        message: Cow<'static, str>,
    },

    // ========================================================================
    // Database Errors
    // ========================================================================
    #[error("Database error: {message}")]
    Database {
        message: Cow<'static, str>,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("Database connection pool exhausted")]
    PoolExhausted,

    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    #[error("{message}")]
    Conflict { message: Cow<'static, str> },

    #[error("Migration error: {0}")]
    Migration(String),

    // ========================================================================
    // Content Provider Errors
    // ========================================================================
    #[error("{provider} request failed: {message}")]
    Provider {
        provider: &'static str,
        message: Cow<'static, str>,
    },

    #[error("{provider} API key not configured")]
    ProviderNotConfigured { provider: &'static str },

    // ========================================================================
    // API Errors
    // ========================================================================
    #[error("{message}")]
    BadRequest { message: Cow<'static, str> },

    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: Cow<'static, str>,
    },

    #[error("{message}")]
    Unauthorized { message: Cow<'static, str> },

    #[error("Internal server error")]
    Internal {
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    // ========================================================================
    // Constructors for common error patterns
    // ========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a database error
    pub fn database(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a field validation error
    pub fn validation(field: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Create a provider error
    pub fn provider(provider: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal {
            source: Some(Box::new(source)),
        }
    }

    // ========================================================================
    // Error Classification
    // ========================================================================

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Database { .. } | Error::PoolExhausted | Error::Provider { .. }
        )
    }

    /// Returns true if this error should be logged at error level
    pub fn is_error_level(&self) -> bool {
        matches!(
            self,
            Error::Database { .. } | Error::Internal { .. } | Error::Migration(_)
        )
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } | Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::Provider { .. } => StatusCode::BAD_GATEWAY,
            Error::ProviderNotConfigured { .. } | Error::PoolExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } | Error::MissingEnvVar { .. } | Error::InvalidConfig { .. } => {
                "CONFIG_ERROR"
            }
            Error::Database { .. } | Error::PoolExhausted | Error::Migration(_) => {
                "DATABASE_ERROR"
            }
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Conflict { .. } => "CONFLICT",
            Error::Provider { .. } => "PROVIDER_ERROR",
            Error::ProviderNotConfigured { .. } => "PROVIDER_NOT_CONFIGURED",
            Error::BadRequest { .. } => "BAD_REQUEST",
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::Unauthorized { .. } => "UNAUTHORIZED",
            Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

// ============================================================================
// Error Response for API
// ============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.is_error_level() || status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {:?}", self);
        }

        // Don't expose internal error details
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            code: self.error_code(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Error::NotFound {
                entity_type: "record",
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolTimedOut => Error::PoolExhausted,
            sqlx::Error::Database(db_err) => {
                if let Some(constraint) = db_err.constraint() {
                    return Error::Conflict {
                        message: format!("Constraint '{}' violated", constraint).into(),
                    };
                }
                Error::Database {
                    message: db_err.message().to_string().into(),
                    source: Some(err),
                }
            }
            _ => Error::Database {
                message: err.to_string().into(),
                source: Some(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::PoolExhausted.is_retryable());
        assert!(Error::provider("TMDB", "status 500").is_retryable());
        assert!(!Error::not_found("user", "123").is_retryable());
        assert!(!Error::conflict("duplicate").is_retryable());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            Error::not_found("list", "123").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::validation("rating", "must be between 1 and 5").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::conflict("email already registered").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::ProviderNotConfigured { provider: "TMDB" }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::provider("Deezer", "status 500").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::Internal { source: None }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::bad_request("bad uuid").error_code(), "BAD_REQUEST");
        assert_eq!(Error::validation("rating", "too high").error_code(), "VALIDATION_ERROR");
        assert_eq!(Error::unauthorized("Not authenticated").error_code(), "UNAUTHORIZED");
        assert_eq!(Error::PoolExhausted.error_code(), "DATABASE_ERROR");
        assert_eq!(
            Error::InvalidConfig { key: "API_PORT", message: "not a number".into() }.error_code(),
            "CONFIG_ERROR"
        );
        assert_eq!(Error::Internal { source: None }.error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_messages_are_client_readable() {
        assert_eq!(
            Error::ProviderNotConfigured { provider: "TMDB" }.to_string(),
            "TMDB API key not configured"
        );
        assert_eq!(
            Error::bad_request("Query parameter 'q' is required").to_string(),
            "Query parameter 'q' is required"
        );
    }
}
