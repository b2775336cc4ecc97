pub mod catalog;
pub mod retry;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use catalog::{code_for_http_status, lookup, ErrorInfo};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Storage error ({status}): {message}")]
    Storage { status: u16, message: String },

    #[error("Upstream service error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Cache error: {0}")]
    Cache(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

impl AppError {
    /// The catalog code describing this failure.
    pub fn code(&self) -> &str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Unauthorized(_) => "bad_jwt",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "PGRST116",
            AppError::Conflict(_) => "23505",
            AppError::Database(err) => database_code(err),
            AppError::Storage { status, .. } => code_for_http_status(*status),
            AppError::Upstream { status, .. } => code_for_http_status(*status),
            AppError::Http(err) => http_code(err),
            AppError::Io(_) => "network_error",
            AppError::Image(_) => "invalid_mime_type",
            _ => catalog::UNKNOWN.code,
        }
    }

    pub fn info(&self) -> &'static ErrorInfo {
        lookup(self.code())
    }

    pub fn is_retryable(&self) -> bool {
        self.info().retryable
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Image(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Database(err) => match database_code(err) {
                "23505" => StatusCode::CONFLICT,
                "23502" | "23503" | "23514" | "22P02" | "22001" => StatusCode::BAD_REQUEST,
                "42501" => StatusCode::FORBIDDEN,
                "pool_timeout" | "53300" => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Storage { status, .. } => match status {
                400..=499 => StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST),
                _ => StatusCode::BAD_GATEWAY,
            },
            AppError::Upstream { .. } | AppError::Http(_) => StatusCode::BAD_GATEWAY,
            AppError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Cancelled => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the end user.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(message)
            | AppError::NotFound(message)
            | AppError::Forbidden(message)
            | AppError::Conflict(message) => message.clone(),
            AppError::Cancelled => "Operazione annullata.".to_string(),
            AppError::NotImplemented(_) => "Funzionalità non ancora disponibile.".to_string(),
            _ => self.info().message.to_string(),
        }
    }
}

fn database_code(err: &sqlx::Error) -> &str {
    match err {
        sqlx::Error::RowNotFound => "PGRST116",
        sqlx::Error::PoolTimedOut => "pool_timeout",
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => "08006",
        sqlx::Error::Database(db) => match db.code() {
            Some(std::borrow::Cow::Borrowed(code)) => code,
            // Owned codes cannot be borrowed out; match the ones the catalog knows.
            Some(std::borrow::Cow::Owned(code)) => static_code(&code),
            None => catalog::UNKNOWN.code,
        },
        _ => catalog::UNKNOWN.code,
    }
}

fn static_code(code: &str) -> &'static str {
    let info = lookup(code);
    info.code
}

fn http_code(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else if err.is_connect() || err.is_request() {
        "network_error"
    } else if let Some(status) = err.status() {
        code_for_http_status(status.as_u16())
    } else {
        catalog::UNKNOWN.code
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        } else {
            tracing::warn!(error = %self, code = self.code(), "Request rejected");
        }

        let info = self.info();
        let body = json!({
            "error": self.user_message(),
            "code": self.code(),
            "severity": info.severity,
            "retryable": info.retryable,
            "actions": info.recovery_actions(),
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_keep_their_message() {
        let err = AppError::Validation("Email non valida".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.user_message(), "Email non valida");
        assert!(!err.is_retryable());
    }

    #[test]
    fn row_not_found_is_a_404() {
        let err = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "PGRST116");
    }

    #[test]
    fn pool_timeout_is_retryable() {
        let err = AppError::Database(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn storage_errors_map_through_http_status() {
        let err = AppError::Storage {
            status: 413,
            message: "too big".into(),
        };
        assert_eq!(err.code(), "payload_too_large");
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.user_message(), "Il file è troppo grande.");

        let err = AppError::Storage {
            status: 503,
            message: "down".into(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn unmapped_errors_use_generic_message() {
        let err = AppError::Internal("boom".into());
        assert_eq!(err.code(), "unknown");
        assert_eq!(
            err.user_message(),
            "Si è verificato un errore imprevisto. Riprova più tardi."
        );
    }
}
