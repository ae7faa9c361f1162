use poem_openapi::payload::Json;
use serde_json::Value;
use thiserror::Error;

use crate::schema::common::{ApiError, ErrorBody, ErrorResponse};

/// Domain error raised by handlers and services.
///
/// Every variant maps to exactly one HTTP status and error code, so the API
/// boundary never has to inspect message text.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("Authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{module}.{function}: {step}: {source}")]
    Internal {
        module: &'static str,
        function: &'static str,
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, details: Value) -> Self {
        AppError::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn insufficient_permissions() -> Self {
        AppError::Forbidden("Insufficient permissions".to_string())
    }

    pub fn internal(
        module: &'static str,
        function: &'static str,
        step: &'static str,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        AppError::Internal {
            module,
            function,
            step,
            source: source.into(),
        }
    }

    /// Like [`AppError::internal`], but a unique violation becomes a conflict.
    pub fn from_write(
        module: &'static str,
        function: &'static str,
        step: &'static str,
        source: anyhow::Error,
        conflict: impl Into<String>,
    ) -> Self {
        if is_unique_violation(&source) {
            AppError::Conflict(conflict.into())
        } else {
            AppError::internal(module, function, step, source)
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation_error",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Internal { .. } => "internal_error",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            AppError::Validation { .. } => 400,
            AppError::Unauthorized => 401,
            AppError::Forbidden(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::Internal { .. } => 500,
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let details = match &err {
            AppError::Validation { details, .. } => details.clone(),
            _ => None,
        };
        let message = match &err {
            // internals are logged, not leaked
            AppError::Internal { .. } => {
                tracing::error!("{:#}", err);
                "Internal server error".to_string()
            }
            _ => err.to_string(),
        };
        let body = Json(ErrorResponse {
            error: ErrorBody {
                code: err.code().to_string(),
                message,
                details,
            },
        });
        match err {
            AppError::Validation { .. } => ApiError::BadRequest(body),
            AppError::Unauthorized => ApiError::Unauthorized(body),
            AppError::Forbidden(_) => ApiError::Forbidden(body),
            AppError::NotFound(_) => ApiError::NotFound(body),
            AppError::Conflict(_) => ApiError::Conflict(body),
            AppError::Internal { .. } => ApiError::InternalServerError(body),
        }
    }
}

/// Postgres unique_violation.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}
