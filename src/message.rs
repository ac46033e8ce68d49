use std::fmt;

use actix_web::{error::BlockingError, http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;

use crate::models::BorrowingStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resource {
    Item,
    Borrowing,
    User,
    Borrower,
    File,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Item => write!(f, "Item"),
            Resource::Borrowing => write!(f, "Borrowing"),
            Resource::User => write!(f, "User"),
            Resource::Borrower => write!(f, "Borrower"),
            Resource::File => write!(f, "File"),
        }
    }
}

#[derive(Debug, Serialize)]
pub enum AppSuccess {
    Deleted(Resource),
    LoggedOut,
}

impl AppSuccess {
    pub fn message(&self) -> String {
        match self {
            AppSuccess::Deleted(resource) => format!("{resource} deleted successfully"),
            AppSuccess::LoggedOut => "Logged out".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid or missing fields: {}", invalid_fields(.0))]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(Resource),

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    InvalidState {
        message: String,
        current: BorrowingStatus,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("password hashing failed: {0}")]
    Password(#[from] bcrypt::BcryptError),

    #[error("blocking task failed")]
    Blocking(#[from] BlockingError),
}

fn invalid_fields(errors: &validator::ValidationErrors) -> String {
    let mut fields: Vec<String> = errors.field_errors().keys().map(|f| f.to_string()).collect();
    fields.sort();
    fields.join(", ")
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(rename = "currentStatus", skip_serializing_if = "Option::is_none")]
    current_status: Option<BorrowingStatus>,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn unauthorized() -> Self {
        AppError::Unauthorized("Unauthorized".to_string())
    }

    pub fn forbidden() -> Self {
        AppError::Forbidden("Forbidden".to_string())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    /// Message sent to the client. Server-side failures never leak their detail.
    pub fn message(&self) -> String {
        if self.status_code().is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::InvalidState { .. } => StatusCode::CONFLICT,
            AppError::Database(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                StatusCode::CONFLICT
            }
            AppError::Database(_)
            | AppError::Io(_)
            | AppError::Password(_)
            | AppError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = match self {
            AppError::Database(sqlx::Error::Database(_)) if status == StatusCode::CONFLICT => {
                "Duplicate value".to_string()
            }
            _ => self.message(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(%status, %message, "request rejected");
        }

        let current_status = match self {
            AppError::InvalidState { current, .. } => Some(*current),
            _ => None,
        };

        HttpResponse::build(status).json(ErrorBody {
            error: &message,
            current_status,
        })
    }
}
