//! Boundary error type: status code + public message, serialized as
//! `{"error": "..."}`. Infrastructure detail is logged here and replaced
//! with an opaque message before it leaves the process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::validate::ValidationError;
use crate::auth::{AccountError, AuthError, RegistrationError};
use crate::upload::UploadError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Log `detail` and answer with a message that reveals nothing about it.
    pub fn internal(public: &str, detail: &dyn std::fmt::Display) -> Self {
        tracing::error!("{public}: {detail}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: public.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_client_error() {
            tracing::debug!(status = self.status.as_u16(), "{}", self.message);
        }
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<RegistrationError> for ApiError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::InvalidInput(_) | RegistrationError::DuplicateUsername => {
                Self::bad_request(err.to_string())
            }
            RegistrationError::StoreUnavailable(_) | RegistrationError::Hashing(_) => {
                Self::internal("could not register user", &err)
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::bad_request(err.to_string()),
            AuthError::StoreUnavailable(_) | AuthError::Hashing(_) | AuthError::Entropy(_) => {
                Self::internal("could not log in", &err)
            }
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        Self::internal("credential store unavailable", &err)
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::MalformedRequest(_) => Self::bad_request(err.to_string()),
            UploadError::Collision { .. } => Self {
                status: StatusCode::CONFLICT,
                message: err.to_string(),
            },
            UploadError::DirectoryCreateFailed { .. } | UploadError::WriteFailed { .. } => {
                Self::internal("could not store upload", &err)
            }
        }
    }
}
