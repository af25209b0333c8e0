//! Error types for the volunteer tracker.
//!
//! Every fallible operation in the crate returns [`Result`]. The HTTP layer
//! turns an [`Error`] into a JSON body of the form `{"error": "..."}` with a
//! status code chosen by [`Error::status`].

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// The main error type for volunteer tracker operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Request Errors ===
    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// A record referenced by the request does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Missing or wrong admin credentials.
    #[error("{0}")]
    Unauthorized(String),

    // === Storage Errors ===
    /// Reading or writing the data file failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The data snapshot could not be encoded or decoded.
    #[error("snapshot encoding failed: {0}")]
    Snapshot(#[from] Box<bincode::ErrorKind>),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Spreadsheet Sync Errors ===
    /// No spreadsheet configuration has been stored yet.
    #[error("Google Sheets is not configured")]
    SheetsNotConfigured,

    /// The stored service account JSON is unusable.
    #[error("invalid service account: {0}")]
    ServiceAccount(String),

    /// The spreadsheet service answered with an error.
    #[error("Google Sheets request failed: {0}")]
    Sheets(String),

    /// Transport failure talking to the spreadsheet service.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Signing the service account assertion failed.
    #[error("token signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Data kept in the local store could not be decoded.
    #[error("stored data is unreadable: {0}")]
    StoredData(String),

    // === Misc ===
    /// Building an export file failed.
    #[error("export failed: {0}")]
    Export(String),

    /// Argon2 could not hash or parse a password hash.
    #[error("password hashing failed")]
    PasswordHash,
}

/// Result type alias using the crate error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// The HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::SheetsNotConfigured => StatusCode::CONFLICT,
            Self::ServiceAccount(_) | Self::Sheets(_) | Self::Http(_) | Self::Jwt(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl From<rust_xlsxwriter::XlsxError> for Error {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Self::Export(err.to_string())
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::validation("bad").status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::NotFound("Volunteer").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::Unauthorized("Unauthorized".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(Error::SheetsNotConfigured.status(), StatusCode::CONFLICT);
        assert_eq!(Error::Sheets("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            Error::StoredData("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::PasswordHash.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(Error::NotFound("Event").to_string(), "Event not found");
    }
}
