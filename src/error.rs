//! Error types for the drive_ops crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when authorizing against or calling Google Drive.
#[derive(Error, Debug)]
pub enum DriveError {
    /// Consent was denied, the callback was malformed, or the token endpoint
    /// rejected a code exchange or refresh.
    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Failed to access credential cache {path:?}: {source}")]
    CredentialStore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid client secret file {path:?}: {message}")]
    InvalidClientSecret { path: PathBuf, message: String },

    /// Required flags were absent for the requested action. The message is
    /// meant to be shown to the user as-is.
    #[error("{0}")]
    MissingArguments(&'static str),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Invalid file URL or ID: {0}")]
    InvalidFileId(String),
}

impl DriveError {
    pub(crate) fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DriveError::CredentialStore {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;
