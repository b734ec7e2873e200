//! Error types for Moneta

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network or security-policy failure: {0}")]
    Transport(String),

    #[error("Provider error {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Credential signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("Bank session expired: {0}")]
    SessionExpired(String),

    #[error("All bank sessions expired, re-authorization required")]
    AllSessionsExpired,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Provider rejection with the given HTTP status.
    pub fn is_status(&self, code: u16) -> bool {
        matches!(self, Error::Provider { status, .. } if *status == code)
    }

    /// Errors that should prompt the user to reconnect a bank rather than
    /// retry or report a bug.
    pub fn needs_reauthorization(&self) -> bool {
        matches!(self, Error::SessionExpired(_) | Error::AllSessionsExpired)
            || self.is_status(401)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
