//! Error types for rekrut

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Pre-filter and input errors
    #[error("Email domain is not allowed")]
    DomainNotAllowed,

    #[error("Invalid request: {0}")]
    Validation(String),

    // Credential errors
    //
    // InvalidCredentials is deliberately uninformative: a wrong password and
    // a nonexistent directory user must be indistinguishable to the caller.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Local login is not enabled for this account")]
    LocalLoginUnavailable,

    // Session errors
    #[error("Session has expired")]
    TokenExpired,

    #[error("Session token is invalid")]
    TokenInvalid,

    #[error("Access denied")]
    Forbidden,

    // Store errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("An account with this email already exists")]
    Conflict(String),

    #[error("Account reconciliation failed")]
    ReconciliationFailed,

    #[error("Database error: {0}")]
    Database(String),

    // Directory errors
    #[error("Directory service unavailable: {0}")]
    DirectoryUnavailable(String),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::DomainNotAllowed => "DomainNotAllowed",
            Error::Validation(_) => "ValidationError",
            Error::InvalidCredentials => "InvalidCredentials",
            Error::LocalLoginUnavailable => "LocalLoginUnavailable",
            Error::TokenExpired => "SessionExpired",
            Error::TokenInvalid => "SessionInvalid",
            Error::Forbidden => "Forbidden",
            Error::NotFound(_) => "NotFound",
            Error::Conflict(_) => "Conflict",
            Error::ReconciliationFailed => "ReconciliationFailed",
            Error::Database(_) => "InternalError",
            Error::DirectoryUnavailable(_) => "DirectoryUnavailable",
            Error::Internal(_) => "InternalError",
            Error::Io(_) => "InternalError",
            Error::Other(_) => "InternalError",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Error::DomainNotAllowed | Error::Validation(_) => 400,

            Error::InvalidCredentials
            | Error::LocalLoginUnavailable
            | Error::TokenExpired
            | Error::TokenInvalid => 401,

            Error::Forbidden => 403,

            Error::NotFound(_) => 404,

            Error::Conflict(_) => 409,

            Error::DirectoryUnavailable(_) => 503,

            _ => 500,
        }
    }

    /// Message safe to return to the client. Internal details stay in logs.
    pub fn public_message(&self) -> String {
        match self {
            Error::Database(_) | Error::Internal(_) | Error::Io(_) | Error::Other(_) => {
                "Internal server error".to_string()
            }
            Error::DirectoryUnavailable(_) => "Directory service unavailable".to_string(),
            other => other.to_string(),
        }
    }
}
