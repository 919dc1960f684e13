//! Unified error types for the snippet service.
//!
//! Every variant carries a stable code prefix so logs and MCP clients can
//! match on the kind without parsing the message.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the snippet service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad key material, missing DSN, or any other fatal startup problem.
    #[error("CONFIGURATION_ERROR: {0}")]
    Config(String),

    /// No such snippet, or the snippet has expired.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Edit token did not match.
    #[error("UNAUTHORIZED: {0}")]
    Unauthorized(String),

    /// Password missing or incorrect.
    #[error("FORBIDDEN: {0}")]
    Forbidden(String),

    /// Malformed request input (e.g. an unparsable expiry duration).
    #[error("VALIDATION_ERROR: {0}")]
    Validation(String),

    /// Ciphertext shorter than the nonce.
    #[error("INVALID_CIPHERTEXT: ciphertext is shorter than the nonce")]
    InvalidCiphertext,

    /// Tag check failed: tampered data or wrong key.
    #[error("AUTHENTICATION_FAILED: ciphertext could not be authenticated")]
    AuthenticationFailed,

    /// Encryption itself failed.
    #[error("ENCRYPTION_ERROR: {0}")]
    Encryption(String),

    /// Password hashing failed.
    #[error("PASSWORD_ERROR: {0}")]
    Password(String),

    /// Database operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORAGE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A transaction body failed and so did the rollback.
    #[error("STORAGE_ERROR: transaction failed: {source}; rollback failed: {rollback}")]
    Transaction { source: Box<Error>, rollback: String },

    /// Stored row could not be decoded.
    #[error("STORAGE_ERROR: corrupt row: {0}")]
    CorruptRow(String),

    /// Query did not finish within the configured deadline.
    #[error("STORAGE_TIMEOUT: {0}")]
    Timeout(String),

    /// Caller went away before the query started.
    #[error("STORAGE_TIMEOUT: query cancelled before it started")]
    Cancelled,

    /// Cache backend failure. Never leaves the cache-aside layer.
    #[error("CACHE_ERROR: {0}")]
    Cache(String),
}

impl Error {
    /// True for the kinds that mean "no such snippet" to a caller.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Cache(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::Validation(msg) => (-32602, msg.clone()),
            Error::NotFound(msg) => (-32001, msg.clone()),
            Error::Unauthorized(msg) => (-32003, msg.clone()),
            Error::Forbidden(msg) => (-32004, msg.clone()),
            Error::Timeout(_) | Error::Cancelled => (-32005, "storage deadline exceeded".to_string()),
            Error::Config(msg) => (-32000, msg.clone()),
            Error::InvalidCiphertext
            | Error::AuthenticationFailed
            | Error::Encryption(_)
            | Error::Password(_)
            | Error::Database(_)
            | Error::MigrationFailed(_)
            | Error::Transaction { .. }
            | Error::CorruptRow(_)
            | Error::Cache(_) => {
                tracing::error!(error = %err, "internal error");
                (-32002, "an unexpected error occurred".to_string())
            }
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
