//! Unified error types for netjar.
//!
//! Only fatal conditions are represented here. Cache I/O and JSON decode
//! failures are absorbed where they happen and never reach the caller as
//! an `Error`.

use tokio_rusqlite::rusqlite;

/// Unified error type shared by the core and client crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network failure that was not retryable or exhausted the retry budget.
    #[error("TRANSPORT_ERROR: Error #{code} {name}: {message}")]
    Transport { code: u32, name: &'static str, message: String },

    /// The challenge proxy reported an error or answered with garbage.
    #[error("PROXY_ERROR: {0}")]
    Proxy(String),

    /// Invalid or unsupported URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Cookie jar file could not be read or written.
    #[error("COOKIE_ERROR: {0}")]
    Cookie(String),

    /// Browser profile database operation failed.
    #[error("PROFILE_DB_ERROR: {0}")]
    Database(tokio_rusqlite::Error),
}

impl Error {
    /// Numeric transport code, if this is a transport failure.
    pub fn transport_code(&self) -> Option<u32> {
        match self {
            Error::Transport { code, .. } => Some(*code),
            _ => None,
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
