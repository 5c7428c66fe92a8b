//! Error types for the remote client.
//!
//! Every failure the remote can produce is reported as one of three tagged
//! variants so the download engine never has to inspect message text.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by a [`RemoteSource`](super::RemoteSource).
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The remote asked us to slow down.
    #[error("rate limited while accessing {path}")]
    RateLimited {
        /// Remote path the request was for.
        path: String,
        /// Server-suggested wait before the next request, if it sent one.
        retry_after: Option<Duration>,
    },

    /// Recoverable failure (connection reset, timeout, 5xx).
    #[error("transient error accessing {path}: {message}")]
    Transient {
        /// Remote path the request was for.
        path: String,
        /// Human-readable description of the failure.
        message: String,
    },

    /// Failure that will not go away on retry (missing file, bad credentials).
    #[error("fatal error accessing {path}: {message}")]
    Fatal {
        /// Remote path the request was for.
        path: String,
        /// Human-readable description of the failure.
        message: String,
    },
}

impl RemoteError {
    /// Creates a rate-limit error with an optional server-suggested wait.
    pub fn rate_limited(path: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            path: path.into(),
            retry_after,
        }
    }

    /// Creates a transient error.
    pub fn transient(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a fatal error.
    pub fn fatal(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fatal {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns the server-suggested wait for rate-limit errors.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns true for [`RemoteError::RateLimited`].
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}
