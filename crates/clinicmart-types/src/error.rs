//! Structured error model for source adapters.
//!
//! [`SourceError`] never escapes an adapter as an `Err`: adapters fold it into
//! a [`FetchResult`](crate::outcome::FetchResult) status so one unreachable
//! source cannot abort a run.

use std::fmt;

/// Broad classification of a source failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Could not reach or connect to the source.
    Connection,
    /// Credentials were rejected.
    Auth,
    /// The source was reached but the query or request failed.
    Query,
    /// The response could not be decoded into records.
    Decode,
    /// The call exceeded its timeout.
    Timeout,
    /// Non-success HTTP status.
    Http,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connection => "connection",
            Self::Auth => "auth",
            Self::Query => "query",
            Self::Decode => "decode",
            Self::Timeout => "timeout",
            Self::Http => "http",
        };
        f.write_str(s)
    }
}

/// Failure reported by a source adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{category}: {message}")]
pub struct SourceError {
    pub category: ErrorCategory,
    pub message: String,
}

impl SourceError {
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Connection, message)
    }

    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Auth, message)
    }

    #[must_use]
    pub fn query(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Query, message)
    }

    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Decode, message)
    }

    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, message)
    }

    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        let category = if status == 401 || status == 403 {
            ErrorCategory::Auth
        } else {
            ErrorCategory::Http
        };
        Self::new(category, format!("status {status}: {}", message.into()))
    }
}
