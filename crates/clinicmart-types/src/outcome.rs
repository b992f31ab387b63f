//! Typed fetch outcome shared by all source adapters.

use crate::error::SourceError;

/// How a fetch went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Success,
    /// The value is usable but incomplete (e.g. some cells failed to decode).
    Degraded(SourceError),
    /// The call failed; the value is the adapter's fallback.
    Failed(SourceError),
}

impl FetchStatus {
    #[must_use]
    pub fn error(&self) -> Option<&SourceError> {
        match self {
            Self::Success => None,
            Self::Degraded(e) | Self::Failed(e) => Some(e),
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Degraded(_) => "degraded",
            Self::Failed(_) => "failed",
        }
    }
}

/// Value returned by an adapter, always present, plus how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult<T> {
    pub value: T,
    pub status: FetchStatus,
}

impl<T> FetchResult<T> {
    #[must_use]
    pub fn success(value: T) -> Self {
        Self {
            value,
            status: FetchStatus::Success,
        }
    }

    #[must_use]
    pub fn degraded(value: T, error: SourceError) -> Self {
        Self {
            value,
            status: FetchStatus::Degraded(error),
        }
    }

    #[must_use]
    pub fn failed(fallback: T, error: SourceError) -> Self {
        Self {
            value: fallback,
            status: FetchStatus::Failed(error),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.status, FetchStatus::Failed(_))
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> FetchResult<U> {
        FetchResult {
            value: f(self.value),
            status: self.status,
        }
    }
}
