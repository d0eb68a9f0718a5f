//! Shared error types for the services crate.

use serde::Serialize;
use thiserror::Error;

use practice_core::model::IdError;
use storage::repository::StorageError;

/// Problems with the caller's input, detected before any store access.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InputError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error(transparent)]
    InvalidId(#[from] IdError),
    #[error("malformed command: {0}")]
    MalformedPayload(String),
}

/// Errors emitted by `ProgressEngine`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("progress was modified concurrently; retry the request")]
    Conflict(#[source] StorageError),
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for ProgressError {
    fn from(err: StorageError) -> Self {
        if err.is_retryable() {
            Self::Conflict(err)
        } else {
            Self::Storage(err)
        }
    }
}

/// Coarse error category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Input,
    Conflict,
    Unavailable,
}

impl ProgressError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProgressError::Input(_) => ErrorKind::Input,
            ProgressError::Conflict(_) => ErrorKind::Conflict,
            ProgressError::Storage(_) => ErrorKind::Unavailable,
        }
    }

    /// Only concurrency conflicts are worth retrying unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProgressError::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_conflict_maps_to_retryable_error() {
        let err = ProgressError::from(StorageError::Conflict);
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());
    }

    #[test]
    fn connection_failure_is_unavailable() {
        let err = ProgressError::from(StorageError::Connection("closed".into()));
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "connection error: closed");
    }

    #[test]
    fn input_errors_name_the_field() {
        let err = ProgressError::from(InputError::MissingField("studentId"));
        assert_eq!(err.kind(), ErrorKind::Input);
        assert_eq!(err.to_string(), "studentId is required");
    }
}
