//! Shared error taxonomy for every backend.
//!
//! # Responsibility
//! - Define the four error kinds callers branch on.
//! - Carry backend-native failures until the error wrapper classifies them.
//!
//! # Invariants
//! - `NotFound` and `MultipleResults` are typed outcomes, never folded into
//!   `DataLayer` by the default wrapper.
//! - Backend-native error types never escape a repository call.

use std::fmt::{Display, Formatter};
use thiserror::Error;

pub mod wrapper;

/// Boxed backend-native error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by repository and unit-of-work operations.
pub type DataResult<T> = Result<T, DataError>;

/// Result type used inside backend code before error wrapping.
pub type BackendResult<T> = Result<T, BackendError>;

/// Discriminant of [`DataError`], used by the wrapper skip-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    MultipleResults,
    InvalidQuery,
    DataLayer,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::MultipleResults => "multiple_results",
            Self::InvalidQuery => "invalid_query",
            Self::DataLayer => "data_layer",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error surfaced to callers of the data-access layer.
#[derive(Debug, Error)]
pub enum DataError {
    /// Zero records matched where exactly one was required.
    #[error("not found: {0}")]
    NotFound(String),
    /// More than one record matched where exactly one was required.
    #[error("multiple results: {0}")]
    MultipleResults(String),
    /// Malformed specification or field combination.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// Any backend failure not otherwise classified.
    #[error("data layer error: {message}")]
    DataLayer {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl DataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::MultipleResults(_) => ErrorKind::MultipleResults,
            Self::InvalidQuery(_) => ErrorKind::InvalidQuery,
            Self::DataLayer { .. } => ErrorKind::DataLayer,
        }
    }

    pub fn data_layer(message: impl Into<String>) -> Self {
        Self::DataLayer {
            message: message.into(),
            source: None,
        }
    }

    /// Builds an error of `kind`.
    ///
    /// Only `DataLayer` keeps `source`; the other kinds are plain messages.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>, source: Option<BoxError>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::MultipleResults => Self::MultipleResults(message),
            ErrorKind::InvalidQuery => Self::InvalidQuery(message),
            ErrorKind::DataLayer => Self::DataLayer { message, source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Error raised inside backend code, before classification.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Already classified into the shared taxonomy.
    #[error(transparent)]
    Data(#[from] DataError),
    /// Backend-native failure.
    #[error("{0}")]
    Native(BoxError),
}

impl BackendError {
    /// Native failure from a plain message, for in-process drivers.
    pub fn native(message: impl Into<String>) -> Self {
        Self::Native(message.into().into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Data(DataError::NotFound(message.into()))
    }

    pub fn multiple_results(message: impl Into<String>) -> Self {
        Self::Data(DataError::MultipleResults(message.into()))
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::Data(DataError::InvalidQuery(message.into()))
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Native(Box::new(value))
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(value: serde_json::Error) -> Self {
        Self::Native(Box::new(value))
    }
}

impl From<regex::Error> for BackendError {
    fn from(value: regex::Error) -> Self {
        Self::Native(Box::new(value))
    }
}

impl From<crate::db::DbError> for BackendError {
    fn from(value: crate::db::DbError) -> Self {
        Self::Native(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::{BackendError, DataError, ErrorKind};
    use std::error::Error;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(DataError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            DataError::MultipleResults("x".into()).kind(),
            ErrorKind::MultipleResults
        );
        assert_eq!(
            DataError::InvalidQuery("x".into()).kind(),
            ErrorKind::InvalidQuery
        );
        assert_eq!(DataError::data_layer("x").kind(), ErrorKind::DataLayer);
    }

    #[test]
    fn from_kind_keeps_source_only_for_data_layer() {
        let source = BackendError::native("socket closed");
        let err = DataError::from_kind(ErrorKind::DataLayer, "wrapped", Some(Box::new(source)));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "data layer error: wrapped");

        let err = DataError::from_kind(
            ErrorKind::NotFound,
            "user u1",
            Some(Box::new(BackendError::native("x"))),
        );
        assert!(err.source().is_none());
        assert_eq!(err.to_string(), "not found: user u1");
    }
}
