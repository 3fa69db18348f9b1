//! Normalization of backend failures into the shared taxonomy.
//!
//! # Invariants
//! - Taxonomy errors whose kind is skipped, or equals the default kind,
//!   propagate unchanged.
//! - Everything else is re-raised as the default kind with the original
//!   error attached as `source`.

use super::{BackendError, BackendResult, DataError, DataResult, ErrorKind};
use log::debug;

/// Converts [`BackendError`] values raised inside an operation into [`DataError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorWrapper {
    default_kind: ErrorKind,
    skipped: Vec<ErrorKind>,
}

impl Default for ErrorWrapper {
    fn default() -> Self {
        Self::new(
            ErrorKind::DataLayer,
            [
                ErrorKind::NotFound,
                ErrorKind::MultipleResults,
                ErrorKind::InvalidQuery,
            ],
        )
    }
}

impl ErrorWrapper {
    pub fn new(default_kind: ErrorKind, skipped: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            default_kind,
            skipped: skipped.into_iter().collect(),
        }
    }

    pub fn default_kind(&self) -> ErrorKind {
        self.default_kind
    }

    /// Returns whether errors of `kind` pass through unchanged.
    pub fn skips(&self, kind: ErrorKind) -> bool {
        kind == self.default_kind || self.skipped.contains(&kind)
    }

    /// Runs `operation` and classifies any error it returns.
    pub fn wrap<T>(&self, operation: impl FnOnce() -> BackendResult<T>) -> DataResult<T> {
        operation().map_err(|err| self.convert(err))
    }

    pub fn convert(&self, error: BackendError) -> DataError {
        match error {
            BackendError::Data(err) if self.skips(err.kind()) => err,
            BackendError::Data(err) => {
                debug!(
                    "event=error_wrapped module=error status=ok from={} to={}",
                    err.kind(),
                    self.default_kind
                );
                DataError::from_kind(self.default_kind, err.to_string(), Some(Box::new(err)))
            }
            BackendError::Native(err) => {
                debug!(
                    "event=error_wrapped module=error status=ok from=native to={}",
                    self.default_kind
                );
                DataError::from_kind(self.default_kind, err.to_string(), Some(err))
            }
        }
    }
}
