//! Deferred, cached reads.
//!
//! # Invariants
//! - The producer runs at most once per `get` sequence; `execute` always runs
//!   it and replaces the cache.
//! - A failed run leaves the previous cache untouched.

use crate::error::DataResult;
use std::fmt::{Debug, Formatter};

/// Handle to a pending read.
pub struct LazyCommand<'a, T> {
    producer: Box<dyn FnMut() -> DataResult<T> + 'a>,
    result: Option<T>,
}

impl<'a, T> LazyCommand<'a, T> {
    pub fn new(producer: impl FnMut() -> DataResult<T> + 'a) -> Self {
        Self {
            producer: Box::new(producer),
            result: None,
        }
    }

    /// Returns the cached result, running the producer on first use.
    pub fn get(&mut self) -> DataResult<&T> {
        let value = match self.result.take() {
            Some(value) => value,
            None => (self.producer)()?,
        };
        Ok(self.result.insert(value))
    }

    /// Runs the producer again and overwrites the cache.
    pub fn execute(&mut self) -> DataResult<&T> {
        let value = (self.producer)()?;
        Ok(self.result.insert(value))
    }

    pub fn is_cached(&self) -> bool {
        self.result.is_some()
    }

    /// Consumes the command, running the producer if nothing is cached.
    pub fn into_result(mut self) -> DataResult<T> {
        match self.result.take() {
            Some(value) => Ok(value),
            None => (self.producer)(),
        }
    }
}

impl<T: Debug> Debug for LazyCommand<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyCommand")
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}
