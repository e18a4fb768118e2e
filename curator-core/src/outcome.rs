//! Outcome of an operation that may stop early.
//!
//! Pagination loops never throw away what they already fetched: when an
//! upstream call fails midway the accumulated value is returned together with
//! the error that stopped the loop, so callers can tell "no results" apart
//! from "upstream failure".

use crate::CoreError;

#[derive(Debug)]
pub enum FetchOutcome<T> {
    /// Every requested page was fetched.
    Complete(T),
    /// The loop stopped on an error after producing some value.
    Partial { value: T, error: CoreError },
    /// The first call failed; nothing was produced.
    Failed(CoreError),
}

impl<T> FetchOutcome<T> {
    pub fn is_partial(&self) -> bool {
        matches!(self, FetchOutcome::Partial { .. })
    }

    pub fn error(&self) -> Option<&CoreError> {
        match self {
            FetchOutcome::Complete(_) => None,
            FetchOutcome::Partial { error, .. } | FetchOutcome::Failed(error) => Some(error),
        }
    }
}

impl<T: Default> FetchOutcome<T> {
    /// Whatever was accumulated, or the empty value when nothing was.
    pub fn into_value(self) -> T {
        match self {
            FetchOutcome::Complete(value) | FetchOutcome::Partial { value, .. } => value,
            FetchOutcome::Failed(_) => T::default(),
        }
    }
}
