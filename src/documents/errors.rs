//! Document store error types.

use thiserror::Error;

/// Errors raised by [`super::DocumentStore`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    /// No document with this id exists.
    #[error("Doc with id {doc_id} not found")]
    NotFound { doc_id: String },

    /// An edit was requested with an empty search string.
    #[error("old_str must not be empty")]
    EmptySearch,
}
