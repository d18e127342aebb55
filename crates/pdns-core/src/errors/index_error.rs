//! Errors surfaced by the indexing driver, wrapped with file and
//! operation context.

use super::{ReadError, StorageError};

/// Errors that abort an indexing batch.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("aggregating {filename}: {source}")]
    Aggregate {
        filename: String,
        #[source]
        source: ReadError,
    },

    #[error("{operation} for {filename}: {source}")]
    Store {
        operation: &'static str,
        filename: String,
        #[source]
        source: StorageError,
    },

    #[error("{operation}: {source}")]
    Batch {
        operation: &'static str,
        #[source]
        source: StorageError,
    },
}
