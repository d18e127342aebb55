//! Storage-layer errors, shared by every backend.

/// Errors that can occur in the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite error: {message}")]
    Sqlite { message: String },

    #[error("postgres error: {message}")]
    Postgres { message: String },

    #[error("clickhouse error: {message}")]
    Clickhouse { message: String },

    #[error("cannot interpret {value:?} as a timestamp")]
    BadTimestamp { value: String },

    #[error("unknown store type {kind:?}")]
    UnknownStoreType { kind: String },

    #[error("unexpected value in {column} column: {value:?}")]
    BadColumn { column: &'static str, value: String },

    #[error("commit without a matching begin")]
    CommitWithoutBegin,

    #[error("operation not supported: {operation}: {reason}")]
    NotSupported {
        operation: &'static str,
        reason: &'static str,
    },
}
