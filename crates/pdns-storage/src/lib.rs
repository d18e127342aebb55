//! # pdns-storage
//!
//! Backend realizations of the store contract defined in `pdns-core`:
//! a SQLite store (the default), a PostgreSQL store, and a ClickHouse
//! store. All backends apply the domain reversal internally and
//! normalize timestamps to unix seconds at the upsert boundary.

pub mod clickhouse;
pub mod postgres;
pub mod sqlite;
mod sql;

pub use clickhouse::ClickhouseStore;
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

use pdns_core::errors::StorageError;
use pdns_core::traits::Store;

/// Construct a store from its type name and URI, and initialize its
/// schema. Known types: `sqlite`, `postgresql` (alias `postgres`),
/// `clickhouse`.
pub fn open_store(kind: &str, uri: &str) -> Result<Box<dyn Store>, StorageError> {
    let mut store: Box<dyn Store> = match kind {
        "sqlite" => Box::new(SqliteStore::open(uri)?),
        "postgresql" | "postgres" => Box::new(PostgresStore::open(uri)?),
        "clickhouse" => Box::new(ClickhouseStore::open(uri)?),
        other => {
            return Err(StorageError::UnknownStoreType {
                kind: other.to_string(),
            })
        }
    };
    store.init()?;
    Ok(store)
}
