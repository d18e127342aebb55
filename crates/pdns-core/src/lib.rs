//! # pdns-core
//!
//! Foundation crate for the pdns passive-DNS indexer.
//! Defines the shared types, errors, timestamp helpers, and the domain
//! reversal used by both the ingestion pipeline and the stores.

pub mod constants;
pub mod errors;
pub mod reverse;
pub mod timestamp;
pub mod traits;
pub mod types;

// Re-export the most commonly used items at the crate root.
pub use constants::MAX_VALUE_LEN;
pub use errors::{IndexError, ReadError, StorageError};
pub use reverse::reverse;
pub use traits::Store;
pub use types::{
    AggregatedIndividual, AggregatedTuple, AggregationResult, AggregationSummary, DnsRecord,
    IndividualKey, IndividualRow, Stat, TupleKey, TupleRow, UpdateResult, Which,
};

/// Hash map used for the hot aggregation paths.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;
