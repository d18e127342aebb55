//! The abstract store contract.
//!
//! A store persists the two aggregate relations plus the `filenames`
//! idempotency ledger, and answers exact and prefix queries over them.
//! Implementations apply the domain reversal internally: `tuples.query`
//! is stored reversed, `individual.value` is stored reversed iff
//! `which = Q`, query inputs targeting those columns are reversed on the
//! way in, and rows are un-reversed before they are returned.

use crate::errors::StorageError;
use crate::types::{
    AggregationResult, AggregationSummary, IndividualRow, TupleRow, UpdateResult,
};

/// A passive-DNS store backend.
pub trait Store: Send {
    /// Create the schema if it does not exist.
    fn init(&mut self) -> Result<(), StorageError>;

    /// Open a session. Transactions stack: nested `begin` calls only
    /// increment a depth counter and the outermost `commit` hits the
    /// backend. Backends without transactions treat this as a no-op.
    fn begin(&mut self) -> Result<(), StorageError>;

    /// Close the current session, committing at depth zero.
    fn commit(&mut self) -> Result<(), StorageError>;

    /// Truncate all three relations. Test support only.
    fn clear(&mut self) -> Result<(), StorageError>;

    /// Release resources.
    fn close(&mut self) -> Result<(), StorageError>;

    /// Whether `filename` already has a row in the idempotency ledger.
    fn is_log_indexed(&mut self, filename: &str) -> Result<bool, StorageError>;

    /// Record one ledger row with the per-file statistics.
    fn set_log_indexed(
        &mut self,
        filename: &str,
        aggregation: &AggregationSummary,
        update: &UpdateResult,
    ) -> Result<(), StorageError>;

    /// Bulk-upsert an aggregation result. Absent keys are inserted as
    /// supplied; present keys fold monotonically (`count` summed,
    /// `first` min, `last` max) except `ttl`, which takes the incoming
    /// value.
    fn update(&mut self, result: &AggregationResult) -> Result<UpdateResult, StorageError>;

    /// Tuples whose query or answer equals `value`, ordered by
    /// `(query, answer)`.
    fn find_tuples(&mut self, value: &str) -> Result<Vec<TupleRow>, StorageError>;

    /// Tuples whose query equals `query`.
    fn find_query_tuples(&mut self, query: &str) -> Result<Vec<TupleRow>, StorageError>;

    /// Tuples whose query or answer has `prefix` as a prefix. On the
    /// query side the prefix applies to the stored (reversed) form, so
    /// it matches hostname suffixes in natural form.
    fn like_tuples(&mut self, prefix: &str) -> Result<Vec<TupleRow>, StorageError>;

    /// Individuals observed as `value`, on either side.
    fn find_individual(&mut self, value: &str) -> Result<Vec<IndividualRow>, StorageError>;

    /// Prefix variant of [`Store::find_individual`].
    fn like_individual(&mut self, prefix: &str) -> Result<Vec<IndividualRow>, StorageError>;

    /// Delete tuples and individuals last seen more than `days` days
    /// ago; returns the total rows deleted. Backends that cannot delete
    /// return [`StorageError::NotSupported`].
    fn delete_old(&mut self, days: u32) -> Result<u64, StorageError>;
}
