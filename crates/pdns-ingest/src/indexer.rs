//! The indexing driver: folds a batch of log files into a store.
//!
//! Each file is aggregated on its own, merged into a batch aggregator,
//! and the batch is committed as one store update followed by one
//! ledger row per file, all inside a single outer transaction. Files
//! already present in the ledger are skipped, which makes ingestion
//! idempotent per input file.

use std::path::Path;

use tracing::info;

use pdns_core::errors::{IndexError, StorageError};
use pdns_core::traits::Store;
use pdns_core::types::{AggregationSummary, UpdateResult};

use crate::aggregate::{aggregate_file, DnsAggregator};

/// Index `filenames` into `store`. Any error short-circuits; on
/// transactional backends nothing is persisted in that case.
pub fn index_files(store: &mut dyn Store, filenames: &[String]) -> Result<(), IndexError> {
    store.begin().map_err(batch("store.begin"))?;

    let mut batch_agg = DnsAggregator::new();
    let mut summaries: Vec<(String, AggregationSummary)> = Vec::new();

    for filename in filenames {
        let indexed = store
            .is_log_indexed(filename)
            .map_err(file("store.is_log_indexed", filename))?;
        if indexed {
            info!(filename = %filename, "already indexed");
            continue;
        }

        let mut file_agg = DnsAggregator::new();
        aggregate_file(&mut file_agg, Path::new(filename)).map_err(|source| {
            IndexError::Aggregate {
                filename: filename.clone(),
                source,
            }
        })?;
        let result = file_agg.get_result();
        info!(
            filename = %filename,
            duration_secs = result.duration.as_secs_f64(),
            total_records = result.total_records,
            skipped_records = result.skipped_records,
            tuples = result.tuples.len(),
            individuals = result.individuals.len(),
            "aggregated"
        );
        summaries.push((filename.clone(), result.summary()));
        batch_agg.merge(file_agg);
    }

    if summaries.is_empty() {
        // Nothing aggregated; the empty transaction commits cleanly.
        return store.commit().map_err(batch("store.commit"));
    }

    let aggregated = batch_agg.get_result();
    let update = store.update(&aggregated).map_err(batch("store.update"))?;
    info!(
        duration_secs = update.duration.as_secs_f64(),
        inserted = update.inserted,
        updated = update.updated,
        "batch stored"
    );

    // Ledger rows carry the per-file aggregation counters; the batch
    // update counters are logged above but not attributed to one file.
    for (filename, summary) in &summaries {
        store
            .set_log_indexed(filename, summary, &UpdateResult::default())
            .map_err(file("store.set_log_indexed", filename))?;
    }

    store.commit().map_err(batch("store.commit"))
}

fn batch(operation: &'static str) -> impl Fn(StorageError) -> IndexError {
    move |source| IndexError::Batch { operation, source }
}

fn file<'a>(
    operation: &'static str,
    filename: &'a str,
) -> impl Fn(StorageError) -> IndexError + 'a {
    move |source| IndexError::Store {
        operation,
        filename: filename.to_string(),
        source,
    }
}
