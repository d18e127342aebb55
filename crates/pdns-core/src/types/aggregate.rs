//! Keys, statistics, and result containers for the aggregation layer.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Whether an individual value was observed as a query or an answer.
///
/// Carried as a single character (`Q` / `A`) in the store and in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Which {
    #[serde(rename = "Q")]
    Query,
    #[serde(rename = "A")]
    Answer,
}

impl Which {
    pub fn as_str(self) -> &'static str {
        match self {
            Which::Query => "Q",
            Which::Answer => "A",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Q" => Some(Which::Query),
            "A" => Some(Which::Answer),
            _ => None,
        }
    }
}

impl fmt::Display for Which {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical identity of an observed `(query, qtype, answer)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleKey {
    pub query: String,
    pub qtype: String,
    pub answer: String,
}

/// Canonical identity of an observed individual value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndividualKey {
    pub value: String,
    pub which: Which,
}

/// Accumulated statistics for one key.
///
/// `ttl` is the most recently observed TTL and is only meaningful for
/// tuples and answer-side individuals.
#[derive(Debug, Clone, PartialEq)]
pub struct Stat {
    pub count: u64,
    pub first: String,
    pub last: String,
    pub ttl: Option<i32>,
}

/// A tuple key plus its statistics, as materialized by `get_result`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedTuple {
    pub key: TupleKey,
    pub stat: Stat,
}

/// An individual key plus its statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedIndividual {
    pub key: IndividualKey,
    pub stat: Stat,
}

/// Everything one aggregation pass produced. Element order is not
/// deterministic; callers sort if they need to.
#[derive(Debug, Clone, Default)]
pub struct AggregationResult {
    pub duration: Duration,
    pub total_records: u64,
    pub skipped_records: u64,
    pub tuples: Vec<AggregatedTuple>,
    pub individuals: Vec<AggregatedIndividual>,
}

impl AggregationResult {
    /// Counters only, retained per file for the idempotency ledger.
    pub fn summary(&self) -> AggregationSummary {
        AggregationSummary {
            duration: self.duration,
            total_records: self.total_records,
            skipped_records: self.skipped_records,
            tuples: self.tuples.len() as u64,
            individuals: self.individuals.len() as u64,
        }
    }
}

/// Per-file aggregation counters recorded in the `filenames` relation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregationSummary {
    pub duration: Duration,
    pub total_records: u64,
    pub skipped_records: u64,
    pub tuples: u64,
    pub individuals: u64,
}

/// Outcome of one bulk upsert against a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub inserted: u64,
    pub updated: u64,
    pub duration: Duration,
}
