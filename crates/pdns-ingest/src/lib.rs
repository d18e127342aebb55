//! # pdns-ingest
//!
//! The ingestion side of the pdns indexer: a format-detecting log
//! reader, the in-memory DNS aggregator, and the driver that folds a
//! batch of log files into a store.

pub mod aggregate;
pub mod indexer;
pub mod reader;

pub use aggregate::{aggregate_file, aggregate_stream, DnsAggregator};
pub use indexer::index_files;
pub use reader::{LogReader, Record};
