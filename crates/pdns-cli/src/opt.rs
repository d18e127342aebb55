//! Command-line definitions.

use clap::{Parser, Subcommand};

/// Passive-DNS log indexer.
#[derive(Debug, Parser)]
#[command(name = "pdns", version, about)]
pub struct PdnsCli {
    /// Store backend: sqlite, postgresql, or clickhouse.
    #[arg(long, env = "PDNS_STORE_TYPE", default_value = "sqlite", global = true)]
    pub store: String,

    /// Store URI: a path for sqlite, a connection URL otherwise.
    #[arg(long, env = "PDNS_STORE_URI", default_value = "db.sqlite", global = true)]
    pub uri: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bulk-index DNS log files.
    Index {
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Exact search.
    Find {
        #[command(subcommand)]
        target: SearchTarget,
    },

    /// Prefix search.
    Like {
        #[command(subcommand)]
        target: SearchTarget,
    },

    /// Delete rows not seen within the retention window.
    DeleteOld {
        /// Retention window in days.
        #[arg(long, env = "PDNS_DELETE_OLD_DAYS", default_value_t = 365)]
        days: u32,
    },

    /// Serve the HTTP query API.
    Web {
        /// Listen address, e.g. `:8080` or `127.0.0.1:8080`.
        #[arg(long, env = "PDNS_HTTP_LISTEN", default_value = ":8080")]
        listen: String,
    },

    /// Print the build version.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum SearchTarget {
    /// Search the (query, type, answer) relation.
    Tuples { value: String },
    /// Search observed individual values.
    Individual { value: String },
}
