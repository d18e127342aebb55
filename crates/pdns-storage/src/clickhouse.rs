//! ClickHouse store, driven over the HTTP interface.
//!
//! The two relations are `AggregatingMergeTree` tables whose statistic
//! columns are aggregate-function states: writes append `-State` rows
//! through `input(...)`, reads fold them back with the matching `-Merge`
//! combinators and `GROUP BY` on the key columns. There are no
//! transactions; `begin`/`commit` are no-ops, `update` cannot report an
//! inserted/updated split, and retention deletes are unsupported.
//! Values are bound server-side via `{name:Type}` parameters.

use std::time::Instant;

use reqwest::blocking::Client;
use tracing::debug;

use pdns_core::errors::StorageError;
use pdns_core::reverse::reverse;
use pdns_core::traits::Store;
use pdns_core::types::{
    AggregationResult, AggregationSummary, IndividualRow, TupleRow, UpdateResult, Which,
};

use crate::sql::{like_prefix, unix_seconds, which_from_column};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tuples (
         query String,
         type String,
         answer String,
         ttl AggregateFunction(anyLast, Int32),
         first AggregateFunction(min, Int64),
         last AggregateFunction(max, Int64),
         count AggregateFunction(sum, UInt64)
     ) ENGINE = AggregatingMergeTree() ORDER BY (query, type, answer)",
    "CREATE TABLE IF NOT EXISTS individual (
         which Enum8('Q' = 0, 'A' = 1),
         value String,
         first AggregateFunction(min, Int64),
         last AggregateFunction(max, Int64),
         count AggregateFunction(sum, UInt64)
     ) ENGINE = AggregatingMergeTree() ORDER BY (which, value)",
    "CREATE TABLE IF NOT EXISTS filenames (
         ts DateTime DEFAULT now(),
         filename String,
         aggregation_time Float64,
         total_records UInt64,
         skipped_records UInt64,
         tuples UInt64,
         individual UInt64,
         store_time Float64,
         inserted UInt64,
         updated UInt64
     ) ENGINE = MergeTree() ORDER BY filename",
];

const INSERT_TUPLES: &str = "\
INSERT INTO tuples
SELECT query, type, answer,
       anyLastState(ttl), minState(first), maxState(last), sumState(count)
FROM input('query String, type String, answer String, \
            ttl Int32, first Int64, last Int64, count UInt64')
GROUP BY query, type, answer
FORMAT TabSeparated";

const INSERT_INDIVIDUAL: &str = "\
INSERT INTO individual
SELECT which, value, minState(first), maxState(last), sumState(count)
FROM input('which String, value String, first Int64, last Int64, count UInt64')
GROUP BY which, value
FORMAT TabSeparated";

/// ClickHouse realization of the store contract.
pub struct ClickhouseStore {
    http: Client,
    endpoint: String,
}

impl ClickhouseStore {
    /// Connect to `uri`, the HTTP endpoint (e.g.
    /// `http://localhost:8123/?database=pdns`).
    pub fn open(uri: &str) -> Result<Self, StorageError> {
        let http = Client::builder().build().map_err(che)?;
        Ok(Self {
            http,
            endpoint: uri.to_string(),
        })
    }

    /// Run a statement with server-side `{name:Type}` parameters and
    /// return the raw TabSeparated response.
    fn execute(&self, sql: &str, params: &[(&str, &str)]) -> Result<String, StorageError> {
        let mut request = self.http.post(&self.endpoint).query(&[("query", sql)]);
        for (name, value) in params {
            request = request.query(&[(format!("param_{name}"), value)]);
        }
        let response = request.send().map_err(che)?;
        let status = response.status();
        let body = response.text().map_err(che)?;
        if !status.is_success() {
            return Err(StorageError::Clickhouse {
                message: format!("{status}: {}", body.trim_end()),
            });
        }
        Ok(body)
    }

    /// Run an INSERT whose data rows travel in the request body.
    fn insert(&self, sql: &str, body: String) -> Result<(), StorageError> {
        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("query", sql)])
            .body(body)
            .send()
            .map_err(che)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().map_err(che)?;
            return Err(StorageError::Clickhouse {
                message: format!("{status}: {}", body.trim_end()),
            });
        }
        Ok(())
    }

    fn query_tuples(
        &self,
        condition: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<TupleRow>, StorageError> {
        let sql = format!(
            "SELECT query, type, answer, \
                    anyLastMerge(ttl), minMerge(first), maxMerge(last), sumMerge(count) \
             FROM tuples WHERE {condition} \
             GROUP BY query, type, answer ORDER BY query, answer \
             FORMAT TabSeparated"
        );
        let body = self.execute(&sql, params)?;
        let mut out = Vec::new();
        for line in body.lines() {
            let fields = split_tsv(line, 7)?;
            out.push(TupleRow {
                query: reverse(&fields[0]),
                qtype: fields[1].clone(),
                answer: fields[2].clone(),
                ttl: parse_num(&fields[3], "ttl")?,
                count: parse_num::<u64>(&fields[6], "count")?,
                first: parse_num(&fields[4], "first")?,
                last: parse_num(&fields[5], "last")?,
            });
        }
        Ok(out)
    }

    fn query_individual(
        &self,
        condition: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<IndividualRow>, StorageError> {
        let sql = format!(
            "SELECT which, value, minMerge(first), maxMerge(last), sumMerge(count) \
             FROM individual WHERE {condition} \
             GROUP BY which, value ORDER BY which, value \
             FORMAT TabSeparated"
        );
        let body = self.execute(&sql, params)?;
        let mut out = Vec::new();
        for line in body.lines() {
            let fields = split_tsv(line, 5)?;
            let which = which_from_column(&fields[0])?;
            out.push(IndividualRow {
                value: match which {
                    Which::Query => reverse(&fields[1]),
                    Which::Answer => fields[1].clone(),
                },
                which,
                count: parse_num::<u64>(&fields[4], "count")?,
                first: parse_num(&fields[2], "first")?,
                last: parse_num(&fields[3], "last")?,
            });
        }
        Ok(out)
    }
}

impl Store for ClickhouseStore {
    fn init(&mut self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            self.execute(statement, &[])?;
        }
        Ok(())
    }

    // No transactions; the driver's begin/commit frame is accepted and
    // ignored, which makes the filenames ledger at-least-once.
    fn begin(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        for table in ["tuples", "individual", "filenames"] {
            self.execute(&format!("TRUNCATE TABLE {table}"), &[])?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn is_log_indexed(&mut self, filename: &str) -> Result<bool, StorageError> {
        let body = self.execute(
            "SELECT filename FROM filenames WHERE filename = {filename:String} LIMIT 1 \
             FORMAT TabSeparated",
            &[("filename", filename)],
        )?;
        Ok(!body.trim().is_empty())
    }

    fn set_log_indexed(
        &mut self,
        filename: &str,
        aggregation: &AggregationSummary,
        update: &UpdateResult,
    ) -> Result<(), StorageError> {
        let mut row = String::new();
        tsv_field(&mut row, filename);
        row.push_str(&format!(
            "\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            aggregation.duration.as_secs_f64(),
            aggregation.total_records,
            aggregation.skipped_records,
            aggregation.tuples,
            aggregation.individuals,
            update.duration.as_secs_f64(),
            update.inserted,
            update.updated,
        ));
        self.insert(
            "INSERT INTO filenames (filename, aggregation_time, total_records, \
                 skipped_records, tuples, individual, store_time, inserted, updated) \
             FORMAT TabSeparated",
            row,
        )
    }

    fn update(&mut self, result: &AggregationResult) -> Result<UpdateResult, StorageError> {
        let start = Instant::now();

        let mut body = String::new();
        for tuple in &result.tuples {
            let first = unix_seconds(&tuple.stat.first)?;
            let last = unix_seconds(&tuple.stat.last)?;
            tsv_field(&mut body, &reverse(&tuple.key.query));
            body.push('\t');
            tsv_field(&mut body, &tuple.key.qtype);
            body.push('\t');
            tsv_field(&mut body, &tuple.key.answer);
            body.push_str(&format!(
                "\t{}\t{}\t{}\t{}\n",
                tuple.stat.ttl.unwrap_or(0),
                first,
                last,
                tuple.stat.count
            ));
        }
        if !body.is_empty() {
            self.insert(INSERT_TUPLES, body)?;
        }

        let mut body = String::new();
        for individual in &result.individuals {
            let value = match individual.key.which {
                Which::Query => reverse(&individual.key.value),
                Which::Answer => individual.key.value.clone(),
            };
            let first = unix_seconds(&individual.stat.first)?;
            let last = unix_seconds(&individual.stat.last)?;
            body.push_str(individual.key.which.as_str());
            body.push('\t');
            tsv_field(&mut body, &value);
            body.push_str(&format!("\t{}\t{}\t{}\n", first, last, individual.stat.count));
        }
        if !body.is_empty() {
            self.insert(INSERT_INDIVIDUAL, body)?;
        }

        debug!(
            tuples = result.tuples.len(),
            individuals = result.individuals.len(),
            "appended aggregate states"
        );
        // Append-only writes cannot distinguish inserted from updated.
        Ok(UpdateResult {
            inserted: 0,
            updated: 0,
            duration: start.elapsed(),
        })
    }

    fn find_tuples(&mut self, value: &str) -> Result<Vec<TupleRow>, StorageError> {
        self.query_tuples(
            "query = {q:String} OR answer = {v:String}",
            &[("q", &reverse(value)), ("v", value)],
        )
    }

    fn find_query_tuples(&mut self, query: &str) -> Result<Vec<TupleRow>, StorageError> {
        self.query_tuples("query = {q:String}", &[("q", &reverse(query))])
    }

    fn like_tuples(&mut self, prefix: &str) -> Result<Vec<TupleRow>, StorageError> {
        self.query_tuples(
            "query LIKE {qp:String} OR answer LIKE {vp:String}",
            &[
                ("qp", &like_prefix(&reverse(prefix))),
                ("vp", &like_prefix(prefix)),
            ],
        )
    }

    fn find_individual(&mut self, value: &str) -> Result<Vec<IndividualRow>, StorageError> {
        self.query_individual(
            "(which = 'A' AND value = {v:String}) OR (which = 'Q' AND value = {r:String})",
            &[("v", value), ("r", &reverse(value))],
        )
    }

    fn like_individual(&mut self, prefix: &str) -> Result<Vec<IndividualRow>, StorageError> {
        self.query_individual(
            "(which = 'A' AND value LIKE {vp:String}) OR (which = 'Q' AND value LIKE {rp:String})",
            &[
                ("vp", &like_prefix(prefix)),
                ("rp", &like_prefix(&reverse(prefix))),
            ],
        )
    }

    fn delete_old(&mut self, _days: u32) -> Result<u64, StorageError> {
        Err(StorageError::NotSupported {
            operation: "delete_old",
            reason: "the clickhouse backend is append-only",
        })
    }
}

/// Escape one value for a TabSeparated cell.
fn tsv_field(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
}

/// Split one TabSeparated response line into exactly `expected` cells,
/// undoing the escaping.
fn split_tsv(line: &str, expected: usize) -> Result<Vec<String>, StorageError> {
    let mut fields = Vec::with_capacity(expected);
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\t' => fields.push(std::mem::take(&mut current)),
            '\\' => match chars.next() {
                Some('t') => current.push('\t'),
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some('0') => current.push('\0'),
                Some('b') => current.push('\u{8}'),
                Some('f') => current.push('\u{c}'),
                Some('\'') => current.push('\''),
                Some('\\') => current.push('\\'),
                Some(other) => current.push(other),
                None => current.push('\\'),
            },
            _ => current.push(c),
        }
    }
    fields.push(current);
    if fields.len() != expected {
        return Err(StorageError::Clickhouse {
            message: format!(
                "expected {expected} columns in response row, got {}",
                fields.len()
            ),
        });
    }
    Ok(fields)
}

fn parse_num<T: std::str::FromStr>(value: &str, column: &'static str) -> Result<T, StorageError> {
    value.parse().map_err(|_| StorageError::BadColumn {
        column,
        value: value.to_string(),
    })
}

fn che(e: impl std::fmt::Display) -> StorageError {
    StorageError::Clickhouse {
        message: e.to_string(),
    }
}
