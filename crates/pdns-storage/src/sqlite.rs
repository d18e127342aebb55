//! SQLite store, the default backend.
//!
//! One connection, schema applied on `init`, upserts via
//! UPDATE-then-INSERT-on-zero-affected inside the session transaction.
//! Statements are prepared through the connection's statement cache.

use std::time::Instant;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use pdns_core::errors::StorageError;
use pdns_core::reverse::reverse;
use pdns_core::traits::Store;
use pdns_core::types::{
    AggregationResult, AggregationSummary, IndividualRow, TupleRow, UpdateResult, Which,
};

use crate::sql::{like_prefix, retention_cutoff, unix_seconds, which_from_column};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tuples (
    query TEXT NOT NULL,
    type TEXT NOT NULL,
    answer TEXT NOT NULL,
    count INTEGER NOT NULL,
    ttl INTEGER NOT NULL,
    first INTEGER NOT NULL,
    last INTEGER NOT NULL,
    PRIMARY KEY (query, type, answer)
);
CREATE INDEX IF NOT EXISTS tuples_query ON tuples(query);
CREATE INDEX IF NOT EXISTS tuples_answer ON tuples(answer);
CREATE INDEX IF NOT EXISTS tuples_first ON tuples(first);
CREATE INDEX IF NOT EXISTS tuples_last ON tuples(last);

CREATE TABLE IF NOT EXISTS individual (
    which TEXT NOT NULL,
    value TEXT NOT NULL,
    count INTEGER NOT NULL,
    first INTEGER NOT NULL,
    last INTEGER NOT NULL,
    PRIMARY KEY (which, value)
);
CREATE INDEX IF NOT EXISTS individual_first ON individual(first);
CREATE INDEX IF NOT EXISTS individual_last ON individual(last);

CREATE TABLE IF NOT EXISTS filenames (
    filename TEXT PRIMARY KEY NOT NULL,
    time INTEGER NOT NULL DEFAULT (unixepoch()),
    aggregation_time REAL,
    total_records INTEGER,
    skipped_records INTEGER,
    tuples INTEGER,
    individual INTEGER,
    store_time REAL,
    inserted INTEGER,
    updated INTEGER
);

PRAGMA case_sensitive_like = ON;
PRAGMA temp_store = MEMORY;
PRAGMA cache_size = 5000;
";

/// SQLite realization of the store contract.
pub struct SqliteStore {
    conn: Connection,
    tx_depth: u32,
}

impl SqliteStore {
    /// Open a store at `uri` (a path, or `:memory:` for testing).
    pub fn open(uri: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(uri).map_err(sqe)?;
        Ok(Self { conn, tx_depth: 0 })
    }
}

impl Store for SqliteStore {
    fn init(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch(SCHEMA).map_err(sqe)
    }

    fn begin(&mut self) -> Result<(), StorageError> {
        if self.tx_depth == 0 {
            self.conn.execute_batch("BEGIN").map_err(sqe)?;
        }
        self.tx_depth += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if self.tx_depth == 0 {
            return Err(StorageError::CommitWithoutBegin);
        }
        self.tx_depth -= 1;
        if self.tx_depth == 0 {
            self.conn.execute_batch("COMMIT").map_err(sqe)?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.conn
            .execute_batch("DELETE FROM tuples; DELETE FROM individual; DELETE FROM filenames;")
            .map_err(sqe)
    }

    fn close(&mut self) -> Result<(), StorageError> {
        // The connection closes on drop.
        Ok(())
    }

    fn is_log_indexed(&mut self, filename: &str) -> Result<bool, StorageError> {
        let row: Option<String> = self
            .conn
            .prepare_cached("SELECT filename FROM filenames WHERE filename = ?1")
            .map_err(sqe)?
            .query_row(params![filename], |row| row.get(0))
            .optional()
            .map_err(sqe)?;
        Ok(row.is_some())
    }

    fn set_log_indexed(
        &mut self,
        filename: &str,
        aggregation: &AggregationSummary,
        update: &UpdateResult,
    ) -> Result<(), StorageError> {
        self.conn
            .prepare_cached(
                "INSERT INTO filenames (filename, aggregation_time, total_records,
                     skipped_records, tuples, individual, store_time, inserted, updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .map_err(sqe)?
            .execute(params![
                filename,
                aggregation.duration.as_secs_f64(),
                aggregation.total_records as i64,
                aggregation.skipped_records as i64,
                aggregation.tuples as i64,
                aggregation.individuals as i64,
                update.duration.as_secs_f64(),
                update.inserted as i64,
                update.updated as i64,
            ])
            .map_err(sqe)?;
        Ok(())
    }

    fn update(&mut self, result: &AggregationResult) -> Result<UpdateResult, StorageError> {
        let start = Instant::now();
        self.begin()?;
        let mut outcome = UpdateResult::default();
        {
            let mut update_tuples = self
                .conn
                .prepare_cached(
                    "UPDATE tuples SET
                         count = count + ?1,
                         ttl = ?2,
                         first = min(first, ?3),
                         last = max(last, ?4)
                     WHERE query = ?5 AND type = ?6 AND answer = ?7",
                )
                .map_err(sqe)?;
            let mut insert_tuples = self
                .conn
                .prepare_cached(
                    "INSERT INTO tuples (query, type, answer, ttl, count, first, last)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(sqe)?;
            for tuple in &result.tuples {
                let query = reverse(&tuple.key.query);
                let first = unix_seconds(&tuple.stat.first)?;
                let last = unix_seconds(&tuple.stat.last)?;
                let ttl = tuple.stat.ttl.unwrap_or(0);
                let affected = update_tuples
                    .execute(params![
                        tuple.stat.count as i64,
                        ttl,
                        first,
                        last,
                        query,
                        tuple.key.qtype,
                        tuple.key.answer,
                    ])
                    .map_err(sqe)?;
                if affected == 0 {
                    insert_tuples
                        .execute(params![
                            query,
                            tuple.key.qtype,
                            tuple.key.answer,
                            ttl,
                            tuple.stat.count as i64,
                            first,
                            last,
                        ])
                        .map_err(sqe)?;
                    outcome.inserted += 1;
                } else {
                    outcome.updated += 1;
                }
            }

            let mut update_individual = self
                .conn
                .prepare_cached(
                    "UPDATE individual SET
                         count = count + ?1,
                         first = min(first, ?2),
                         last = max(last, ?3)
                     WHERE which = ?4 AND value = ?5",
                )
                .map_err(sqe)?;
            let mut insert_individual = self
                .conn
                .prepare_cached(
                    "INSERT INTO individual (which, value, count, first, last)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(sqe)?;
            for individual in &result.individuals {
                let value = match individual.key.which {
                    Which::Query => reverse(&individual.key.value),
                    Which::Answer => individual.key.value.clone(),
                };
                let first = unix_seconds(&individual.stat.first)?;
                let last = unix_seconds(&individual.stat.last)?;
                let affected = update_individual
                    .execute(params![
                        individual.stat.count as i64,
                        first,
                        last,
                        individual.key.which.as_str(),
                        value,
                    ])
                    .map_err(sqe)?;
                if affected == 0 {
                    insert_individual
                        .execute(params![
                            individual.key.which.as_str(),
                            value,
                            individual.stat.count as i64,
                            first,
                            last,
                        ])
                        .map_err(sqe)?;
                    outcome.inserted += 1;
                } else {
                    outcome.updated += 1;
                }
            }
        }
        self.commit()?;
        outcome.duration = start.elapsed();
        Ok(outcome)
    }

    fn find_tuples(&mut self, value: &str) -> Result<Vec<TupleRow>, StorageError> {
        self.query_tuples(
            "SELECT query, type, answer, ttl, count, first, last FROM tuples
             WHERE query = ?1 OR answer = ?2 ORDER BY query, answer",
            &[&reverse(value), &value],
        )
    }

    fn find_query_tuples(&mut self, query: &str) -> Result<Vec<TupleRow>, StorageError> {
        self.query_tuples(
            "SELECT query, type, answer, ttl, count, first, last FROM tuples
             WHERE query = ?1 ORDER BY query, answer",
            &[&reverse(query)],
        )
    }

    fn like_tuples(&mut self, prefix: &str) -> Result<Vec<TupleRow>, StorageError> {
        self.query_tuples(
            "SELECT query, type, answer, ttl, count, first, last FROM tuples
             WHERE query LIKE ?1 ESCAPE '\\' OR answer LIKE ?2 ESCAPE '\\'
             ORDER BY query, answer",
            &[&like_prefix(&reverse(prefix)), &like_prefix(prefix)],
        )
    }

    fn find_individual(&mut self, value: &str) -> Result<Vec<IndividualRow>, StorageError> {
        self.query_individual(
            "SELECT which, value, count, first, last FROM individual
             WHERE (which = 'A' AND value = ?1) OR (which = 'Q' AND value = ?2)
             ORDER BY which, value",
            &[&value, &reverse(value)],
        )
    }

    fn like_individual(&mut self, prefix: &str) -> Result<Vec<IndividualRow>, StorageError> {
        self.query_individual(
            "SELECT which, value, count, first, last FROM individual
             WHERE (which = 'A' AND value LIKE ?1 ESCAPE '\\')
                OR (which = 'Q' AND value LIKE ?2 ESCAPE '\\')
             ORDER BY which, value",
            &[&like_prefix(prefix), &like_prefix(&reverse(prefix))],
        )
    }

    fn delete_old(&mut self, days: u32) -> Result<u64, StorageError> {
        let cutoff = retention_cutoff(days);
        debug!(days, cutoff, "deleting aged rows");
        let tuples = self
            .conn
            .prepare_cached("DELETE FROM tuples WHERE last < ?1")
            .map_err(sqe)?
            .execute(params![cutoff])
            .map_err(sqe)?;
        let individuals = self
            .conn
            .prepare_cached("DELETE FROM individual WHERE last < ?1")
            .map_err(sqe)?
            .execute(params![cutoff])
            .map_err(sqe)?;
        Ok(tuples as u64 + individuals as u64)
    }
}

impl SqliteStore {
    fn query_tuples(
        &mut self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<TupleRow>, StorageError> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(sqe)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(TupleRow {
                    query: reverse(&row.get::<_, String>(0)?),
                    qtype: row.get(1)?,
                    answer: row.get(2)?,
                    ttl: row.get(3)?,
                    count: row.get::<_, i64>(4)? as u64,
                    first: row.get(5)?,
                    last: row.get(6)?,
                })
            })
            .map_err(sqe)?;
        collect_rows(rows)
    }

    fn query_individual(
        &mut self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<IndividualRow>, StorageError> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(sqe)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(sqe)?;
        let mut out = Vec::new();
        for row in rows {
            let (which, value, count, first, last) = row.map_err(sqe)?;
            let which = which_from_column(&which)?;
            out.push(IndividualRow {
                value: match which {
                    Which::Query => reverse(&value),
                    Which::Answer => value,
                },
                which,
                count: count as u64,
                first,
                last,
            });
        }
        Ok(out)
    }
}

fn collect_rows<T>(
    rows: impl Iterator<Item = Result<T, rusqlite::Error>>,
) -> Result<Vec<T>, StorageError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sqe)?);
    }
    Ok(out)
}

fn sqe(e: impl std::fmt::Display) -> StorageError {
    StorageError::Sqlite {
        message: e.to_string(),
    }
}
