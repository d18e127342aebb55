//! PostgreSQL store.
//!
//! Upserts go through a per-transaction staging table filled with
//! `COPY ... FROM STDIN`, then one server-side
//! `INSERT ... ON CONFLICT ... RETURNING` statement that emits an
//! indicator character per row (`I` inserted, `U` updated) which the
//! driver tallies.

use std::io::Write;
use std::time::Instant;

use postgres::{Client, NoTls};
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
    count BIGINT NOT NULL,
    ttl INTEGER NOT NULL,
    first BIGINT NOT NULL,
    last BIGINT NOT NULL,
    PRIMARY KEY (query, type, answer)
);
CREATE INDEX IF NOT EXISTS tuples_query ON tuples(query);
CREATE INDEX IF NOT EXISTS tuples_answer ON tuples(answer);
CREATE INDEX IF NOT EXISTS tuples_first ON tuples(first);
CREATE INDEX IF NOT EXISTS tuples_last ON tuples(last);

CREATE TABLE IF NOT EXISTS individual (
    which CHAR(1) NOT NULL,
    value TEXT NOT NULL,
    count BIGINT NOT NULL,
    first BIGINT NOT NULL,
    last BIGINT NOT NULL,
    PRIMARY KEY (which, value)
);
CREATE INDEX IF NOT EXISTS individual_first ON individual(first);
CREATE INDEX IF NOT EXISTS individual_last ON individual(last);

CREATE TABLE IF NOT EXISTS filenames (
    filename TEXT PRIMARY KEY NOT NULL,
    time TIMESTAMPTZ NOT NULL DEFAULT now(),
    aggregation_time DOUBLE PRECISION,
    total_records BIGINT,
    skipped_records BIGINT,
    tuples BIGINT,
    individual BIGINT,
    store_time DOUBLE PRECISION,
    inserted BIGINT,
    updated BIGINT
);
";

const UPSERT_TUPLES: &str = "
INSERT INTO tuples AS t (query, type, answer, count, ttl, first, last)
SELECT query, type, answer, count, ttl, first, last FROM tuples_staging
ON CONFLICT (query, type, answer) DO UPDATE SET
    count = t.count + EXCLUDED.count,
    ttl = EXCLUDED.ttl,
    first = least(t.first, EXCLUDED.first),
    last = greatest(t.last, EXCLUDED.last)
RETURNING CASE WHEN xmax::text = '0' THEN 'I'::text ELSE 'U'::text END
";

const UPSERT_INDIVIDUAL: &str = "
INSERT INTO individual AS i (which, value, count, first, last)
SELECT which, value, count, first, last FROM individual_staging
ON CONFLICT (which, value) DO UPDATE SET
    count = i.count + EXCLUDED.count,
    first = least(i.first, EXCLUDED.first),
    last = greatest(i.last, EXCLUDED.last)
RETURNING CASE WHEN xmax::text = '0' THEN 'I'::text ELSE 'U'::text END
";

/// PostgreSQL realization of the store contract.
pub struct PostgresStore {
    client: Client,
    tx_depth: u32,
}

impl PostgresStore {
    /// Connect to `uri` (a `postgres://` connection URL).
    pub fn open(uri: &str) -> Result<Self, StorageError> {
        let client = Client::connect(uri, NoTls).map_err(pge)?;
        Ok(Self {
            client,
            tx_depth: 0,
        })
    }

    fn stage_tuples(&mut self, result: &AggregationResult) -> Result<(), StorageError> {
        self.client
            .batch_execute(
                "CREATE TEMP TABLE IF NOT EXISTS tuples_staging (
                     query TEXT, type TEXT, answer TEXT,
                     count BIGINT, ttl INTEGER, first BIGINT, last BIGINT
                 ) ON COMMIT DROP;
                 TRUNCATE tuples_staging;",
            )
            .map_err(pge)?;
        let mut body = String::new();
        for tuple in &result.tuples {
            let first = unix_seconds(&tuple.stat.first)?;
            let last = unix_seconds(&tuple.stat.last)?;
            copy_field(&mut body, &reverse(&tuple.key.query));
            body.push('\t');
            copy_field(&mut body, &tuple.key.qtype);
            body.push('\t');
            copy_field(&mut body, &tuple.key.answer);
            body.push_str(&format!(
                "\t{}\t{}\t{}\t{}\n",
                tuple.stat.count,
                tuple.stat.ttl.unwrap_or(0),
                first,
                last
            ));
        }
        let mut writer = self
            .client
            .copy_in("COPY tuples_staging (query, type, answer, count, ttl, first, last) FROM STDIN")
            .map_err(pge)?;
        writer.write_all(body.as_bytes()).map_err(pge)?;
        writer.finish().map_err(pge)?;
        Ok(())
    }

    fn stage_individuals(&mut self, result: &AggregationResult) -> Result<(), StorageError> {
        self.client
            .batch_execute(
                "CREATE TEMP TABLE IF NOT EXISTS individual_staging (
                     which CHAR(1), value TEXT,
                     count BIGINT, first BIGINT, last BIGINT
                 ) ON COMMIT DROP;
                 TRUNCATE individual_staging;",
            )
            .map_err(pge)?;
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
            copy_field(&mut body, &value);
            body.push_str(&format!("\t{}\t{}\t{}\n", individual.stat.count, first, last));
        }
        let mut writer = self
            .client
            .copy_in("COPY individual_staging (which, value, count, first, last) FROM STDIN")
            .map_err(pge)?;
        writer.write_all(body.as_bytes()).map_err(pge)?;
        writer.finish().map_err(pge)?;
        Ok(())
    }

    fn tally_upsert(&mut self, sql: &str, outcome: &mut UpdateResult) -> Result<(), StorageError> {
        for row in self.client.query(sql, &[]).map_err(pge)? {
            let indicator: String = row.try_get(0).map_err(pge)?;
            if indicator == "I" {
                outcome.inserted += 1;
            } else {
                outcome.updated += 1;
            }
        }
        Ok(())
    }

    fn query_tuples(
        &mut self,
        sql: &str,
        params: &[&(dyn postgres::types::ToSql + Sync)],
    ) -> Result<Vec<TupleRow>, StorageError> {
        let rows = self.client.query(sql, params).map_err(pge)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let query: String = row.try_get(0).map_err(pge)?;
            let count: i64 = row.try_get(4).map_err(pge)?;
            let ttl: i32 = row.try_get(3).map_err(pge)?;
            out.push(TupleRow {
                query: reverse(&query),
                qtype: row.try_get(1).map_err(pge)?,
                answer: row.try_get(2).map_err(pge)?,
                ttl: i64::from(ttl),
                count: count as u64,
                first: row.try_get(5).map_err(pge)?,
                last: row.try_get(6).map_err(pge)?,
            });
        }
        Ok(out)
    }

    fn query_individual(
        &mut self,
        sql: &str,
        params: &[&(dyn postgres::types::ToSql + Sync)],
    ) -> Result<Vec<IndividualRow>, StorageError> {
        let rows = self.client.query(sql, params).map_err(pge)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let which: String = row.try_get(0).map_err(pge)?;
            let which = which_from_column(which.trim_end())?;
            let value: String = row.try_get(1).map_err(pge)?;
            let count: i64 = row.try_get(2).map_err(pge)?;
            out.push(IndividualRow {
                value: match which {
                    Which::Query => reverse(&value),
                    Which::Answer => value,
                },
                which,
                count: count as u64,
                first: row.try_get(3).map_err(pge)?,
                last: row.try_get(4).map_err(pge)?,
            });
        }
        Ok(out)
    }
}

impl Store for PostgresStore {
    fn init(&mut self) -> Result<(), StorageError> {
        self.client.batch_execute(SCHEMA).map_err(pge)
    }

    fn begin(&mut self) -> Result<(), StorageError> {
        if self.tx_depth == 0 {
            self.client.batch_execute("BEGIN").map_err(pge)?;
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
            self.client.batch_execute("COMMIT").map_err(pge)?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.client
            .batch_execute("TRUNCATE tuples, individual, filenames")
            .map_err(pge)
    }

    fn close(&mut self) -> Result<(), StorageError> {
        // The client closes on drop.
        Ok(())
    }

    fn is_log_indexed(&mut self, filename: &str) -> Result<bool, StorageError> {
        let row = self
            .client
            .query_opt("SELECT filename FROM filenames WHERE filename = $1", &[&filename])
            .map_err(pge)?;
        Ok(row.is_some())
    }

    fn set_log_indexed(
        &mut self,
        filename: &str,
        aggregation: &AggregationSummary,
        update: &UpdateResult,
    ) -> Result<(), StorageError> {
        self.client
            .execute(
                "INSERT INTO filenames (filename, aggregation_time, total_records,
                     skipped_records, tuples, individual, store_time, inserted, updated)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                &[
                    &filename,
                    &aggregation.duration.as_secs_f64(),
                    &(aggregation.total_records as i64),
                    &(aggregation.skipped_records as i64),
                    &(aggregation.tuples as i64),
                    &(aggregation.individuals as i64),
                    &update.duration.as_secs_f64(),
                    &(update.inserted as i64),
                    &(update.updated as i64),
                ],
            )
            .map_err(pge)?;
        Ok(())
    }

    fn update(&mut self, result: &AggregationResult) -> Result<UpdateResult, StorageError> {
        let start = Instant::now();
        self.begin()?;
        let mut outcome = UpdateResult::default();
        self.stage_tuples(result)?;
        self.tally_upsert(UPSERT_TUPLES, &mut outcome)?;
        self.stage_individuals(result)?;
        self.tally_upsert(UPSERT_INDIVIDUAL, &mut outcome)?;
        self.commit()?;
        outcome.duration = start.elapsed();
        Ok(outcome)
    }

    fn find_tuples(&mut self, value: &str) -> Result<Vec<TupleRow>, StorageError> {
        self.query_tuples(
            "SELECT query, type, answer, ttl, count, first, last FROM tuples
             WHERE query = $1 OR answer = $2 ORDER BY query, answer",
            &[&reverse(value), &value],
        )
    }

    fn find_query_tuples(&mut self, query: &str) -> Result<Vec<TupleRow>, StorageError> {
        self.query_tuples(
            "SELECT query, type, answer, ttl, count, first, last FROM tuples
             WHERE query = $1 ORDER BY query, answer",
            &[&reverse(query)],
        )
    }

    fn like_tuples(&mut self, prefix: &str) -> Result<Vec<TupleRow>, StorageError> {
        self.query_tuples(
            "SELECT query, type, answer, ttl, count, first, last FROM tuples
             WHERE query LIKE $1 ESCAPE '\\' OR answer LIKE $2 ESCAPE '\\'
             ORDER BY query, answer",
            &[&like_prefix(&reverse(prefix)), &like_prefix(prefix)],
        )
    }

    fn find_individual(&mut self, value: &str) -> Result<Vec<IndividualRow>, StorageError> {
        self.query_individual(
            "SELECT which, value, count, first, last FROM individual
             WHERE (which = 'A' AND value = $1) OR (which = 'Q' AND value = $2)
             ORDER BY which, value",
            &[&value, &reverse(value)],
        )
    }

    fn like_individual(&mut self, prefix: &str) -> Result<Vec<IndividualRow>, StorageError> {
        self.query_individual(
            "SELECT which, value, count, first, last FROM individual
             WHERE (which = 'A' AND value LIKE $1 ESCAPE '\\')
                OR (which = 'Q' AND value LIKE $2 ESCAPE '\\')
             ORDER BY which, value",
            &[&like_prefix(prefix), &like_prefix(&reverse(prefix))],
        )
    }

    fn delete_old(&mut self, days: u32) -> Result<u64, StorageError> {
        let cutoff = retention_cutoff(days);
        debug!(days, cutoff, "deleting aged rows");
        let tuples = self
            .client
            .execute("DELETE FROM tuples WHERE last < $1", &[&cutoff])
            .map_err(pge)?;
        let individuals = self
            .client
            .execute("DELETE FROM individual WHERE last < $1", &[&cutoff])
            .map_err(pge)?;
        Ok(tuples + individuals)
    }
}

/// Escape one value for the COPY text format.
fn copy_field(out: &mut String, value: &str) {
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

fn pge(e: impl std::fmt::Display) -> StorageError {
    StorageError::Postgres {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::copy_field;

    #[test]
    fn copy_escaping() {
        let mut out = String::new();
        copy_field(&mut out, "a\tb\\c\nd");
        assert_eq!(out, "a\\tb\\\\c\\nd");
    }
}
