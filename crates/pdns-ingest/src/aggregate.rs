//! In-memory DNS aggregation.
//!
//! Folds a stream of records into the two relations: `(query, qtype,
//! answer)` tuples and individual values tagged Q or A. Statistics fold
//! monotonically (`count` summed, `first` min, `last` max under the
//! timestamp ordering); `ttl` keeps the latest observation.

use std::cmp::Ordering;
use std::fs::File;
use std::hash::Hash;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use tracing::{debug, warn};

use pdns_core::errors::ReadError;
use pdns_core::timestamp::{self, strip_decimal};
use pdns_core::types::{
    AggregatedIndividual, AggregatedTuple, AggregationResult, DnsRecord, IndividualKey, Stat,
    TupleKey, Which,
};
use pdns_core::{FxHashMap, MAX_VALUE_LEN};

use crate::reader::LogReader;

/// The fold state over a stream of DNS records.
pub struct DnsAggregator {
    tuples: FxHashMap<TupleKey, Stat>,
    individuals: FxHashMap<IndividualKey, Stat>,
    total_records: u64,
    skipped_records: u64,
    start: Instant,
}

impl Default for DnsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsAggregator {
    pub fn new() -> Self {
        Self {
            tuples: FxHashMap::default(),
            individuals: FxHashMap::default(),
            total_records: 0,
            skipped_records: 0,
            start: Instant::now(),
        }
    }

    /// Fold one record in. Malformed records (oversized values, embedded
    /// NULs, unparseable TTLs, non-parallel answer/TTL lists) are
    /// skipped wholesale and contribute nothing, not even the query-side
    /// individual.
    pub fn add_record(&mut self, record: DnsRecord) {
        if record.query.len() > MAX_VALUE_LEN {
            warn!(len = record.query.len(), "skipping record, query too long");
            self.skipped_records += 1;
            return;
        }
        let query = record.query.trim_end_matches('\0');
        if query.contains('\0') {
            warn!("skipping record, embedded NUL in query");
            self.skipped_records += 1;
            return;
        }
        if record.answers.len() != record.ttls.len() {
            warn!(
                answers = record.answers.len(),
                ttls = record.ttls.len(),
                "skipping record, answers and TTLs are not parallel"
            );
            self.skipped_records += 1;
            return;
        }

        let mut pairs = Vec::with_capacity(record.answers.len());
        for (answer, raw_ttl) in record.answers.iter().zip(&record.ttls) {
            if answer.len() > MAX_VALUE_LEN {
                warn!(len = answer.len(), "skipping record, answer too long");
                self.skipped_records += 1;
                return;
            }
            // "-" is the no-answer sentinel; drop the pair, keep the record.
            if answer == "-" {
                continue;
            }
            let Some(ttl) = normalize_ttl(raw_ttl) else {
                warn!(ttl = %raw_ttl, "skipping record, unparseable TTL");
                self.skipped_records += 1;
                return;
            };
            pairs.push((answer.as_str(), ttl));
        }

        self.total_records += 1;
        upsert(
            &mut self.individuals,
            IndividualKey {
                value: query.to_string(),
                which: Which::Query,
            },
            &record.ts,
            None,
        );
        for (answer, ttl) in pairs {
            upsert(
                &mut self.tuples,
                TupleKey {
                    query: query.to_string(),
                    qtype: record.qtype.clone(),
                    answer: answer.to_string(),
                },
                &record.ts,
                Some(ttl),
            );
            upsert(
                &mut self.individuals,
                IndividualKey {
                    value: answer.to_string(),
                    which: Which::Answer,
                },
                &record.ts,
                Some(ttl),
            );
        }
    }

    /// Count a record the reader rejected (missing field).
    pub fn record_skipped(&mut self) {
        self.skipped_records += 1;
    }

    /// Fold another aggregator in. `count`/`first`/`last` merge
    /// commutatively; `ttl` takes the other side's value (last write
    /// wins, merge order dependent). Totals are not merged.
    pub fn merge(&mut self, other: DnsAggregator) {
        for (key, stat) in other.tuples {
            merge_stat(&mut self.tuples, key, stat);
        }
        for (key, stat) in other.individuals {
            merge_stat(&mut self.individuals, key, stat);
        }
    }

    /// Materialize the maps. State is not cleared; element order is not
    /// deterministic.
    pub fn get_result(&self) -> AggregationResult {
        AggregationResult {
            duration: self.start.elapsed(),
            total_records: self.total_records,
            skipped_records: self.skipped_records,
            tuples: self
                .tuples
                .iter()
                .map(|(key, stat)| AggregatedTuple {
                    key: key.clone(),
                    stat: stat.clone(),
                })
                .collect(),
            individuals: self
                .individuals
                .iter()
                .map(|(key, stat)| AggregatedIndividual {
                    key: key.clone(),
                    stat: stat.clone(),
                })
                .collect(),
        }
    }
}

/// Normalize a raw TTL: drop the fractional part, `"-"` reads as zero,
/// negatives clamp to zero. `None` means the TTL is not a 32-bit int
/// and the whole record must be skipped.
fn normalize_ttl(raw: &str) -> Option<i32> {
    let ttl = strip_decimal(raw).parse::<i32>().ok()?;
    Some(ttl.max(0))
}

fn upsert<K: Eq + Hash>(map: &mut FxHashMap<K, Stat>, key: K, ts: &str, ttl: Option<i32>) {
    match map.entry(key) {
        std::collections::hash_map::Entry::Occupied(mut entry) => {
            let stat = entry.get_mut();
            stat.count += 1;
            if timestamp::compare(ts, &stat.first) == Ordering::Less {
                stat.first = ts.to_string();
            }
            if timestamp::compare(ts, &stat.last) == Ordering::Greater {
                stat.last = ts.to_string();
            }
            if ttl.is_some() {
                stat.ttl = ttl;
            }
        }
        std::collections::hash_map::Entry::Vacant(slot) => {
            slot.insert(Stat {
                count: 1,
                first: ts.to_string(),
                last: ts.to_string(),
                ttl,
            });
        }
    }
}

fn merge_stat<K: Eq + Hash>(map: &mut FxHashMap<K, Stat>, key: K, incoming: Stat) {
    match map.entry(key) {
        std::collections::hash_map::Entry::Occupied(mut entry) => {
            let stat = entry.get_mut();
            stat.count += incoming.count;
            if timestamp::compare(&incoming.first, &stat.first) == Ordering::Less {
                stat.first = incoming.first;
            }
            if timestamp::compare(&incoming.last, &stat.last) == Ordering::Greater {
                stat.last = incoming.last;
            }
            stat.ttl = incoming.ttl;
        }
        std::collections::hash_map::Entry::Vacant(slot) => {
            slot.insert(incoming);
        }
    }
}

/// Aggregate one log file into `aggregator`.
pub fn aggregate_file(aggregator: &mut DnsAggregator, path: &Path) -> Result<(), ReadError> {
    let file = File::open(path)?;
    aggregate_stream(aggregator, BufReader::new(file))
}

/// Aggregate an already-open log stream. Records the reader rejects for
/// a missing field are counted as skipped; any other record error
/// aborts the stream.
pub fn aggregate_stream<R: BufRead>(
    aggregator: &mut DnsAggregator,
    input: R,
) -> Result<(), ReadError> {
    let mut reader = LogReader::new(input)?;
    while let Some(mut record) = reader.next_record()? {
        let ts = record.get_timestamp("ts");
        let query = record.get_string("query");
        let qtype = record.get_string("qtype_name");
        let answers = record.get_string_list("answers");
        let ttls = record.get_string_list("TTLs");
        match record.take_error() {
            None => aggregator.add_record(DnsRecord {
                ts,
                query,
                qtype,
                answers,
                ttls,
            }),
            Some(err) if err.is_missing_field() => {
                debug!(%err, "skipping record");
                aggregator.record_skipped();
            }
            Some(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: &str, query: &str, answers: &[&str], ttls: &[&str]) -> DnsRecord {
        DnsRecord {
            ts: ts.to_string(),
            query: query.to_string(),
            qtype: "A".to_string(),
            answers: answers.iter().map(|s| s.to_string()).collect(),
            ttls: ttls.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn sorted_tuples(result: &AggregationResult) -> Vec<AggregatedTuple> {
        let mut tuples = result.tuples.clone();
        tuples.sort_by(|a, b| {
            (&a.key.query, &a.key.answer).cmp(&(&b.key.query, &b.key.answer))
        });
        tuples
    }

    fn sorted_individuals(result: &AggregationResult) -> Vec<AggregatedIndividual> {
        let mut individuals = result.individuals.clone();
        individuals.sort_by(|a, b| a.key.value.cmp(&b.key.value));
        individuals
    }

    fn find_individual<'a>(
        result: &'a AggregationResult,
        value: &str,
        which: Which,
    ) -> &'a AggregatedIndividual {
        result
            .individuals
            .iter()
            .find(|i| i.key.value == value && i.key.which == which)
            .unwrap()
    }

    #[test]
    fn single_record_single_answer() {
        let mut ag = DnsAggregator::new();
        ag.add_record(record("10", "www.example.com", &["1.2.3.4"], &["300"]));

        let res = ag.get_result();
        assert_eq!(res.total_records, 1);
        assert_eq!(res.skipped_records, 0);
        assert_eq!(res.tuples.len(), 1);
        assert_eq!(res.individuals.len(), 2);

        let tuple = &res.tuples[0];
        assert_eq!(tuple.key.query, "www.example.com");
        assert_eq!(tuple.key.qtype, "A");
        assert_eq!(tuple.key.answer, "1.2.3.4");
        assert_eq!(
            tuple.stat,
            Stat {
                count: 1,
                first: "10".into(),
                last: "10".into(),
                ttl: Some(300)
            }
        );

        let q = find_individual(&res, "www.example.com", Which::Query);
        assert_eq!(q.stat.count, 1);
        assert_eq!(q.stat.ttl, None);
        let a = find_individual(&res, "1.2.3.4", Which::Answer);
        assert_eq!(a.stat.count, 1);
        assert_eq!(a.stat.ttl, Some(300));
    }

    #[test]
    fn repeat_advances_last_and_count() {
        let mut ag = DnsAggregator::new();
        ag.add_record(record("10", "www.example.com", &["1.2.3.4"], &["300"]));
        ag.add_record(record("20", "www.example.com", &["1.2.3.4"], &["300"]));

        let res = ag.get_result();
        let tuple = &res.tuples[0];
        assert_eq!(tuple.stat.count, 2);
        assert_eq!(tuple.stat.first, "10");
        assert_eq!(tuple.stat.last, "20");
        assert_eq!(tuple.stat.ttl, Some(300));
        assert_eq!(find_individual(&res, "www.example.com", Which::Query).stat.count, 2);
        assert_eq!(find_individual(&res, "1.2.3.4", Which::Answer).stat.count, 2);
    }

    #[test]
    fn merge_folds_counts_and_extremes() {
        let mut ag = DnsAggregator::new();
        ag.add_record(record("10", "www.example.com", &["1.2.3.4"], &["300"]));
        ag.add_record(record("200", "www.example.com", &["1.2.3.4"], &["300"]));

        let mut ag2 = DnsAggregator::new();
        ag2.add_record(record("30", "www.example.com", &["1.2.3.4"], &["300"]));
        ag2.add_record(record("30", "www.example.com", &["1.2.3.5"], &["300"]));
        ag2.add_record(record("40", "www.example.com", &["1.2.3.5"], &["300"]));

        ag.merge(ag2);
        let res = ag.get_result();

        let tuples = sorted_tuples(&res);
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[0].key.answer, "1.2.3.4");
        assert_eq!(tuples[0].stat.count, 3);
        assert_eq!(tuples[0].stat.first, "10");
        assert_eq!(tuples[0].stat.last, "200");
        assert_eq!(tuples[1].key.answer, "1.2.3.5");
        assert_eq!(tuples[1].stat.count, 2);
        assert_eq!(tuples[1].stat.first, "30");
        assert_eq!(tuples[1].stat.last, "40");

        let q = find_individual(&res, "www.example.com", Which::Query);
        assert_eq!(q.stat.count, 5);
        assert_eq!(q.stat.first, "10");
        assert_eq!(q.stat.last, "200");
    }

    #[test]
    fn merge_equals_direct_adds() {
        let mut direct = DnsAggregator::new();
        direct.add_record(record("10", "www.example.com", &["1.2.3.4"], &["300"]));
        direct.add_record(record("20", "www.example.com", &["1.2.3.4"], &["120"]));

        let mut a = DnsAggregator::new();
        a.add_record(record("10", "www.example.com", &["1.2.3.4"], &["300"]));
        let mut b = DnsAggregator::new();
        b.add_record(record("20", "www.example.com", &["1.2.3.4"], &["120"]));
        let mut merged = DnsAggregator::new();
        merged.merge(a);
        merged.merge(b);

        assert_eq!(sorted_tuples(&direct.get_result()), sorted_tuples(&merged.get_result()));
        assert_eq!(
            sorted_individuals(&direct.get_result()),
            sorted_individuals(&merged.get_result())
        );
    }

    #[test]
    fn no_answer_sentinel_is_dropped_silently() {
        let mut ag = DnsAggregator::new();
        ag.add_record(record("10", "www.example.com", &["-"], &["-"]));

        let res = ag.get_result();
        assert_eq!(res.total_records, 1);
        assert_eq!(res.skipped_records, 0);
        assert!(res.tuples.is_empty());
        assert_eq!(res.individuals.len(), 1);
        assert_eq!(res.individuals[0].key.which, Which::Query);
    }

    #[test]
    fn insane_ttl_drops_whole_record() {
        let mut ag = DnsAggregator::new();
        ag.add_record(record("10", "www.example.com", &["1.2.3.4"], &["not-a-number"]));

        let res = ag.get_result();
        assert_eq!(res.total_records, 0);
        assert_eq!(res.skipped_records, 1);
        assert!(res.tuples.is_empty());
        // Not even the query-side individual survives.
        assert!(res.individuals.is_empty());
    }

    #[test]
    fn ttl_normalization_boundaries() {
        assert_eq!(normalize_ttl("2147483647"), Some(2147483647));
        assert_eq!(normalize_ttl("2147483648"), None);
        assert_eq!(normalize_ttl("-5"), Some(0));
        assert_eq!(normalize_ttl("-"), Some(0));
        assert_eq!(normalize_ttl("300.7"), Some(300));
    }

    #[test]
    fn ttl_tracks_latest_observation() {
        let mut ag = DnsAggregator::new();
        ag.add_record(record("10", "www.example.com", &["1.2.3.4"], &["300"]));
        ag.add_record(record("20", "www.example.com", &["1.2.3.4"], &["60"]));
        assert_eq!(ag.get_result().tuples[0].stat.ttl, Some(60));
    }

    #[test]
    fn value_length_boundaries() {
        let exact = "a".repeat(MAX_VALUE_LEN);
        let over = "a".repeat(MAX_VALUE_LEN + 1);

        let mut ag = DnsAggregator::new();
        ag.add_record(record("10", &exact, &["1.2.3.4"], &["300"]));
        assert_eq!(ag.get_result().total_records, 1);

        let mut ag = DnsAggregator::new();
        ag.add_record(record("10", &over, &["1.2.3.4"], &["300"]));
        let res = ag.get_result();
        assert_eq!(res.total_records, 0);
        assert_eq!(res.skipped_records, 1);

        let mut ag = DnsAggregator::new();
        ag.add_record(record("10", "www.example.com", &[over.as_str()], &["300"]));
        let res = ag.get_result();
        assert_eq!(res.skipped_records, 1);
        assert!(res.individuals.is_empty());
    }

    #[test]
    fn nul_handling() {
        let mut ag = DnsAggregator::new();
        ag.add_record(record("10", "www.example.com\0\0", &["1.2.3.4"], &["300"]));
        let res = ag.get_result();
        assert_eq!(res.total_records, 1);
        assert_eq!(
            find_individual(&res, "www.example.com", Which::Query).stat.count,
            1
        );

        let mut ag = DnsAggregator::new();
        ag.add_record(record("10", "www\0example.com", &["1.2.3.4"], &["300"]));
        let res = ag.get_result();
        assert_eq!(res.total_records, 0);
        assert_eq!(res.skipped_records, 1);
    }

    #[test]
    fn first_le_last_even_out_of_order() {
        let mut ag = DnsAggregator::new();
        ag.add_record(record("20", "www.example.com", &["1.2.3.4"], &["300"]));
        ag.add_record(record("10", "www.example.com", &["1.2.3.4"], &["300"]));
        let res = ag.get_result();
        assert_eq!(res.tuples[0].stat.first, "10");
        assert_eq!(res.tuples[0].stat.last, "20");
    }

    #[test]
    fn mismatched_answers_and_ttls_skip() {
        let mut ag = DnsAggregator::new();
        ag.add_record(record("10", "www.example.com", &["1.2.3.4", "1.2.3.5"], &["300"]));
        let res = ag.get_result();
        assert_eq!(res.total_records, 0);
        assert_eq!(res.skipped_records, 1);
    }

    #[test]
    fn get_result_does_not_clear_state() {
        let mut ag = DnsAggregator::new();
        ag.add_record(record("10", "www.example.com", &["1.2.3.4"], &["300"]));
        let _ = ag.get_result();
        let res = ag.get_result();
        assert_eq!(res.total_records, 1);
        assert_eq!(res.tuples.len(), 1);
    }

    #[test]
    fn aggregate_stream_counts_missing_field_skips() {
        use std::io::Cursor;

        let input = "{\"ts\":\"10\",\"query\":\"www.example.com\",\"qtype_name\":\"A\",\
                     \"answers\":[\"1.2.3.4\"],\"TTLs\":[\"300\"]}\n\
                     {\"query\":\"no-ts.example.com\"}\n";
        let mut ag = DnsAggregator::new();
        aggregate_stream(&mut ag, Cursor::new(input.as_bytes().to_vec())).unwrap();
        let res = ag.get_result();
        assert_eq!(res.total_records, 1);
        assert_eq!(res.skipped_records, 1);
    }
}
