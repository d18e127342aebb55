//! Throughput benchmarks for the reader and the aggregator.

use std::io::Cursor;

use criterion::{criterion_group, criterion_main, Criterion};

use pdns_core::types::DnsRecord;
use pdns_ingest::{aggregate_stream, DnsAggregator};

fn synthetic_json_log(records: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(records * 128);
    for i in 0..records {
        out.extend_from_slice(
            format!(
                "{{\"ts\":{},\"query\":\"host{}.example.com\",\"qtype_name\":\"A\",\
                 \"answers\":[\"10.0.{}.{}\"],\"TTLs\":[300]}}\n",
                1_459_468_983 + i,
                i % 1000,
                (i / 250) % 256,
                i % 250
            )
            .as_bytes(),
        );
    }
    out
}

fn synthetic_tsv_log(records: usize) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(
        b"#separator \\x09\n#fields\tts\tquery\tqtype_name\tanswers\tTTLs\n\
          #types\ttime\tstring\tstring\tvector[string]\tvector[interval]\n",
    );
    for i in 0..records {
        out.extend_from_slice(
            format!(
                "{}\thost{}.example.com\tA\t10.0.0.{}\t300.0\n",
                1_459_468_983 + i,
                i % 1000,
                i % 250
            )
            .as_bytes(),
        );
    }
    out
}

fn bench_aggregate(c: &mut Criterion) {
    let json_log = synthetic_json_log(5_000);
    c.bench_function("aggregate_json_5k", |b| {
        b.iter(|| {
            let mut agg = DnsAggregator::new();
            aggregate_stream(&mut agg, Cursor::new(json_log.clone())).unwrap();
            agg.get_result().total_records
        })
    });

    let tsv_log = synthetic_tsv_log(5_000);
    c.bench_function("aggregate_tsv_5k", |b| {
        b.iter(|| {
            let mut agg = DnsAggregator::new();
            aggregate_stream(&mut agg, Cursor::new(tsv_log.clone())).unwrap();
            agg.get_result().total_records
        })
    });

    c.bench_function("add_record_hot_key", |b| {
        let mut agg = DnsAggregator::new();
        b.iter(|| {
            agg.add_record(DnsRecord {
                ts: "1459468983".into(),
                query: "www.example.com".into(),
                qtype: "A".into(),
                answers: vec!["1.2.3.4".into()],
                ttls: vec!["300".into()],
            })
        })
    });
}

criterion_group!(benches, bench_aggregate);
criterion_main!(benches);
