//! Benchmarks for scratch page encoding.
//!
//! Run with: cargo bench -p gatesync

#![allow(clippy::pedantic)]

use bson::oid::ObjectId;
use bson::{doc, DateTime, Document};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gatesync::scratch::{decode_page, encode_page, PageKey};

/// Documents shaped like a typical application record.
fn sample_page(size: usize) -> Vec<Document> {
    (0..size)
        .map(|i| {
            let n = i as i64;
            let balance = n as f64 * 1.25;
            let active = i % 2 == 0;
            doc! {
                "_id": ObjectId::new(),
                "email": format!("user{i}@example.com"),
                "balance": balance,
                "visits": n,
                "active": active,
                "createdAt": DateTime::from_millis(1_700_000_000_000 + n),
                "profile": { "region": "East", "tags": ["a", "b", "c"] },
            }
        })
        .collect()
}

fn bench_encode_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_page");
    for size in [100, 1000, 5000] {
        let page = sample_page(size);
        group.bench_with_input(BenchmarkId::new("documents", size), &page, |b, page| {
            b.iter(|| black_box(encode_page(page.clone()).unwrap()))
        });
    }
    group.finish();
}

fn bench_decode_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_page");
    for size in [100, 1000, 5000] {
        let bytes = encode_page(sample_page(size)).unwrap();
        group.bench_with_input(BenchmarkId::new("documents", size), &bytes, |b, bytes| {
            b.iter(|| black_box(decode_page(bytes).unwrap()))
        });
    }
    group.finish();
}

fn bench_page_file_names(c: &mut Criterion) {
    let plain = PageKey::new("accounts", 42);
    let escaped = PageKey::new("Orders.Archive 2024/Q1", 42);

    c.bench_function("page_key_file_name_plain", |b| {
        b.iter(|| black_box(plain.file_name()))
    });
    c.bench_function("page_key_file_name_escaped", |b| {
        b.iter(|| black_box(escaped.file_name()))
    });

    let long = PageKey::new("客".repeat(40), 42);
    c.bench_function("page_key_file_name_digest", |b| {
        b.iter(|| black_box(long.file_name()))
    });

    let name = escaped.file_name();
    c.bench_function("page_key_from_file_name", |b| {
        b.iter(|| black_box(PageKey::from_file_name(&name)))
    });
}

criterion_group!(
    benches,
    bench_encode_page,
    bench_decode_page,
    bench_page_file_names
);
criterion_main!(benches);
