//! Benchmarks for the stream filter pipeline.
//!
//! - Decoding each filter at 1K, 10K and 100K of plain data
//! - A predictor-carrying Flate stream, as used by xref streams
//! - JBIG2 generic region decoding

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pdf_objstore::decoders::{Filter, FilterChain, Jbig2Params, PredictorParams};
use pdf_objstore::parser_config::ParserOptions;
use std::hint::black_box;

const SIZES: [(&str, usize); 3] = [("1K", 1024), ("10K", 10 * 1024), ("100K", 100 * 1024)];

/// Content-stream-like text that compresses well.
fn generate_text(size: usize) -> Vec<u8> {
    b"BT /F1 12 Tf 72 712 Td (The quick brown fox) Tj ET\n"
        .iter()
        .cycle()
        .take(size)
        .copied()
        .collect()
}

/// Pseudo-random bytes that do not compress.
fn generate_random_bytes(size: usize) -> Vec<u8> {
    let mut seed: u64 = 42;
    (0..size)
        .map(|_| {
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
            (seed >> 16) as u8
        })
        .collect()
}

fn bench_filter(c: &mut Criterion, group_name: &str, filter: Filter) {
    let mut group = c.benchmark_group(group_name);
    for (name, size) in SIZES {
        for (kind, plain) in [("text", generate_text(size)), ("random", generate_random_bytes(size))] {
            let encoded = filter.encode(&plain).unwrap();
            group.bench_with_input(BenchmarkId::new(kind, name), &encoded, |b, encoded| {
                b.iter(|| filter.decode(black_box(encoded), usize::MAX))
            });
        }
    }
    group.finish();
}

fn bench_flate(c: &mut Criterion) {
    bench_filter(c, "filters_flate", Filter::FlateDecode(PredictorParams::default()));
}

fn bench_lzw(c: &mut Criterion) {
    bench_filter(
        c,
        "filters_lzw",
        Filter::LzwDecode {
            early_change: true,
            predictor: PredictorParams::default(),
        },
    );
}

fn bench_ascii(c: &mut Criterion) {
    bench_filter(c, "filters_ascii85", Filter::Ascii85Decode);
    bench_filter(c, "filters_asciihex", Filter::AsciiHexDecode);
}

fn bench_runlength(c: &mut Criterion) {
    bench_filter(c, "filters_runlength", Filter::RunLengthDecode);
}

fn bench_xref_stream_predictor(c: &mut Criterion) {
    // 20,000 records of /W [1 4 2] with PNG Up prediction
    let records: Vec<u8> = (0..20_000u32)
        .flat_map(|i| {
            let mut record = vec![1u8];
            record.extend_from_slice(&(i * 97).to_be_bytes());
            record.extend_from_slice(&[0, 0]);
            record
        })
        .collect();
    let chain = FilterChain::new(vec![Filter::FlateDecode(PredictorParams {
        predictor: 12,
        columns: 7,
        ..Default::default()
    })]);
    let encoded = chain.encode(&records).unwrap();
    let options = ParserOptions::default();

    c.bench_function("filters_xref_stream_20k_records", |b| {
        b.iter(|| chain.decode(black_box(&encoded), &options).unwrap())
    });
}

fn bench_jbig2(c: &mut Criterion) {
    let mut group = c.benchmark_group("filters_jbig2");
    for (name, width, height) in [("64x64", 64u32, 64u32), ("512x512", 512, 512)] {
        let stride = (width as usize).div_ceil(8);
        // Diagonal stripes
        let samples: Vec<u8> = (0..stride * height as usize)
            .map(|i| if (i / stride + i % stride) % 3 == 0 { 0x0F } else { 0xFF })
            .collect();
        let filter = Filter::Jbig2Decode(Jbig2Params {
            globals: None,
            width,
            height,
        });
        let encoded = filter.encode(&samples).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &encoded, |b, encoded| {
            b.iter(|| filter.decode(black_box(encoded), usize::MAX))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_flate,
    bench_lzw,
    bench_ascii,
    bench_runlength,
    bench_xref_stream_predictor,
    bench_jbig2
);
criterion_main!(benches);
