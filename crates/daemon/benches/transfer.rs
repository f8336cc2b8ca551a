//! Performance benchmarks for the hot paths in the daemon:
//! - String and int64 framing
//! - Upload into storage
//! - Download out of storage

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use daemon::{Identity, StorageNamespace, TransferEngine};
use protocol::{FrameCodec, Listing};
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Benchmark string and int64 framing.
fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let codec = FrameCodec::new();

    for len in [8usize, 256, 4096, 65_535] {
        let text = "a".repeat(len);
        let encoded = codec.encode_string(&text).unwrap();
        group.throughput(Throughput::Bytes(encoded.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode_string", len), &text, |b, text| {
            b.iter(|| codec.encode_string(black_box(text)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("decode_string", len), &encoded, |b, bytes| {
            b.iter(|| codec.decode_string(black_box(bytes)).unwrap());
        });
    }

    group.bench_function("encode_i64", |b| {
        b.iter(|| codec.encode_i64(black_box(1_048_576)));
    });

    group.finish();
}

/// Benchmark rendering a listing with many files.
fn bench_listing(c: &mut Criterion) {
    let mut listing = Listing::new();
    listing.push("pdf", (0..100).map(|i| format!("report_{}.pdf", i)).collect());
    listing.push("jpg", (0..500).map(|i| format!("photo_{}.jpg", i)).collect());
    listing.push("txt", Vec::new());

    c.bench_function("listing_render_600", |b| {
        b.iter(|| black_box(&listing).render());
    });
}

/// Benchmark moving payloads through storage.
fn bench_transfer(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(StorageNamespace::new(temp_dir.path()));
    let engine = TransferEngine::new(storage.clone(), u64::MAX);
    let identity = Identity::new("bench");
    rt.block_on(storage.ensure(&identity)).unwrap();

    let mut group = c.benchmark_group("transfer");
    group.sample_size(20);

    for size in [4096usize, 1 << 20, 16 << 20] {
        let data = vec![0x5Au8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("upload", size), &data, |b, data| {
            b.iter(|| {
                rt.block_on(async {
                    let mut source: &[u8] = data;
                    engine
                        .upload(&identity, "txt", "bench.bin", data.len() as u64, &mut source)
                        .await
                        .unwrap()
                })
            });
        });

        group.bench_function(BenchmarkId::new("download", size), |b| {
            b.iter(|| {
                rt.block_on(async {
                    let source = engine
                        .open_download(&identity, "txt", "bench.bin")
                        .await
                        .unwrap();
                    let mut sink = Vec::with_capacity(size);
                    engine.send_download(source, &mut sink).await.unwrap()
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec, bench_listing, bench_transfer);
criterion_main!(benches);
