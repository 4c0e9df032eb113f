//! Performance benchmarks for dolma-runner
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dolma_runner::fs::{Codec, Decompressor};
use dolma_runner::pipeline::{extract_record, is_blog_url, parse_jsonl_into};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use tempfile::TempDir;

const URLS: &[&str] = &[
    "https://someone.wordpress.com/2020/01/hello-world/",
    "https://blog.example.com/posts/rust-on-hpc",
    "https://www.example.org/blog/category/news/",
    "https://news.example.net/2021/03/04/story.html",
    "https://example.com/en/blogs/release-notes?ref=home",
    "not a url at all",
];

/// Build `count` JSONL documents, roughly half of them blog posts
fn make_jsonl(count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..count {
        let url = URLS[i % URLS.len()];
        let doc = serde_json::json!({
            "id": format!("doc-{}", i),
            "text": "Lorem ipsum dolor sit amet, consectetur adipiscing elit.\n".repeat(8),
            "source": "common-crawl",
            "created": "2021-03-04",
            "metadata": {"url": url},
        });
        out.extend(serde_json::to_vec(&doc).unwrap());
        out.push(b'\n');
    }
    out
}

fn bench_is_blog_url(c: &mut Criterion) {
    c.bench_function("is_blog_url_mixed", |b| {
        b.iter(|| {
            for url in URLS {
                black_box(is_blog_url(black_box(url)));
            }
        });
    });
}

fn bench_extract_record(c: &mut Criterion) {
    let doc = serde_json::json!({
        "id": "doc-1",
        "text": "A reasonably long blog post body.\n".repeat(20),
        "metadata": {"url": "https://blog.example.com/p/1"},
    });

    c.bench_function("extract_record", |b| {
        b.iter(|| black_box(extract_record(black_box(&doc), 200)));
    });
}

fn bench_gzip_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("gzip_decompress");

    for docs in [1_000usize, 10_000] {
        let dir = TempDir::new().unwrap();
        let raw = make_jsonl(docs);
        let src = dir.path().join("shard.json.gz");

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&raw).unwrap();
        std::fs::write(&src, enc.finish().unwrap()).unwrap();

        let dest = dir.path().join("shard.json.jsonl");
        let decompressor = Decompressor::new();

        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("docs", humansize::format_size(raw.len() as u64, humansize::BINARY)),
            &docs,
            |b, _| {
                b.iter(|| {
                    let _ = black_box(decompressor.decompress_file(Codec::Gzip, &src, &dest));
                    let _ = std::fs::remove_file(&dest);
                });
            },
        );
    }

    group.finish();
}

fn bench_parse_jsonl(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let raw = make_jsonl(10_000);
    let input = dir.path().join("shard.json.jsonl");
    std::fs::write(&input, &raw).unwrap();

    let mut group = c.benchmark_group("parse_jsonl");
    group.throughput(Throughput::Bytes(raw.len() as u64));
    group.bench_function("10k_docs_to_csv", |b| {
        b.iter(|| {
            let mut writer = csv::Writer::from_writer(std::io::sink());
            black_box(parse_jsonl_into(&input, &mut writer, 200).unwrap())
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_is_blog_url,
    bench_extract_record,
    bench_gzip_decompress,
    bench_parse_jsonl,
);

criterion_main!(benches);
