//! Performance benchmarks for logship

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use logship::transport::{codec, signer, Connection, Transport, TransportClient};
use logship::types::{LogFields, Message, Secret};
use logship::worker::{BatchingWorker, WorkerOptions};
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn sample_batch(count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| {
            Message::now(LogFields::new())
                .with_field("level", "INFO")
                .with_field("msg", format!("request {} served", i))
                .with_field("latency_ms", (i % 250).to_string())
                .with_field("path", "/api/v1/users")
        })
        .collect()
}

fn test_client() -> TransportClient {
    TransportClient::new(Connection {
        url: "http://test-project.regionid.example.com/logstores/s/shards/lb"
            .parse()
            .unwrap(),
        access_key: "123".to_string(),
        secret: Secret::from("321"),
        topic: "bench".to_string(),
        source: "127.0.0.1".to_string(),
        timeout: Duration::from_secs(1),
    })
}

/// Benchmark the encode -> compress -> sign path
fn bench_request_pipeline(c: &mut Criterion) {
    let client = test_client();
    let mut group = c.benchmark_group("request_pipeline");

    for batch_size in [10, 100, 1000].iter() {
        let batch = sample_batch(*batch_size);
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch, |b, batch| {
            b.iter(|| {
                let raw = client.encode(batch).unwrap();
                let compressed = client.compress(&raw).unwrap();
                client
                    .build_request(raw.len(), compressed, "Mon, 09 Nov 2015 06:03:03 GMT")
                    .unwrap()
            });
        });
    }

    group.finish();
}

/// Benchmark LZ4 compression on encoded batches
fn bench_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression");

    for batch_size in [100, 1000].iter() {
        let raw = codec::encode("bench", "127.0.0.1", &sample_batch(*batch_size)).unwrap();
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &raw, |b, raw| {
            b.iter(|| codec::compress(raw).unwrap());
        });
    }

    group.finish();
}

/// Benchmark request signing
fn bench_signing(c: &mut Criterion) {
    let secret = Secret::from("321");
    let mut headers = HeaderMap::new();
    headers.insert("content-md5", "1DD45FA4A70A9300CC9FE7305AF2C494".parse().unwrap());
    headers.insert("content-type", "application/x-protobuf".parse().unwrap());
    headers.insert("date", "Mon, 09 Nov 2015 06:03:03 GMT".parse().unwrap());
    headers.insert("x-log-apiversion", "0.6.0".parse().unwrap());
    headers.insert("x-log-bodyrawsize", "1234".parse().unwrap());
    headers.insert("x-log-compresstype", "lz4".parse().unwrap());
    headers.insert("x-log-signaturemethod", "hmac-sha1".parse().unwrap());

    c.bench_function("sign", |b| {
        b.iter(|| signer::sign(&secret, &Method::POST, "/logstores/s/shards/lb", &headers).unwrap());
    });
}

struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn send(&self, _batch: &[Message]) -> logship::Result<()> {
        Ok(())
    }
}

/// Benchmark worker admission and drain throughput
fn bench_worker_throughput(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("worker_throughput");
    group.sample_size(10);

    for message_count in [1000, 10000].iter() {
        group.throughput(Throughput::Elements(*message_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(message_count),
            message_count,
            |b, &count| {
                b.to_async(&rt).iter(|| async move {
                    let worker = BatchingWorker::new(Arc::new(NullTransport), WorkerOptions::default());
                    worker.start();
                    for i in 0..count {
                        let msg = Message::now(LogFields::new()).with_field("seq", i.to_string());
                        worker.submit(msg).await.unwrap();
                    }
                    worker.stop().await;
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_request_pipeline,
    bench_compression,
    bench_signing,
    bench_worker_throughput
);
criterion_main!(benches);
