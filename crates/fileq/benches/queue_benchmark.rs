// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Benchmarks for the persistent queue.
//!
//! Measures:
//! - Single record append latency at different payload sizes
//! - Add-then-poll round-trip throughput
//! - Drain throughput across segment rotations

use std::hint::black_box;

use bytes::Bytes;
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use fileq::{BytesCodec, FileQueue, QueueBuilder};
use tempfile::TempDir;

/// Payload sizes to benchmark (bytes)
const PAYLOAD_SIZES: &[usize] = &[64, 256, 1024, 4096];

/// Number of records for drain/throughput tests
const DRAIN_SIZE: usize = 10_000;

/// Create a byte queue in a temporary directory
fn create_queue(temp_dir: &TempDir, average_record_len: usize) -> FileQueue<BytesCodec> {
    QueueBuilder::new(temp_dir.path())
        .average_record_len(average_record_len)
        .max_segment_size(256 * 1024 * 1024)
        .build(BytesCodec)
        .expect("Failed to create queue")
}

/// Generate a payload of the given size
fn generate_payload(size: usize) -> Bytes { Bytes::from(vec![0xABu8; size]) }

fn bench_add_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_latency");

    for &size in PAYLOAD_SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let queue = create_queue(&temp_dir, size);
            let payload = generate_payload(size);

            b.iter(|| {
                queue.add(black_box(&payload)).unwrap();
            });

            queue.close().unwrap();
        });
    }

    group.finish();
}

fn bench_add_poll_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_poll_roundtrip");

    for &size in PAYLOAD_SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let queue = create_queue(&temp_dir, size);
            let payload = generate_payload(size);

            b.iter(|| {
                queue.add(black_box(&payload)).unwrap();
                black_box(queue.poll().unwrap());
            });

            queue.close().unwrap();
        });
    }

    group.finish();
}

fn bench_drain_across_segments(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain_across_segments");
    group.sample_size(10);
    group.throughput(Throughput::Elements(DRAIN_SIZE as u64));

    group.bench_function("drain_10k", |b| {
        b.iter_batched(
            || {
                let temp_dir = TempDir::new().unwrap();
                let queue = QueueBuilder::new(temp_dir.path())
                    .average_record_len(256)
                    .max_segment_size(1024 * 1024)
                    .build(BytesCodec)
                    .unwrap();
                let payload = generate_payload(256);
                for _ in 0..DRAIN_SIZE {
                    queue.add(&payload).unwrap();
                }
                (temp_dir, queue)
            },
            |(_temp_dir, queue)| {
                while let Some(payload) = queue.poll().unwrap() {
                    black_box(payload);
                }
                queue.close().unwrap();
            },
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_add_latency,
    bench_add_poll_roundtrip,
    bench_drain_across_segments
);
criterion_main!(benches);
