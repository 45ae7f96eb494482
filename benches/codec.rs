//! Codec benchmark suite.
//!
//! Measures frame encoding and decoding for both protocols:
//! - Payload sizes: small chat message, 4 KiB text body
//! - Protocols: proto envelope, json text
//!
//! Run with: cargo bench --bench codec
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::{Value, json};

use im_transport::codec::{self, Frame};
use im_transport::{Payload, Protocol};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const BODY_SIZES: &[usize] = &[16, 4096];
const PROTOCOLS: &[Protocol] = &[Protocol::Proto, Protocol::Json];

fn chat_message(size: usize) -> Value {
    json!({
        "code": 1000,
        "requestId": "req-0001",
        "token": "token-abcdef",
        "metadata": { "conversation": "c-42" },
        "data": { "text": "x".repeat(size), "to": "u-7" }
    })
}

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for &protocol in PROTOCOLS {
        for &size in BODY_SIZES {
            let payload = Payload::Json(chat_message(size));
            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(
                BenchmarkId::new(protocol.as_str(), size),
                &payload,
                |b, payload| b.iter(|| codec::encode(black_box(payload), protocol)),
            );
        }
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for &protocol in PROTOCOLS {
        for &size in BODY_SIZES {
            let Ok(frame) = codec::encode(&Payload::Json(chat_message(size)), protocol) else {
                continue;
            };
            group.throughput(Throughput::Bytes(frame.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(protocol.as_str(), size),
                &frame,
                |b, frame: &Frame| b.iter(|| codec::decode(black_box(frame.clone()))),
            );
        }
    }

    group.finish();
}

// ============================================================================
// Criterion Setup
// ============================================================================

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
