//! Ring Buffer Performance Benchmark
//!
//! Measures the per-tick hot path: ring buffer transfer and volume scaling.
//!
//! **Goal:** A 2048-byte consumer tick should cost well under a microsecond

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cadenza_player::audio::types::scale_pcm_i16;
use cadenza_player::playback::RingBuffer;

fn bench_ring_buffer_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer");

    group.bench_function("write_read_2048", |b| {
        let mut ring = RingBuffer::new(1_000_000);
        let chunk = vec![0x55u8; 2048];
        let mut out = vec![0u8; 2048];

        b.iter(|| {
            ring.write(black_box(&chunk));
            let read = ring.read(black_box(&mut out));
            black_box(read);
        });
    });

    group.bench_function("wrapping_write_read", |b| {
        // Odd capacity forces the two-segment copy path
        let mut ring = RingBuffer::new(3001);
        let chunk = vec![0x55u8; 2048];
        let mut out = vec![0u8; 2048];

        b.iter(|| {
            ring.write(black_box(&chunk));
            let read = ring.read(black_box(&mut out));
            black_box(read);
        });
    });

    group.bench_function("oversized_write", |b| {
        let mut ring = RingBuffer::new(4096);
        let data = vec![0x55u8; 16_384];

        b.iter(|| {
            ring.write(black_box(&data));
            ring.reset();
        });
    });

    group.finish();
}

fn bench_volume_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("volume_scaling");

    group.bench_function("scale_2048_bytes", |b| {
        let mut pcm = vec![0x40u8; 2048];

        b.iter(|| {
            scale_pcm_i16(black_box(&mut pcm), black_box(0.7));
        });
    });

    group.bench_function("unity_gain_2048_bytes", |b| {
        let mut pcm = vec![0x40u8; 2048];

        b.iter(|| {
            scale_pcm_i16(black_box(&mut pcm), black_box(1.0));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_ring_buffer_operations, bench_volume_scaling);
criterion_main!(benches);
