// benches/benchmarks.rs — Performance benchmarks (criterion)
//
// Hot paths outside the network call:
//   1. Sampling throughput over an in-memory source
//   2. Frame encoding (resize + JPEG + base64) per sampled frame
//   3. Timeline rendering for long sessions

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use actionlens::core::aggregator::render_timeline;
use actionlens::core::frame::to_inline_image;
use actionlens::core::sampler::{Sampler, SamplingPlan};
use actionlens::core::types::FrameObservation;
use actionlens::source::MemorySource;

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Observations for an N-sample session, every seventh one failed.
fn build_observations(n: usize) -> Vec<FrameObservation> {
    (0..n)
        .map(|i| {
            let frame = i as u64 * 30;
            let ts = i as f64;
            if i % 7 == 3 {
                FrameObservation::failed(i, frame, ts, "HTTP 500: upstream error")
            } else {
                FrameObservation::succeeded(
                    i,
                    frame,
                    ts,
                    format!(
                        "1. A person walks across the room carrying box #{i}.\n\
                         2. One adult, casual clothing.\n\
                         3. Arms extended, steady pace.\n\
                         4. Indoor office with desks and windows."
                    ),
                )
            }
        })
        .collect()
}

// ─── Benchmark: Sampling ────────────────────────────────────────────────────

fn bench_sampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("sampling");

    group.bench_function("sample_3000_frames_every_30", |b| {
        b.iter(|| {
            let source = MemorySource::new(3000, 30.0, 64, 36);
            let sampler = Sampler::new(source, SamplingPlan::every(30)).expect("sampler");
            let count = sampler.filter_map(Result::ok).count();
            black_box(count)
        })
    });

    group.bench_function("sample_3000_frames_every_1", |b| {
        b.iter(|| {
            let source = MemorySource::new(3000, 30.0, 64, 36);
            let sampler = Sampler::new(source, SamplingPlan::every(1)).expect("sampler");
            black_box(sampler.filter_map(Result::ok).count())
        })
    });

    group.finish();
}

// ─── Benchmark: Frame encoding ──────────────────────────────────────────────

fn bench_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoding");

    let small: Vec<u8> = (0..640 * 480 * 3).map(|i| (i % 251) as u8).collect();
    group.bench_function("encode_640x480_q80", |b| {
        b.iter(|| to_inline_image(black_box(small.clone()), 640, 480, 1024, 80).expect("encode"))
    });

    // Downscaled to the 1024px bound before encoding
    let large: Vec<u8> = (0..1920 * 1080 * 3).map(|i| (i % 251) as u8).collect();
    group.bench_function("encode_1920x1080_resize_q80", |b| {
        b.iter(|| to_inline_image(black_box(large.clone()), 1920, 1080, 1024, 80).expect("encode"))
    });

    group.finish();
}

// ─── Benchmark: Timeline rendering ──────────────────────────────────────────

fn bench_timeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("timeline");

    let short = build_observations(10);
    group.bench_function("render_10_frames", |b| {
        b.iter(|| render_timeline(black_box(&short)))
    });

    let long = build_observations(1000);
    group.bench_function("render_1000_frames", |b| {
        b.iter(|| render_timeline(black_box(&long)))
    });

    group.finish();
}

criterion_group!(benches, bench_sampling, bench_encoding, bench_timeline);
criterion_main!(benches);
