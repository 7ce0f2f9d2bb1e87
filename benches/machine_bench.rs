//! Benchmarks for the per-frame rep counting step.
//!
//! Measures `RepStateMachine::advance` on built-in profiles with realistic
//! angle sequences, plus the overlay render and frame resize that run on
//! every streamed frame.
//!
//! Run with: `cargo bench --bench machine_bench`

use std::sync::Arc;
use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use repcast::exercise::{AngleSample, ProfileCatalog, RepStateMachine};
use repcast::{Frame, OverlayState, PanelRenderer, Renderer};

// ---------------------------------------------------------------------------
// Angle datasets
// ---------------------------------------------------------------------------

/// One full curl: extended, curl up past depth, extend again.
fn curl_cycle() -> Vec<AngleSample> {
    (0..60)
        .map(|i| {
            let t = f64::from(i) / 60.0 * std::f64::consts::TAU;
            let elbow = 95.0 + 60.0 * t.cos();
            AngleSample::new()
                .with("right_elbow", elbow)
                .with("right_shoulder", 60.0)
        })
        .collect()
}

/// One squat with both knees and hips tracked.
fn squat_cycle() -> Vec<AngleSample> {
    (0..60)
        .map(|i| {
            let t = f64::from(i) / 60.0 * std::f64::consts::TAU;
            let knee = 135.0 + 40.0 * t.cos();
            let hip = 120.0 + 50.0 * t.cos();
            AngleSample::new()
                .with("right_knee", knee)
                .with("left_knee", knee - 5.0)
                .with("right_hip", hip)
                .with("left_hip", hip)
                .with("right_ankle", 95.0)
                .with("left_ankle", 95.0)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_advance(c: &mut Criterion) {
    let catalog = ProfileCatalog::builtin().expect("built-in profiles");
    let mut group = c.benchmark_group("advance");

    for (name, cycle) in [("curl", curl_cycle()), ("squat", squat_cycle())] {
        let profile = Arc::new(catalog.get(name).expect("profile").clone());
        group.bench_function(name, |b| {
            let mut machine = RepStateMachine::new(Arc::clone(&profile));
            let now = Instant::now();
            let mut frames = cycle.iter().cycle();
            b.iter(|| {
                let sample = frames.next().expect("cycle is infinite");
                black_box(machine.advance(black_box(sample), now))
            });
        });
    }

    group.bench_function("frozen_frame", |b| {
        let profile = Arc::new(catalog.get("pushup").expect("profile").clone());
        let mut machine = RepStateMachine::new(profile);
        let empty = AngleSample::new();
        let now = Instant::now();
        b.iter(|| black_box(machine.advance(black_box(&empty), now)));
    });

    group.finish();
}

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame");
    let overlay = OverlayState {
        reps: 12,
        progress: 64.0,
        ..OverlayState::default()
    };
    let renderer = PanelRenderer::default();

    group.bench_function("render_720p", |b| {
        let mut frame = Frame::blank(1280, 720);
        b.iter(|| renderer.render(black_box(&mut frame), black_box(&overlay)));
    });

    group.bench_function("resize_480p_to_720p", |b| {
        let frame = Frame::blank(640, 480);
        b.iter(|| black_box(frame.resized(1280, 720)));
    });

    group.finish();
}

criterion_group!(benches, bench_advance, bench_frame);
criterion_main!(benches);
