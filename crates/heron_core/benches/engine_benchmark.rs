//! Equalizer engine benchmarks
//!
//! Measures the render path and the publish/snapshot hand-off.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use heron_core::{epoch_store, CoefficientSet, EngineConfig, EqEngine, PeakParams, Stage};

fn peaks(shift: f64) -> Vec<PeakParams> {
    (0..9)
        .map(|i| PeakParams::new(60.0 * 2.0_f64.powi(i) + shift, 1.0, 0.0, 3.0, 1.5))
        .collect()
}

fn benchmark_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_render");

    // Typical buffer sizes used in real-time audio
    for buffer_size in [64, 128, 256, 512, 1024] {
        let mut engine = EqEngine::with_config(EngineConfig::stereo()).unwrap();
        engine
            .request_shelf_update([2.0, 0.0, -2.0], [100.0, 8000.0])
            .unwrap();
        engine.request_peak_update(peaks(0.0)).unwrap();

        let mut left: Vec<f64> = (0..buffer_size).map(|i| (i as f64 * 0.001).sin()).collect();
        let mut right = left.clone();

        group.throughput(Throughput::Elements(buffer_size as u64 * 2));
        group.bench_function(format!("steady_{}_frames", buffer_size), |b| {
            b.iter(|| {
                engine
                    .render(&mut [black_box(&mut left[..]), black_box(&mut right[..])])
                    .unwrap();
            })
        });

        let mut flip = false;
        group.bench_function(format!("update_every_block_{}_frames", buffer_size), |b| {
            b.iter(|| {
                flip = !flip;
                engine
                    .request_peak_update(peaks(if flip { 10.0 } else { 0.0 }))
                    .unwrap();
                // Keep the event queue from growing
                black_box(engine.poll_event());
                engine
                    .render(&mut [black_box(&mut left[..]), black_box(&mut right[..])])
                    .unwrap();
            })
        });
    }

    group.finish();
}

fn benchmark_handoff(c: &mut Criterion) {
    let (mut writer, mut reader) = epoch_store(&CoefficientSet::with_capacity(10));
    let stages = [Stage::IDENTITY; 10];

    c.bench_function("publish_and_snapshot", |b| {
        b.iter(|| {
            writer.staging_mut().set_stages(black_box(&stages)).unwrap();
            writer.publish().unwrap();
            black_box(reader.snapshot_for_render().1);
        })
    });

    c.bench_function("snapshot_unchanged", |b| {
        b.iter(|| black_box(reader.snapshot_for_render().1))
    });
}

criterion_group!(benches, benchmark_render, benchmark_handoff);
criterion_main!(benches);
