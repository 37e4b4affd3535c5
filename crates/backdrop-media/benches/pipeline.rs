//! Per-frame pipeline benchmarks.
//!
//! # Running Benchmarks
//! ```bash
//! cargo bench --package backdrop-media --bench pipeline
//! ```
//!
//! Measures effect rendering, mask construction and compositing at common
//! resolutions. Detection is replaced by a fixed region so the numbers do
//! not depend on cascade files being installed.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::{Rgb, RgbImage};
use std::sync::Arc;
use std::time::Duration;

use backdrop_media::{
    composite, Detections, EffectRenderer, Frame, FramePipeline, MaskBuilder, MediaResult,
    RegionDetector,
};
use backdrop_models::{Effect, Region};

const RESOLUTIONS: [(u32, u32); 3] = [(1920, 1080), (1280, 720), (640, 360)];

struct CentreBody;

impl RegionDetector for CentreBody {
    fn detect(&self, frame: &Frame) -> MediaResult<Detections> {
        let (w, h) = frame.dimensions();
        Ok(Detections {
            faces: vec![Region::new(w as i32 * 2 / 5, h as i32 / 8, w as i32 / 10, h as i32 / 8)],
            bodies: vec![Region::new(w as i32 / 3, h as i32 / 8, w as i32 / 3, h as i32 * 3 / 4)],
        })
    }
}

/// Synthetic frame with enough variation to defeat trivial fast paths.
fn test_frame(width: u32, height: u32) -> Frame {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 7 + y * 11) % 256) as u8,
            ((x * 13 + y * 17) % 256) as u8,
            ((x * 19 + y * 23) % 256) as u8,
        ])
    })
}

fn bench_effects(c: &mut Criterion) {
    let mut group = c.benchmark_group("effects");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(5));

    let renderer = EffectRenderer::default();
    for (width, height) in RESOLUTIONS {
        let frame = test_frame(width, height);
        group.throughput(Throughput::Elements(1));
        for effect in Effect::ALL {
            group.bench_with_input(
                BenchmarkId::new(effect.as_str(), format!("{}x{}", width, height)),
                &frame,
                |b, frame| b.iter(|| renderer.render(black_box(frame), *effect)),
            );
        }
    }
    group.finish();
}

fn bench_mask_and_composite(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask");
    group.measurement_time(Duration::from_secs(5));

    let builder = MaskBuilder::default();
    for (width, height) in RESOLUTIONS {
        let frame = test_frame(width, height);
        let detections = CentreBody.detect(&frame).unwrap_or_default();
        let label = format!("{}x{}", width, height);

        group.bench_function(BenchmarkId::new("build", &label), |b| {
            b.iter(|| builder.build(&detections.faces, &detections.bodies, width, height))
        });

        let mask = builder
            .build(&detections.faces, &detections.bodies, width, height)
            .expect("mask build");
        let filtered = EffectRenderer::default()
            .render(&frame, Effect::Sepia)
            .expect("sepia render");
        group.bench_function(BenchmarkId::new("composite", &label), |b| {
            b.iter(|| composite(black_box(&frame), black_box(&filtered), black_box(&mask)))
        });
    }
    group.finish();
}

fn bench_full_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.measurement_time(Duration::from_secs(8));

    let pipeline = FramePipeline::new(Arc::new(CentreBody));
    for (width, height) in RESOLUTIONS {
        let frame = test_frame(width, height);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("blur", format!("{}x{}", width, height)),
            &frame,
            |b, frame| b.iter(|| pipeline.process(black_box(frame), Effect::Blur)),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_effects, bench_mask_and_composite, bench_full_frame);
criterion_main!(benches);
