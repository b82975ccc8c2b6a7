//! Benchmarks for heatmap generation.
//!
//! Run with: cargo bench --bench gradcam_bench

use std::sync::Arc;

use burn::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::RgbImage;
use ndarray::Array2;

use medcam::all::*;
use medcam::core::backend::CpuAutodiff;

type BenchBackend = CpuAutodiff;

fn bench_gradcam(c: &mut Criterion) {
    let mut group = c.benchmark_group("gradcam");
    group.sample_size(20);

    for size in [32usize, 64, 128] {
        let model = CamNetConfig::new(["normal", "abnormal"])
            .with_input_size(size, size)
            .init_model::<BenchBackend>(Seed::new(42), &Default::default())
            .unwrap();
        let cam = GradCam::new(Arc::new(SharedModel::new(model)), None).unwrap();
        let input = Tensor::<BenchBackend, 4>::ones([1, 3, size, size], &Default::default());

        group.bench_with_input(BenchmarkId::new("compute", size), &size, |b, _| {
            b.iter(|| {
                cam.compute(black_box(input.clone()), &ClassTarget::TopScore)
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");

    for size in [224u32, 512, 1024] {
        let map = ImportanceMap::from_array(Array2::from_shape_fn((56, 56), |(y, x)| {
            ((x + y) as f32 / 110.0).min(1.0)
        }));
        let original = RgbImage::from_pixel(size, size, image::Rgb([90, 90, 90]));
        let renderer = Renderer::default();

        group.bench_with_input(BenchmarkId::new("overlay", size), &size, |b, _| {
            b.iter(|| renderer.render(black_box(&map), black_box(&original)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_gradcam, bench_render);
criterion_main!(benches);
