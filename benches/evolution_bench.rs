use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use particle_evolution::*;
use std::hint::black_box;

const DT: f32 = 1.0 / 60.0;

fn prepare_evolution(sphere_count: usize, parallel: bool) -> Evolution {
    let mut settings = EvolutionSettings::default();
    settings.solver.parallel = parallel;
    let mut evolution = Evolution::new(settings).expect("default settings are valid");
    evolution.add_particle(Particle::fixed(Vec3::ZERO).with_shape(Shape::plane(Vec3::Y)));

    let side = (sphere_count as f32).sqrt().ceil() as usize;
    for i in 0..sphere_count {
        let position = Vec3::new((i % side) as f32 * 1.1, 0.5 + (i % 3) as f32 * 0.9, (i / side) as f32 * 1.1);
        evolution.add_particle(
            Particle::dynamic(position, MassProperties::solid_sphere(0.5, 1.0)).with_shape(Shape::sphere(0.5)),
        );
    }
    // Settle into resting contact so every tick solves a full set of constraints.
    for _ in 0..30 {
        evolution.advance(DT, 1, 0.0);
    }
    evolution
}

fn bench_evolution_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("evolution_advance");
    for &count in &[64usize, 256, 1024] {
        group.bench_with_input(BenchmarkId::new("serial", count), &count, |b, &count| {
            let mut evolution = prepare_evolution(count, false);
            b.iter(|| evolution.advance(black_box(DT), 1, 0.0))
        });
        group.bench_with_input(BenchmarkId::new("parallel", count), &count, |b, &count| {
            let mut evolution = prepare_evolution(count, true);
            b.iter(|| evolution.advance(black_box(DT), 1, 0.0))
        });
    }
    group.finish();
}

fn bench_gather_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("gather");
    for (label, use_vector_gather) in [("scalar", false), ("vector", true)] {
        group.bench_function(label, |b| {
            let mut evolution = prepare_evolution(256, false);
            let mut settings = *evolution.settings();
            settings.solver.use_vector_gather = use_vector_gather;
            evolution.set_settings(settings).expect("valid settings");
            b.iter(|| evolution.advance(black_box(DT), 1, 0.0))
        });
    }
    group.finish();
}

fn bench_substeps(c: &mut Criterion) {
    let mut group = c.benchmark_group("substeps");
    for &steps in &[1u32, 2, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, &steps| {
            let mut evolution = prepare_evolution(256, false);
            b.iter(|| evolution.advance(black_box(DT), steps, 0.0))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_evolution_advance, bench_gather_kernels, bench_substeps);
criterion_main!(benches);
