//! Benchmarks for CGP circuit evaluation.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

use coco::compute::{
    cgp::{CgpGenome, CgpLayout, CgpShape, PixelFilter, Symbolic, Workspace},
    fitness::{Cases, EvalMode, FilterDataset, SymbolicDataset, evaluate_cases},
};

fn bench_symbolic(c: &mut Criterion) {
    let mut group = c.benchmark_group("symbolic_eval");

    for cases in [64, 256, 1024] {
        let dataset = SymbolicDataset::from_fn(2, cases, 0.01, |x| x[0] * x[0] + x[1].sin());
        let layout = CgpLayout::<Symbolic>::new(CgpShape::new(2, 1, 20, 4, 20), None).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut genome = CgpGenome::new(layout.shape());
        genome.randomize(&layout, &mut rng);
        let mut workspace = Workspace::new(layout.shape());

        for mode in [EvalMode::Scalar, EvalMode::Batched] {
            group.bench_with_input(
                BenchmarkId::new(format!("{mode:?}"), cases),
                &cases,
                |b, _| {
                    b.iter(|| {
                        evaluate_cases(
                            black_box(&mut genome),
                            &dataset,
                            Cases::All,
                            mode,
                            &mut workspace,
                        )
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_eval");

    for size in [32, 64, 128] {
        let original: Vec<u8> = (0..size * size).map(|i| (i * 7 % 256) as u8).collect();
        let noisy: Vec<u8> = original
            .iter()
            .enumerate()
            .map(|(i, &p)| if i % 11 == 0 { 255 } else { p })
            .collect();
        let dataset = FilterDataset::from_images(size, size, &original, &noisy).unwrap();
        let layout = CgpLayout::<PixelFilter>::new(CgpShape::new(9, 1, 8, 4, 8), None).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut genome = CgpGenome::new(layout.shape());
        genome.randomize(&layout, &mut rng);
        let mut workspace = Workspace::new(layout.shape());

        for mode in [EvalMode::Scalar, EvalMode::Batched] {
            group.bench_with_input(
                BenchmarkId::new(format!("{mode:?}"), format!("{size}x{size}")),
                &size,
                |b, _| {
                    b.iter(|| {
                        evaluate_cases(
                            black_box(&mut genome),
                            &dataset,
                            Cases::All,
                            mode,
                            &mut workspace,
                        )
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_predicted_subset(c: &mut Criterion) {
    let mut group = c.benchmark_group("predicted_subset");

    let dataset = SymbolicDataset::from_fn(1, 1024, 0.01, |x| x[0].powi(3) - x[0]);
    let layout = CgpLayout::<Symbolic>::new(CgpShape::new(1, 1, 20, 4, 20), None).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let mut genome = CgpGenome::new(layout.shape());
    genome.randomize(&layout, &mut rng);
    let mut workspace = Workspace::new(layout.shape());

    for fraction in [0.05, 0.25, 1.0] {
        let count = (1024.0 * fraction) as u32;
        let subset: Vec<u32> = (0..count).map(|i| (i * 37) % 1024).collect();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{count}_cases")),
            &count,
            |b, _| {
                b.iter(|| {
                    evaluate_cases(
                        black_box(&mut genome),
                        &dataset,
                        Cases::Subset(&subset),
                        EvalMode::Batched,
                        &mut workspace,
                    )
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_symbolic, bench_filter, bench_predicted_subset);
criterion_main!(benches);
