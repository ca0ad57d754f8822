use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use ocsvm_rs::config::KernelKind;
use ocsvm_rs::model::kernel::Kernel;
use ocsvm_rs::model::solver::{solve_one_class, solve_svc, SolverParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_matrix(n: usize, d: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((n, d), |_| rng.gen_range(0.0..1.0))
}

fn benchmark_kernels(c: &mut Criterion) {
    let x = random_matrix(2, 784, 1);
    let rbf = Kernel::from_kind(KernelKind::Rbf, Some(0.01), 3).unwrap();
    let wd = Kernel::from_kind(KernelKind::WeightedDegreeKernel, None, 3).unwrap();

    c.bench_function("rbf_kernel_784", |b| {
        b.iter(|| rbf.compute(black_box(x.row(0)), black_box(x.row(1))))
    });
    c.bench_function("weighted_degree_kernel_784", |b| {
        b.iter(|| wd.compute(black_box(x.row(0)), black_box(x.row(1))))
    });
}

fn benchmark_one_class_solver(c: &mut Criterion) {
    let x = random_matrix(300, 32, 2);
    let kernel = Kernel::from_kind(KernelKind::Rbf, Some(0.1), 3).unwrap();
    let params = SolverParams::default();

    c.bench_function("one_class_libsvm_300x32", |b| {
        b.iter(|| solve_one_class(x.view(), &kernel, black_box(0.1), &params).unwrap())
    });
}

fn benchmark_svc_solver(c: &mut Criterion) {
    let x = random_matrix(300, 32, 3);
    let y: Vec<f64> = x
        .rows()
        .into_iter()
        .map(|row| if row.sum() > 16.0 { 1.0 } else { -1.0 })
        .collect();
    let kernel = Kernel::from_kind(KernelKind::Linear, None, 3).unwrap();
    let params = SolverParams::default();

    c.bench_function("svc_libsvm_300x32", |b| {
        b.iter(|| solve_svc(x.view(), &y, &kernel, black_box(1.0), &params).unwrap())
    });
}

fn benchmark_precomputed_solver(c: &mut Criterion) {
    let x = random_matrix(120, 32, 4);
    let kernel = Kernel::from_kind(KernelKind::WeightedDegreeKernel, None, 3).unwrap();
    let params = SolverParams::default();

    c.bench_function("one_class_wd_precomputed_120x32", |b| {
        b.iter(|| solve_one_class(x.view(), &kernel, black_box(0.1), &params).unwrap())
    });
}

criterion_group!(
    benches,
    benchmark_kernels,
    benchmark_one_class_solver,
    benchmark_svc_solver,
    benchmark_precomputed_solver
);
criterion_main!(benches);
