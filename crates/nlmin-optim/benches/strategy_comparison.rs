//! Benchmarks comparing the solver families
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nlmin_core::{
    config::{SolverKind, SolverParams},
    problem::{Hessian, Problem},
    types::{Matrix, Vector},
};
use nlmin_optim::Solver;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Strictly convex quadratic ½(x - x*)ᵀA(x - x*)
#[derive(Debug, Clone)]
struct QuadraticCost {
    a: Matrix,
    target: Vector,
}

impl QuadraticCost {
    fn random(dim: usize, rng: &mut StdRng) -> Self {
        let m = Matrix::from_fn(dim, dim, |_, _| rng.gen_range(-1.0..1.0));
        Self {
            a: m.transpose() * &m + Matrix::identity(dim, dim),
            target: Vector::from_fn(dim, |_, _| rng.gen_range(-1.0..1.0)),
        }
    }
}

impl Problem for QuadraticCost {
    fn value(&self, x: &Vector) -> f64 {
        let d = x - &self.target;
        0.5 * d.dot(&(&self.a * &d))
    }

    fn gradient(&self, x: &Vector, grad: &mut Vector) {
        grad.copy_from(&(&self.a * (x - &self.target)));
    }

    fn hessian(&self, _x: &Vector) -> Option<Hessian> {
        Some(Hessian::Dense(self.a.clone()))
    }
}

/// Extended Rosenbrock function
#[derive(Debug, Clone, Copy)]
struct Rosenbrock;

impl Problem for Rosenbrock {
    fn value(&self, x: &Vector) -> f64 {
        (0..x.len() - 1)
            .map(|i| (1.0 - x[i]).powi(2) + 100.0 * (x[i + 1] - x[i] * x[i]).powi(2))
            .sum()
    }

    fn gradient(&self, x: &Vector, grad: &mut Vector) {
        grad.fill(0.0);
        for i in 0..x.len() - 1 {
            let r = x[i + 1] - x[i] * x[i];
            grad[i] += -2.0 * (1.0 - x[i]) - 400.0 * x[i] * r;
            grad[i + 1] += 200.0 * r;
        }
    }

    fn hessian(&self, x: &Vector) -> Option<Hessian> {
        let n = x.len();
        let mut h = Matrix::zeros(n, n);
        for i in 0..n - 1 {
            h[(i, i)] += 2.0 - 400.0 * (x[i + 1] - x[i] * x[i]) + 800.0 * x[i] * x[i];
            h[(i, i + 1)] -= 400.0 * x[i];
            h[(i + 1, i)] -= 400.0 * x[i];
            h[(i + 1, i + 1)] += 200.0;
        }
        Some(Hessian::Sparse(nlmin_core::sparse::CsrMatrix::from_dense(&h, 0.0)))
    }
}

const FAMILIES: [SolverKind; 4] = [
    SolverKind::SparseNewton,
    SolverKind::DenseNewton,
    SolverKind::Bfgs,
    SolverKind::Lbfgs,
];

fn benchmark_quadratic(c: &mut Criterion) {
    let mut group = c.benchmark_group("quadratic");
    let mut rng = StdRng::seed_from_u64(42);

    for &dim in &[10, 50, 100] {
        let cost_fn = QuadraticCost::random(dim, &mut rng);
        let x0 = Vector::zeros(dim);

        for kind in FAMILIES {
            let params = SolverParams::new(kind).with_grad_norm(1e-6);
            group.bench_with_input(BenchmarkId::new(kind.as_str(), dim), &dim, |b, _| {
                b.iter(|| {
                    let mut solver = Solver::create(&params, 1.0).unwrap();
                    let mut problem = cost_fn.clone();
                    let mut x = x0.clone();
                    solver.minimize(black_box(&mut problem), black_box(&mut x))
                });
            });
        }
    }

    group.finish();
}

fn benchmark_rosenbrock(c: &mut Criterion) {
    let mut group = c.benchmark_group("rosenbrock");
    group.sample_size(20);

    for &dim in &[2, 10] {
        let x0 = Vector::from_fn(dim, |i, _| if i % 2 == 0 { -1.2 } else { 1.0 });

        for kind in FAMILIES {
            let params = SolverParams::new(kind)
                .with_grad_norm(1e-6)
                .with_max_iterations(10_000)
                .with_allow_out_of_iterations(true);
            group.bench_with_input(BenchmarkId::new(kind.as_str(), dim), &dim, |b, _| {
                b.iter(|| {
                    let mut solver = Solver::create(&params, 1.0).unwrap();
                    let mut x = x0.clone();
                    solver.minimize(black_box(&mut Rosenbrock), black_box(&mut x))
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, benchmark_quadratic, benchmark_rosenbrock);
criterion_main!(benches);
