//! Property-based tests on random strictly convex quadratics.

mod common;

use common::Quadratic;
use nlmin_core::{
    config::{CgParams, NewtonParams, SolverKind, SolverParams},
    metrics::Metrics,
    problem::Problem,
    types::{Matrix, Vector},
};
use nlmin_optim::{Bfgs, DescentDirection, HessianStorage, Lbfgs, Newton, Solver};
use proptest::prelude::*;

/// A = MᵀM + nI, well conditioned for entries of M in [-1, 1].
fn spd_quadratic() -> impl Strategy<Value = (Quadratic, Vector)> {
    (2usize..=5).prop_flat_map(|n| {
        (
            prop::collection::vec(-1.0f64..1.0, n * n),
            prop::collection::vec(-5.0f64..5.0, n),
            prop::collection::vec(-5.0f64..5.0, n),
        )
            .prop_map(move |(m, target, start)| {
                let m = Matrix::from_vec(n, n, m);
                let a = m.transpose() * &m + Matrix::identity(n, n) * n as f64;
                (
                    Quadratic::new(a, Vector::from_vec(target)),
                    Vector::from_vec(start),
                )
            })
    })
}

fn gradient(problem: &impl Problem, x: &Vector) -> Vector {
    let mut g = Vector::zeros(x.len());
    problem.gradient(x, &mut g);
    g
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_every_family_reaches_the_minimizer((problem, start) in spd_quadratic()) {
        for kind in [
            SolverKind::SparseNewton,
            SolverKind::DenseNewton,
            SolverKind::Bfgs,
            SolverKind::Lbfgs,
            SolverKind::GradientDescent,
        ] {
            // Backtracking gradient descent can contract slowly when the
            // accepted step sits just below 2/λmax.
            let params = SolverParams::new(kind)
                .with_grad_norm(1e-7)
                .with_max_iterations(100_000);
            let mut solver = Solver::create(&params, 1.0).unwrap();
            let mut x = start.clone();
            let mut p = problem.clone();

            let status = solver.minimize(&mut p, &mut x).unwrap();
            prop_assert!(status.is_converged());
            prop_assert!((&x - &problem.target).norm() < 1e-6, "{kind}: {x}");
        }
    }

    #[test]
    fn prop_strategies_produce_descent_directions((problem, x) in spd_quadratic()) {
        let g = gradient(&problem, &x);
        prop_assume!(g.norm() > 1e-8);
        let n = x.len();
        let mut metrics = Metrics::new();

        let mut dense = Newton::new(HessianStorage::Dense, NewtonParams::default(), CgParams::default());
        let mut sparse = Newton::new(HessianStorage::Sparse, NewtonParams::default(), CgParams::default());
        let mut bfgs = Bfgs::new();
        bfgs.reset(n);
        let mut lbfgs = Lbfgs::new(4);

        for direction in [
            dense.compute_direction(&problem, &x, &g, &mut metrics).unwrap(),
            sparse.compute_direction(&problem, &x, &g, &mut metrics).unwrap(),
            bfgs.compute_direction(&problem, &x, &g, &mut metrics).unwrap(),
            lbfgs.compute_direction(&problem, &x, &g, &mut metrics).unwrap(),
        ] {
            prop_assert!(direction.dot(&g) < 0.0);
        }
    }

    #[test]
    fn prop_newton_step_lands_on_minimizer((problem, x) in spd_quadratic()) {
        let g = gradient(&problem, &x);
        let mut newton = Newton::new(HessianStorage::Dense, NewtonParams::default(), CgParams::default());
        let direction = newton
            .compute_direction(&problem, &x, &g, &mut Metrics::new())
            .unwrap();

        let landed = &x + direction;
        prop_assert!((&landed - &problem.target).norm() < 1e-8);
    }
}
