//! Test problems shared by the integration tests.

#![allow(dead_code)]

use nlmin_core::{
    criteria::IterationState,
    problem::{Hessian, Problem},
    sparse::CsrMatrix,
    types::{Matrix, Vector},
};

/// Installs a test subscriber once; respects `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// f(x) = ½(x - x*)ᵀA(x - x*), with f* = 0.
#[derive(Debug, Clone)]
pub struct Quadratic {
    pub a: Matrix,
    pub target: Vector,
    pub sparse: bool,
}

impl Quadratic {
    pub fn new(a: Matrix, target: Vector) -> Self {
        Self {
            a,
            target,
            sparse: false,
        }
    }

    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    /// 3×3 SPD matrix with a non-trivial minimizer.
    pub fn spd_3x3() -> Self {
        Self::new(
            Matrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, -1.0, 0.0, -1.0, 2.0]),
            Vector::from_vec(vec![1.0, -2.0, 0.5]),
        )
    }
}

impl Problem for Quadratic {
    fn value(&self, x: &Vector) -> f64 {
        let d = x - &self.target;
        0.5 * d.dot(&(&self.a * &d))
    }

    fn gradient(&self, x: &Vector, grad: &mut Vector) {
        grad.copy_from(&(&self.a * (x - &self.target)));
    }

    fn hessian(&self, _x: &Vector) -> Option<Hessian> {
        if self.sparse {
            Some(Hessian::Sparse(CsrMatrix::from_dense(&self.a, 0.0)))
        } else {
            Some(Hessian::Dense(self.a.clone()))
        }
    }
}

/// f(x, y) = (1 - x)² + 100(y - x²)²
#[derive(Debug, Clone, Copy, Default)]
pub struct Rosenbrock;

impl Rosenbrock {
    pub fn start() -> Vector {
        Vector::from_vec(vec![-1.2, 1.0])
    }
}

impl Problem for Rosenbrock {
    fn value(&self, x: &Vector) -> f64 {
        (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2)
    }

    fn gradient(&self, x: &Vector, grad: &mut Vector) {
        grad[0] = -2.0 * (1.0 - x[0]) - 400.0 * x[0] * (x[1] - x[0] * x[0]);
        grad[1] = 200.0 * (x[1] - x[0] * x[0]);
    }

    fn hessian(&self, x: &Vector) -> Option<Hessian> {
        Some(Hessian::Dense(Matrix::from_row_slice(
            2,
            2,
            &[
                2.0 - 400.0 * x[1] + 1200.0 * x[0] * x[0],
                -400.0 * x[0],
                -400.0 * x[0],
                200.0,
            ],
        )))
    }
}

/// f(x) = x⁴ - x², concave around the origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleWell;

impl Problem for DoubleWell {
    fn value(&self, x: &Vector) -> f64 {
        x[0].powi(4) - x[0].powi(2)
    }

    fn gradient(&self, x: &Vector, grad: &mut Vector) {
        grad[0] = 4.0 * x[0].powi(3) - 2.0 * x[0];
    }

    fn hessian(&self, x: &Vector) -> Option<Hessian> {
        Some(Hessian::Dense(Matrix::from_element(
            1,
            1,
            12.0 * x[0] * x[0] - 2.0,
        )))
    }
}

/// Records every hook the solver calls on the wrapped problem.
#[derive(Debug, Clone, Default)]
pub struct Recorder<P> {
    pub inner: P,
    pub post_steps: Vec<usize>,
    pub callbacks: Vec<usize>,
    pub energies: Vec<f64>,
    pub solution_changes: usize,
    pub saves: usize,
    pub stop_after: Option<usize>,
    pub veto_at: Option<usize>,
}

impl<P> Recorder<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            post_steps: Vec::new(),
            callbacks: Vec::new(),
            energies: Vec::new(),
            solution_changes: 0,
            saves: 0,
            stop_after: None,
            veto_at: None,
        }
    }
}

impl<P: Problem> Problem for Recorder<P> {
    fn value(&self, x: &Vector) -> f64 {
        self.inner.value(x)
    }

    fn gradient(&self, x: &Vector, grad: &mut Vector) {
        self.inner.gradient(x, grad);
    }

    fn hessian(&self, x: &Vector) -> Option<Hessian> {
        self.inner.hessian(x)
    }

    fn solution_changed(&mut self, _x: &Vector) {
        self.solution_changes += 1;
    }

    fn stop(&self, _x: &Vector) -> bool {
        self.stop_after
            .is_some_and(|n| self.post_steps.len() + 1 >= n)
    }

    fn post_step(&mut self, iteration: usize, x: &Vector) {
        self.post_steps.push(iteration);
        self.energies.push(self.inner.value(x));
    }

    fn callback(&mut self, state: &IterationState, _x: &Vector) -> bool {
        self.callbacks.push(state.iterations);
        self.veto_at != Some(state.iterations)
    }

    fn save_to_file(&mut self, _x: &Vector) {
        self.saves += 1;
    }
}
