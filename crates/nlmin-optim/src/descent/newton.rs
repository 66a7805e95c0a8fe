//! Newton's method with dense or sparse curvature.
//!
//! The direction solves (H + wI)Δx = -∇f. Plain Newton uses w = 0 and fails
//! as soon as the system is not positive definite. The regularized variant
//! starts from the shift remembered from its last success and multiplies it
//! by `reg_weight_inc` after every failed solve, giving up once it exceeds
//! `reg_weight_max`. After a success the next solve starts one increment
//! lower, clamped at `reg_weight_min`.
//!
//! Dense curvature is factored with Cholesky. Sparse curvature is solved
//! with Jacobi-preconditioned conjugate gradients, which report non-positive
//! curvature as [`DirectionError::IndefiniteHessian`].

use nlmin_core::{
    config::{CgParams, NewtonParams},
    error::DirectionError,
    metrics::{Metrics, Phase},
    problem::Problem,
    sparse::CsrMatrix,
    types::{constants::SPARSITY_TOLERANCE, Matrix, Vector},
};
use tracing::{debug, trace};

use super::DescentDirection;

/// Storage used for the linear solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HessianStorage {
    /// Dense Cholesky factorization
    Dense,
    /// Sparse conjugate gradients
    Sparse,
}

/// Newton strategy, plain or regularized.
#[derive(Debug, Clone)]
pub struct Newton {
    storage: HessianStorage,
    regularized: bool,
    params: NewtonParams,
    cg: CgParams,
    reg_weight: f64,
}

impl Newton {
    /// Creates plain Newton.
    pub fn new(storage: HessianStorage, params: NewtonParams, cg: CgParams) -> Self {
        Self {
            storage,
            regularized: false,
            params,
            cg,
            reg_weight: 0.0,
        }
    }

    /// Creates regularized Newton.
    pub fn regularized(storage: HessianStorage, params: NewtonParams, cg: CgParams) -> Self {
        Self {
            storage,
            regularized: true,
            params,
            cg,
            reg_weight: params.reg_weight_min,
        }
    }

    /// Storage used for the linear solve.
    pub fn storage(&self) -> HessianStorage {
        self.storage
    }

    /// Whether the diagonal shift is enabled.
    pub fn is_regularized(&self) -> bool {
        self.regularized
    }

    /// Shift the next regularized solve starts from.
    pub fn reg_weight(&self) -> f64 {
        self.reg_weight
    }

    fn solve_regularized<F>(&mut self, mut solve: F) -> Result<Vector, DirectionError>
    where
        F: FnMut(f64) -> Result<Vector, DirectionError>,
    {
        let inc = self.params.reg_weight_inc;
        let mut weight = self.reg_weight.max(self.params.reg_weight_min);

        loop {
            match solve(weight) {
                Ok(direction) => {
                    debug!(reg_weight = weight, "regularized Newton solve succeeded");
                    self.reg_weight = (weight / inc).max(self.params.reg_weight_min);
                    return Ok(direction);
                }
                Err(err) => {
                    trace!(reg_weight = weight, error = %err, "increasing regularization");
                    weight *= inc;
                    if weight > self.params.reg_weight_max {
                        self.reg_weight = self.params.reg_weight_max;
                        return Err(err);
                    }
                }
            }
        }
    }
}

/// Solves (H + wI)d = -g by Cholesky.
fn solve_dense(hessian: &Matrix, grad: &Vector, shift: f64) -> Result<Vector, DirectionError> {
    let n = grad.len();
    let mut shifted = hessian.clone();
    if shift != 0.0 {
        for i in 0..n {
            shifted[(i, i)] += shift;
        }
    }

    let cholesky = shifted
        .cholesky()
        .ok_or_else(|| DirectionError::Factorization {
            reason: format!("matrix is not positive definite (shift {shift:e})"),
        })?;

    let direction = cholesky.solve(&-grad);
    if direction.iter().any(|v| !v.is_finite()) {
        return Err(DirectionError::NonFinite);
    }
    Ok(direction)
}

/// Solves (H + wI)d = -g by Jacobi-preconditioned conjugate gradients.
fn solve_sparse(
    hessian: &CsrMatrix,
    grad: &Vector,
    shift: f64,
    params: &CgParams,
) -> Result<Vector, DirectionError> {
    let n = grad.len();
    let rhs = -grad;
    let rhs_norm = rhs.norm();
    let mut d = Vector::zeros(n);
    if rhs_norm == 0.0 {
        return Ok(d);
    }

    let inv_diag = (hessian.diagonal().add_scalar(shift)).map(|v| if v > 0.0 { 1.0 / v } else { 1.0 });

    let mut r = rhs;
    let mut z = r.component_mul(&inv_diag);
    let mut p = z.clone();
    let mut rz = r.dot(&z);
    let mut hp = Vector::zeros(n);

    for _ in 0..params.max_iterations {
        hessian
            .spmv(&p, &mut hp)
            .map_err(|_| DirectionError::DimensionMismatch {
                expected: hessian.ncols(),
                actual: n,
            })?;
        hp.axpy(shift, &p, 1.0);

        let curvature = p.dot(&hp);
        if !(curvature > 0.0) {
            return Err(DirectionError::IndefiniteHessian { curvature });
        }

        let alpha = rz / curvature;
        d.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &hp, 1.0);

        if r.norm() <= params.tolerance * rhs_norm {
            if d.iter().any(|v| !v.is_finite()) {
                return Err(DirectionError::NonFinite);
            }
            return Ok(d);
        }

        z = r.component_mul(&inv_diag);
        let rz_new = r.dot(&z);
        let beta = rz_new / rz;
        rz = rz_new;
        p *= beta;
        p += &z;
    }

    Err(DirectionError::LinearSolveDidNotConverge {
        iterations: params.max_iterations,
        residual: r.norm(),
    })
}

impl DescentDirection for Newton {
    fn name(&self) -> &'static str {
        match (self.storage, self.regularized) {
            (HessianStorage::Dense, false) => "dense Newton",
            (HessianStorage::Dense, true) => "regularized dense Newton",
            (HessianStorage::Sparse, false) => "sparse Newton",
            (HessianStorage::Sparse, true) => "regularized sparse Newton",
        }
    }

    fn reset(&mut self, _ndof: usize) {
        self.reg_weight = if self.regularized {
            self.params.reg_weight_min
        } else {
            0.0
        };
    }

    fn compute_direction<P: Problem + ?Sized>(
        &mut self,
        problem: &P,
        x: &Vector,
        grad: &Vector,
        metrics: &mut Metrics,
    ) -> Result<Vector, DirectionError> {
        let n = grad.len();
        let hessian = {
            let _timer = metrics.timer(Phase::Assembly);
            problem.hessian(x).ok_or(DirectionError::MissingHessian)?
        };
        if hessian.nrows() != n {
            return Err(DirectionError::DimensionMismatch {
                expected: n,
                actual: hessian.nrows(),
            });
        }

        let _timer = metrics.timer(Phase::Inverting);
        match self.storage {
            HessianStorage::Dense => {
                let h = hessian.into_dense();
                if h.ncols() != n {
                    return Err(DirectionError::DimensionMismatch {
                        expected: n,
                        actual: h.ncols(),
                    });
                }
                if self.regularized {
                    self.solve_regularized(|w| solve_dense(&h, grad, w))
                } else {
                    solve_dense(&h, grad, 0.0)
                }
            }
            HessianStorage::Sparse => {
                let h = hessian.into_sparse(SPARSITY_TOLERANCE);
                if h.ncols() != n {
                    return Err(DirectionError::DimensionMismatch {
                        expected: n,
                        actual: h.ncols(),
                    });
                }
                if h.has_non_finite() {
                    return Err(DirectionError::NonFinite);
                }
                let cg = self.cg;
                if self.regularized {
                    self.solve_regularized(|w| solve_sparse(&h, grad, w, &cg))
                } else {
                    solve_sparse(&h, grad, 0.0, &cg)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_problems::{indefinite_2x2, spd_2x2};
    use super::*;
    use approx::assert_relative_eq;

    fn grad_at(problem: &impl Problem, x: &Vector) -> Vector {
        let mut g = Vector::zeros(x.len());
        problem.gradient(x, &mut g);
        g
    }

    fn plain(storage: HessianStorage) -> Newton {
        Newton::new(storage, NewtonParams::default(), CgParams::default())
    }

    fn regularized(storage: HessianStorage) -> Newton {
        Newton::regularized(storage, NewtonParams::default(), CgParams::default())
    }

    #[test]
    fn test_newton_step_hits_minimizer() {
        for (storage, sparse) in [(HessianStorage::Dense, false), (HessianStorage::Sparse, true)] {
            let mut problem = spd_2x2();
            problem.sparse = sparse;
            let x = Vector::from_vec(vec![3.0, -2.0]);
            let g = grad_at(&problem, &x);

            let dir = plain(storage)
                .compute_direction(&problem, &x, &g, &mut Metrics::new())
                .unwrap();
            let target = problem.minimizer();
            for i in 0..2 {
                assert_relative_eq!(x[i] + dir[i], target[i], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_storage_conversion_both_ways() {
        // Dense strategy on a sparse Hessian and vice versa.
        let mut problem = spd_2x2();
        problem.sparse = true;
        let x = Vector::from_vec(vec![1.0, 1.0]);
        let g = grad_at(&problem, &x);
        let a = plain(HessianStorage::Dense)
            .compute_direction(&problem, &x, &g, &mut Metrics::new())
            .unwrap();

        problem.sparse = false;
        let b = plain(HessianStorage::Sparse)
            .compute_direction(&problem, &x, &g, &mut Metrics::new())
            .unwrap();
        for i in 0..2 {
            assert_relative_eq!(a[i], b[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_plain_newton_rejects_indefinite() {
        let problem = indefinite_2x2();
        let x = Vector::from_vec(vec![1.0, 1.0]);
        let g = grad_at(&problem, &x);

        let err = plain(HessianStorage::Dense)
            .compute_direction(&problem, &x, &g, &mut Metrics::new())
            .unwrap_err();
        assert!(matches!(err, DirectionError::Factorization { .. }));

        let err = plain(HessianStorage::Sparse)
            .compute_direction(&problem, &x, &g, &mut Metrics::new())
            .unwrap_err();
        assert!(matches!(err, DirectionError::IndefiniteHessian { .. }));
    }

    #[test]
    fn test_regularization_grows_until_descent() {
        for storage in [HessianStorage::Dense, HessianStorage::Sparse] {
            let mut problem = indefinite_2x2();
            problem.sparse = storage == HessianStorage::Sparse;
            let x = Vector::from_vec(vec![1.0, 1.0]);
            let g = grad_at(&problem, &x);
            let mut newton = regularized(storage);

            let dir = newton
                .compute_direction(&problem, &x, &g, &mut Metrics::new())
                .unwrap();
            assert!(dir.dot(&g) < 0.0);
            // The accepted shift exceeds 2, the next solve starts one step lower.
            assert!(newton.reg_weight() > 0.2);
            assert!(newton.reg_weight() <= 100.0);

            newton.reset(2);
            assert_relative_eq!(newton.reg_weight(), 1e-8);
        }
    }

    #[test]
    fn test_regularization_gives_up_past_maximum() {
        let params = NewtonParams {
            reg_weight_min: 1e-8,
            reg_weight_max: 1e-4,
            reg_weight_inc: 10.0,
        };
        let problem = indefinite_2x2();
        let x = Vector::from_vec(vec![1.0, 1.0]);
        let g = grad_at(&problem, &x);

        let mut newton = Newton::regularized(HessianStorage::Dense, params, CgParams::default());
        assert!(newton
            .compute_direction(&problem, &x, &g, &mut Metrics::new())
            .is_err());
    }

    #[test]
    fn test_missing_hessian() {
        struct NoCurvature;
        impl Problem for NoCurvature {
            fn value(&self, x: &Vector) -> f64 {
                x.norm_squared()
            }
            fn gradient(&self, x: &Vector, grad: &mut Vector) {
                grad.copy_from(&(x * 2.0));
            }
        }

        let x = Vector::from_vec(vec![1.0]);
        let g = Vector::from_vec(vec![2.0]);
        let err = plain(HessianStorage::Sparse)
            .compute_direction(&NoCurvature, &x, &g, &mut Metrics::new())
            .unwrap_err();
        assert_eq!(err, DirectionError::MissingHessian);
    }

    #[test]
    fn test_cg_iteration_budget() {
        let h = CsrMatrix::from_dense(
            &Matrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 1.0, 0.0, 1.0, 2.0]),
            0.0,
        );
        let g = Vector::from_vec(vec![1.0, -1.0, 1.0]);
        let params = CgParams {
            max_iterations: 1,
            tolerance: 1e-14,
        };
        let err = solve_sparse(&h, &g, 0.0, &params).unwrap_err();
        assert!(matches!(
            err,
            DirectionError::LinearSolveDidNotConverge { iterations: 1, .. }
        ));
    }
}
