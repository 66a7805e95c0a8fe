//! Example: minimizing the Rosenbrock function with every solver family
//!
//! Run with `RUST_LOG=nlmin_optim=debug` to see per-iteration logs and
//! strategy escalations.

use nlmin::prelude::*;
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// f(x, y) = (1 - x)² + 100(y - x²)², minimized at (1, 1).
#[derive(Debug, Default)]
struct Rosenbrock {
    steps: usize,
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

    fn post_step(&mut self, _iteration: usize, _x: &Vector) {
        self.steps += 1;
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Rosenbrock from (-1.2, 1.0)");
    println!("===========================\n");

    for name in Solver::available_solvers() {
        let params = json!({
            "solver": name,
            "grad_norm": 1e-8,
            "max_iterations": 20000,
            "allow_out_of_iterations": true,
            "line_search": { "method": "Backtracking" },
        });
        let mut solver = Solver::from_json(&params, 1.0, true)?;
        let mut problem = Rosenbrock::default();
        let mut x = Vector::from_vec(vec![-1.2, 1.0]);

        match solver.minimize(&mut problem, &mut x) {
            Ok(status) => {
                let info = solver.info();
                println!(
                    "{name:>16}: {status} after {} iterations, x = ({:.6}, {:.6}), f = {:.3e}, escalations = {}",
                    info.iterations, x[0], x[1], info.energy, info.escalations
                );
            }
            Err(err) => println!("{name:>16}: {err}"),
        }
        debug_assert_eq!(problem.steps, solver.current().iterations);
    }

    let mut solver = Solver::create(&SolverParams::new(SolverKind::Lbfgs), 1.0)?;
    let mut x = Vector::from_vec(vec![-1.2, 1.0]);
    solver.minimize(&mut Rosenbrock::default(), &mut x)?;
    println!("\nL-BFGS solver info:");
    println!("{:#}", solver.info().to_json());

    Ok(())
}
