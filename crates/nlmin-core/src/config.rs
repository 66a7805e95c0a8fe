//! Solver and step-size search parameters.
//!
//! Parameters are read from a JSON object whose keys mirror the field names
//! below. Missing keys take their defaults; unknown keys are rejected in
//! strict mode and reported otherwise. After [`SolverParams::validate`] the
//! values are split into per-component structs that the solver keeps for its
//! whole lifetime.
//!
//! # Example
//!
//! ```
//! use nlmin_core::config::{SolverKind, SolverParams};
//! use serde_json::json;
//!
//! let params = SolverParams::from_json(
//!     &json!({
//!         "solver": "L-BFGS",
//!         "grad_norm": 1e-6,
//!         "line_search": { "method": "Armijo" },
//!         "L-BFGS": { "history_size": 10 }
//!     }),
//!     true,
//! )
//! .unwrap();
//!
//! assert_eq!(params.solver, SolverKind::Lbfgs);
//! assert_eq!(params.lbfgs.history_size, 10);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{
    criteria::StoppingThresholds,
    error::{Result, SolverError},
};

/// Descent strategy family selected by the `solver` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SolverKind {
    /// Newton with sparse curvature (`Newton`, `SparseNewton`, `sparse_newton`)
    #[default]
    SparseNewton,
    /// Newton with dense curvature (`DenseNewton`, `dense_newton`)
    DenseNewton,
    /// Dense quasi-Newton (`BFGS`)
    Bfgs,
    /// Limited-memory quasi-Newton (`L-BFGS`, `LBFGS`)
    Lbfgs,
    /// Steepest descent (`GradientDescent`, `gradient_descent`)
    GradientDescent,
}

impl SolverKind {
    /// Canonical names of every family.
    pub const CANONICAL_NAMES: [&'static str; 5] =
        ["BFGS", "DenseNewton", "Newton", "GradientDescent", "L-BFGS"];

    /// Returns the canonical name of the family.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SparseNewton => "Newton",
            Self::DenseNewton => "DenseNewton",
            Self::Bfgs => "BFGS",
            Self::Lbfgs => "L-BFGS",
            Self::GradientDescent => "GradientDescent",
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SolverKind {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Newton" | "SparseNewton" | "sparse_newton" => Ok(Self::SparseNewton),
            "DenseNewton" | "dense_newton" => Ok(Self::DenseNewton),
            "BFGS" => Ok(Self::Bfgs),
            "LBFGS" | "L-BFGS" => Ok(Self::Lbfgs),
            "GradientDescent" | "gradient_descent" => Ok(Self::GradientDescent),
            other => Err(SolverError::UnknownSolver(other.to_string())),
        }
    }
}

impl From<SolverKind> for String {
    fn from(kind: SolverKind) -> Self {
        kind.as_str().to_string()
    }
}

impl TryFrom<String> for SolverKind {
    type Error = SolverError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Step-size search selected by the `line_search.method` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum LineSearchMethod {
    /// Shrink until the objective strictly decreases
    #[default]
    Backtracking,
    /// Shrink until the sufficient-decrease condition holds
    Armijo,
    /// Accept the full step
    None,
}

impl LineSearchMethod {
    /// Returns the canonical name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backtracking => "Backtracking",
            Self::Armijo => "Armijo",
            Self::None => "None",
        }
    }
}

impl fmt::Display for LineSearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LineSearchMethod {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Backtracking" | "backtracking" => Ok(Self::Backtracking),
            "Armijo" | "armijo" => Ok(Self::Armijo),
            "None" | "none" => Ok(Self::None),
            other => Err(SolverError::UnknownLineSearch(other.to_string())),
        }
    }
}

impl From<LineSearchMethod> for String {
    fn from(method: LineSearchMethod) -> Self {
        method.as_str().to_string()
    }
}

impl TryFrom<String> for LineSearchMethod {
    type Error = SolverError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Sufficient-decrease constant of the Armijo search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmijoParams {
    /// Armijo constant c ∈ (0, 1)
    pub c: f64,
}

impl Default for ArmijoParams {
    fn default() -> Self {
        Self { c: 1e-4 }
    }
}

/// Step-size search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSearchParams {
    /// Search method
    pub method: LineSearchMethod,

    /// Below this gradient norm the backtracking test compares gradient
    /// norms instead of energies. Negative disables.
    pub use_grad_norm_tol: f64,

    /// Smallest step tried before the search gives up
    pub min_step_size: f64,

    /// Maximum number of trial steps per phase
    pub max_step_size_iter: usize,

    /// First step tried
    pub default_init_step_size: f64,

    /// Shrink factor applied after each rejected trial
    pub step_ratio: f64,

    /// Armijo constants
    #[serde(rename = "Armijo")]
    pub armijo: ArmijoParams,
}

impl Default for LineSearchParams {
    fn default() -> Self {
        Self {
            method: LineSearchMethod::Backtracking,
            use_grad_norm_tol: -1.0,
            min_step_size: 1e-10,
            max_step_size_iter: 30,
            default_init_step_size: 1.0,
            step_ratio: 0.5,
            armijo: ArmijoParams::default(),
        }
    }
}

impl LineSearchParams {
    /// Creates default parameters for a method.
    pub fn new(method: LineSearchMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Sets the shrink factor.
    pub fn with_step_ratio(mut self, ratio: f64) -> Self {
        self.step_ratio = ratio;
        self
    }

    /// Sets the smallest step.
    pub fn with_min_step_size(mut self, min_step_size: f64) -> Self {
        self.min_step_size = min_step_size;
        self
    }

    /// Sets the trial budget per phase.
    pub fn with_max_step_size_iter(mut self, max_iter: usize) -> Self {
        self.max_step_size_iter = max_iter;
        self
    }

    /// Sets the gradient-norm switch of the backtracking test.
    pub fn with_use_grad_norm_tol(mut self, tol: f64) -> Self {
        self.use_grad_norm_tol = tol;
        self
    }

    /// Validates the ranges of every parameter.
    pub fn validate(&self) -> Result<()> {
        if !(self.min_step_size > 0.0) {
            return Err(SolverError::invalid_configuration(
                "must be positive",
                "line_search.min_step_size",
                self.min_step_size.to_string(),
            ));
        }
        if self.max_step_size_iter == 0 {
            return Err(SolverError::invalid_configuration(
                "must be positive",
                "line_search.max_step_size_iter",
                "0",
            ));
        }
        if !(self.default_init_step_size >= self.min_step_size)
            || !self.default_init_step_size.is_finite()
        {
            return Err(SolverError::invalid_configuration(
                "must be finite and at least min_step_size",
                "line_search.default_init_step_size",
                self.default_init_step_size.to_string(),
            ));
        }
        if !(self.step_ratio > 0.0 && self.step_ratio < 1.0) {
            return Err(SolverError::invalid_configuration(
                "must be in (0, 1)",
                "line_search.step_ratio",
                self.step_ratio.to_string(),
            ));
        }
        if !(self.armijo.c > 0.0 && self.armijo.c < 1.0) {
            return Err(SolverError::invalid_configuration(
                "must be in (0, 1)",
                "line_search.Armijo.c",
                self.armijo.c.to_string(),
            ));
        }
        if self.use_grad_norm_tol.is_nan() {
            return Err(SolverError::invalid_configuration(
                "must be a number",
                "line_search.use_grad_norm_tol",
                "NaN",
            ));
        }
        Ok(())
    }
}

/// Limited-memory quasi-Newton parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LbfgsParams {
    /// Number of correction pairs kept
    pub history_size: usize,
}

impl Default for LbfgsParams {
    fn default() -> Self {
        Self { history_size: 6 }
    }
}

/// Newton regularization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonParams {
    /// Smallest diagonal shift
    pub reg_weight_min: f64,
    /// Largest diagonal shift before the regularized solve gives up
    pub reg_weight_max: f64,
    /// Growth factor of the shift after a failed factorization
    pub reg_weight_inc: f64,
}

impl Default for NewtonParams {
    fn default() -> Self {
        Self {
            reg_weight_min: 1e-8,
            reg_weight_max: 1e8,
            reg_weight_inc: 10.0,
        }
    }
}

/// Conjugate-gradient parameters for the sparse Newton solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CgParams {
    /// Iteration budget
    pub max_iterations: usize,
    /// Relative residual tolerance
    pub tolerance: f64,
}

impl Default for CgParams {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-10,
        }
    }
}

/// Complete solver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Descent strategy family
    pub solver: SolverKind,
    /// Step-norm tolerance, relative to the characteristic length
    pub x_delta: f64,
    /// Value-delta tolerance, relative to the characteristic length
    pub f_delta: f64,
    /// Gradient-norm tolerance, relative to the characteristic length
    pub grad_norm: f64,
    /// Gradient-norm tolerance of the first iteration
    pub first_grad_norm_tol: f64,
    /// Iteration budget
    pub max_iterations: usize,
    /// Report an exhausted budget as a normal termination
    pub allow_out_of_iterations: bool,
    /// Step-size search
    pub line_search: LineSearchParams,
    /// Limited-memory quasi-Newton
    #[serde(rename = "L-BFGS")]
    pub lbfgs: LbfgsParams,
    /// Newton regularization
    #[serde(rename = "Newton")]
    pub newton: NewtonParams,
    /// Iterative linear solve
    pub linear_solver: CgParams,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            solver: SolverKind::default(),
            x_delta: 0.0,
            f_delta: 0.0,
            grad_norm: 1e-8,
            first_grad_norm_tol: 1e-10,
            max_iterations: 500,
            allow_out_of_iterations: false,
            line_search: LineSearchParams::default(),
            lbfgs: LbfgsParams::default(),
            newton: NewtonParams::default(),
            linear_solver: CgParams::default(),
        }
    }
}

impl SolverParams {
    /// Creates default parameters for a strategy family.
    pub fn new(solver: SolverKind) -> Self {
        Self {
            solver,
            ..Self::default()
        }
    }

    /// Sets the gradient-norm tolerance.
    pub fn with_grad_norm(mut self, tol: f64) -> Self {
        self.grad_norm = tol;
        self
    }

    /// Sets the first-iteration gradient-norm tolerance.
    pub fn with_first_grad_norm_tol(mut self, tol: f64) -> Self {
        self.first_grad_norm_tol = tol;
        self
    }

    /// Sets the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the step-size search.
    pub fn with_line_search(mut self, line_search: LineSearchParams) -> Self {
        self.line_search = line_search;
        self
    }

    /// Tolerates an exhausted iteration budget.
    pub fn with_allow_out_of_iterations(mut self, allow: bool) -> Self {
        self.allow_out_of_iterations = allow;
        self
    }

    /// Parses and validates parameters from JSON.
    ///
    /// With `strict`, keys outside the schema are an error. Otherwise they
    /// are logged and ignored.
    pub fn from_json(value: &Value, strict: bool) -> Result<Self> {
        if !value.is_object() {
            return Err(SolverError::invalid_configuration(
                "expected a JSON object",
                "solver_params",
                value.to_string(),
            ));
        }

        let unknown = unknown_keys(value, &serde_json::to_value(Self::default())?);
        if !unknown.is_empty() {
            if strict {
                return Err(SolverError::UnknownKeys(unknown));
            }
            warn!(keys = ?unknown, "ignoring unknown solver parameters");
        }

        // Surface name errors with their own variants rather than as JSON errors.
        if let Some(name) = value.get("solver").and_then(Value::as_str) {
            name.parse::<SolverKind>()?;
        }
        if let Some(name) = value.pointer("/line_search/method").and_then(Value::as_str) {
            name.parse::<LineSearchMethod>()?;
        }

        let params: Self = serde_json::from_value(value.clone())?;
        params.validate()?;
        Ok(params)
    }

    /// Validates the ranges of every parameter.
    pub fn validate(&self) -> Result<()> {
        for (name, tol) in [
            ("x_delta", self.x_delta),
            ("f_delta", self.f_delta),
            ("grad_norm", self.grad_norm),
            ("first_grad_norm_tol", self.first_grad_norm_tol),
        ] {
            if !(tol >= 0.0) || !tol.is_finite() {
                return Err(SolverError::invalid_configuration(
                    "must be finite and non-negative",
                    name,
                    tol.to_string(),
                ));
            }
        }

        if self.max_iterations == 0 {
            return Err(SolverError::invalid_configuration(
                "must be positive",
                "max_iterations",
                "0",
            ));
        }

        self.line_search.validate()?;

        if self.lbfgs.history_size == 0 {
            return Err(SolverError::invalid_configuration(
                "must be positive",
                "L-BFGS.history_size",
                "0",
            ));
        }

        let newton = &self.newton;
        if !(newton.reg_weight_min > 0.0) {
            return Err(SolverError::invalid_configuration(
                "must be positive",
                "Newton.reg_weight_min",
                newton.reg_weight_min.to_string(),
            ));
        }
        if !(newton.reg_weight_min <= newton.reg_weight_max) {
            return Err(SolverError::invalid_configuration(
                "must not exceed reg_weight_max",
                "Newton.reg_weight_min",
                newton.reg_weight_min.to_string(),
            ));
        }
        if !(newton.reg_weight_inc > 1.0) {
            return Err(SolverError::invalid_configuration(
                "must be greater than 1",
                "Newton.reg_weight_inc",
                newton.reg_weight_inc.to_string(),
            ));
        }

        if self.linear_solver.max_iterations == 0 {
            return Err(SolverError::invalid_configuration(
                "must be positive",
                "linear_solver.max_iterations",
                "0",
            ));
        }
        if !(self.linear_solver.tolerance > 0.0) {
            return Err(SolverError::invalid_configuration(
                "must be positive",
                "linear_solver.tolerance",
                self.linear_solver.tolerance.to_string(),
            ));
        }

        Ok(())
    }

    /// Builds the stopping thresholds for a characteristic length.
    pub fn stopping_thresholds(&self, characteristic_length: f64) -> StoppingThresholds {
        StoppingThresholds::new()
            .with_x_delta(self.x_delta)
            .with_f_delta(self.f_delta)
            .with_grad_norm(self.grad_norm)
            .with_first_grad_norm_tol(self.first_grad_norm_tol)
            .with_max_iterations(self.max_iterations)
            .scaled(characteristic_length)
    }

    /// Returns the step-size search parameters for a characteristic length.
    pub fn scaled_line_search(&self, characteristic_length: f64) -> LineSearchParams {
        LineSearchParams {
            use_grad_norm_tol: self.line_search.use_grad_norm_tol * characteristic_length,
            ..self.line_search
        }
    }
}

/// Collects dotted paths of keys in `value` that do not appear in `schema`.
fn unknown_keys(value: &Value, schema: &Value) -> Vec<String> {
    fn walk(value: &Value, schema: &Value, prefix: &str, out: &mut Vec<String>) {
        let (Some(obj), Some(known)) = (value.as_object(), schema.as_object()) else {
            return;
        };
        for (key, child) in obj {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            match known.get(key) {
                Some(child_schema) => walk(child, child_schema, &path, out),
                None => out.push(path),
            }
        }
    }

    let mut out = Vec::new();
    walk(value, schema, "", &mut out);
    out.sort();
    out
}
