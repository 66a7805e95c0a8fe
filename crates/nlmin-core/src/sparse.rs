//! Sparse storage for curvature information.
//!
//! Large problems usually return their Hessian in compressed sparse row
//! form. [`CooMatrix`] is the assembly format (duplicates are summed) and
//! [`CsrMatrix`] the solve format consumed by the sparse Newton strategy.

use crate::{
    error::{Result, SolverError},
    types::{Matrix, Vector},
};

/// Compressed Sparse Row (CSR) format matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    /// Number of rows
    nrows: usize,
    /// Number of columns
    ncols: usize,
    /// Row pointers (length nrows + 1)
    row_ptr: Vec<usize>,
    /// Column indices (length nnz), sorted within each row
    col_idx: Vec<usize>,
    /// Non-zero values (length nnz)
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Creates a new CSR matrix from raw data.
    pub fn new(
        nrows: usize,
        ncols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self> {
        if row_ptr.len() != nrows + 1 {
            return Err(SolverError::dimension_mismatch(
                format!("row_ptr length {}", nrows + 1),
                format!("row_ptr length {}", row_ptr.len()),
            ));
        }
        if row_ptr[0] != 0 {
            return Err(SolverError::invalid_configuration(
                "first row pointer must be zero",
                "row_ptr",
                format!("{row_ptr:?}"),
            ));
        }
        if row_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(SolverError::invalid_configuration(
                "row pointers must be non-decreasing",
                "row_ptr",
                format!("{row_ptr:?}"),
            ));
        }

        let nnz = row_ptr[nrows];
        if col_idx.len() != nnz {
            return Err(SolverError::dimension_mismatch(
                format!("col_idx length {nnz}"),
                format!("col_idx length {}", col_idx.len()),
            ));
        }
        if values.len() != nnz {
            return Err(SolverError::dimension_mismatch(
                format!("values length {nnz}"),
                format!("values length {}", values.len()),
            ));
        }
        if let Some(&j) = col_idx.iter().find(|&&j| j >= ncols) {
            return Err(SolverError::dimension_mismatch(
                format!("col < {ncols}"),
                format!("col = {j}"),
            ));
        }
        if let Some(i) = (0..nrows).find(|&i| {
            col_idx[row_ptr[i]..row_ptr[i + 1]]
                .windows(2)
                .any(|w| w[0] >= w[1])
        }) {
            return Err(SolverError::invalid_configuration(
                "column indices must be strictly increasing within a row",
                "col_idx",
                format!("row {i}: {:?}", &col_idx[row_ptr[i]..row_ptr[i + 1]]),
            ));
        }

        Ok(Self {
            nrows,
            ncols,
            row_ptr,
            col_idx,
            values,
        })
    }

    /// Creates a CSR matrix from a dense matrix, dropping entries with `|v| <= tolerance`.
    pub fn from_dense(dense: &Matrix, tolerance: f64) -> Self {
        let mut row_ptr = vec![0];
        let mut col_idx = Vec::new();
        let mut values = Vec::new();

        for i in 0..dense.nrows() {
            for j in 0..dense.ncols() {
                let val = dense[(i, j)];
                if val.abs() > tolerance {
                    col_idx.push(j);
                    values.push(val);
                }
            }
            row_ptr.push(col_idx.len());
        }

        Self {
            nrows: dense.nrows(),
            ncols: dense.ncols(),
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Converts to a dense matrix.
    pub fn to_dense(&self) -> Matrix {
        let mut dense = Matrix::zeros(self.nrows, self.ncols);
        for (i, j, v) in self.triplets() {
            dense[(i, j)] = v;
        }
        dense
    }

    /// Returns the number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Returns the number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Returns the number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Iterates over stored entries as `(row, col, value)`.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.nrows).flat_map(move |i| {
            (self.row_ptr[i]..self.row_ptr[i + 1]).map(move |k| (i, self.col_idx[k], self.values[k]))
        })
    }

    /// Returns true if any stored entry is NaN or infinite.
    pub fn has_non_finite(&self) -> bool {
        self.values.iter().any(|v| !v.is_finite())
    }

    /// Returns the diagonal, with zeros for entries that are not stored.
    pub fn diagonal(&self) -> Vector {
        let n = self.nrows.min(self.ncols);
        let mut diag = Vector::zeros(n);
        for i in 0..n {
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                if self.col_idx[k] == i {
                    diag[i] += self.values[k];
                }
            }
        }
        diag
    }

    /// Sparse matrix-vector multiplication: y = A * x
    pub fn spmv(&self, x: &Vector, y: &mut Vector) -> Result<()> {
        if x.len() != self.ncols {
            return Err(SolverError::dimension_mismatch(
                format!("vector length {}", self.ncols),
                format!("vector length {}", x.len()),
            ));
        }
        if y.len() != self.nrows {
            return Err(SolverError::dimension_mismatch(
                format!("result length {}", self.nrows),
                format!("result length {}", y.len()),
            ));
        }

        for i in 0..self.nrows {
            let mut sum = 0.0;
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                sum += self.values[k] * x[self.col_idx[k]];
            }
            y[i] = sum;
        }

        Ok(())
    }
}

/// Coordinate (COO) format matrix for assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct CooMatrix {
    /// Number of rows
    nrows: usize,
    /// Number of columns
    ncols: usize,
    /// Triplets (row, col, value)
    triplets: Vec<(usize, usize, f64)>,
}

impl CooMatrix {
    /// Creates a new empty COO matrix.
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            triplets: Vec::new(),
        }
    }

    /// Adds an entry to the matrix. Repeated entries are summed.
    pub fn push(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        if row >= self.nrows {
            return Err(SolverError::dimension_mismatch(
                format!("row < {}", self.nrows),
                format!("row = {row}"),
            ));
        }
        if col >= self.ncols {
            return Err(SolverError::dimension_mismatch(
                format!("col < {}", self.ncols),
                format!("col = {col}"),
            ));
        }

        if value != 0.0 {
            self.triplets.push((row, col, value));
        }

        Ok(())
    }

    /// Converts to CSR format.
    pub fn to_csr(&self) -> CsrMatrix {
        let mut sorted = self.triplets.clone();
        sorted.sort_by_key(|&(r, c, _)| (r, c));

        let mut unique: Vec<(usize, usize, f64)> = Vec::with_capacity(sorted.len());
        for (r, c, v) in sorted {
            match unique.last_mut() {
                Some((last_r, last_c, last_v)) if *last_r == r && *last_c == c => *last_v += v,
                _ => unique.push((r, c, v)),
            }
        }

        let mut row_ptr = vec![0; self.nrows + 1];
        for &(r, _, _) in &unique {
            row_ptr[r + 1] += 1;
        }
        for i in 0..self.nrows {
            row_ptr[i + 1] += row_ptr[i];
        }

        CsrMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            row_ptr,
            col_idx: unique.iter().map(|&(_, c, _)| c).collect(),
            values: unique.iter().map(|&(_, _, v)| v).collect(),
        }
    }
}
