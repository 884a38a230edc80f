/// Shared numeric types: a control sequence (m x N matrix) and a few vector helpers.
///
/// Rows are control channels, columns are timesteps of the horizon, so column k
/// is the action planned for step k.

use crate::error::{ControlError, ControlResult};

/// Dense row-major matrix of planned controls with shape (m, horizon)
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSequence {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl ControlSequence {
    /// Create a zero sequence with `rows` control channels over `cols` steps
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build a sequence that repeats the same action at every step
    pub fn repeated(action: &[f64], cols: usize) -> Self {
        let mut seq = Self::zeros(action.len(), cols);
        for k in 0..cols {
            seq.set_column(k, action);
        }
        seq
    }

    /// Build a sequence from per-step actions (each of length `rows`)
    pub fn from_columns(rows: usize, columns: &[Vec<f64>]) -> ControlResult<Self> {
        let mut seq = Self::zeros(rows, columns.len());
        for (k, column) in columns.iter().enumerate() {
            if column.len() != rows {
                return Err(ControlError::length("control sequence column", rows, column.len()));
            }
            seq.set_column(k, column);
        }
        Ok(seq)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    /// Action planned for step `col`
    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.rows).map(|row| self.get(row, col)).collect()
    }

    pub fn set_column(&mut self, col: usize, values: &[f64]) {
        for (row, &value) in values.iter().enumerate().take(self.rows) {
            self.set(row, col, value);
        }
    }

    /// self += weight * other, shapes must agree
    pub fn add_scaled(&mut self, weight: f64, other: &ControlSequence) -> ControlResult<()> {
        if other.shape() != self.shape() {
            return Err(ControlError::shape("control sequence", self.shape(), other.shape()));
        }
        for (acc, value) in self.data.iter_mut().zip(&other.data) {
            *acc += weight * value;
        }
        Ok(())
    }

    /// Shift the plan one step forward, repeating the last column at the end
    pub fn shifted(&self) -> Self {
        let mut seq = self.clone();
        if self.cols == 0 {
            return seq;
        }
        for k in 0..self.cols - 1 {
            let next = self.column(k + 1);
            seq.set_column(k, &next);
        }
        seq
    }
}

/// acc += weight * values
pub fn axpy(acc: &mut [f64], weight: f64, values: &[f64]) {
    for (a, v) in acc.iter_mut().zip(values) {
        *a += weight * v;
    }
}

pub fn norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Matrix (given as rows) times vector
pub fn mat_vec(matrix: &[Vec<f64>], vector: &[f64]) -> Vec<f64> {
    matrix
        .iter()
        .map(|row| row.iter().zip(vector).map(|(m, v)| m * v).sum())
        .collect()
}

/// Transposed matrix (given as rows) times vector
pub fn mat_t_vec(matrix: &[Vec<f64>], vector: &[f64]) -> Vec<f64> {
    let cols = matrix.first().map(|row| row.len()).unwrap_or(0);
    let mut out = vec![0.0; cols];
    for (row, &v) in matrix.iter().zip(vector) {
        for (o, m) in out.iter_mut().zip(row) {
            *o += m * v;
        }
    }
    out
}
