//! Reflexive-transitive closures of the grammar's one-step relations.
//!
//! The left-corner relation R_L and the unit-production relation R_U are
//! square matrices over the grammar's non-terminals. Their closures
//! R* = I + R + R² + … = (I − R)⁻¹ are what keep prediction and completion
//! finite under recursive and cyclic rules: a single closure entry stands
//! for the summed mass of an unbounded family of derivation chains.

use crate::semiring::Semiring;

/// Pivots smaller than this make (I − R) effectively singular.
const PIVOT_EPSILON: f64 = 1e-12;

/// Entries this far below zero indicate super-stochastic cycle mass;
/// anything closer to zero is inversion noise and is clamped.
const NEGATIVE_TOLERANCE: f64 = -1e-9;

/// Why a closure does not exist; rendered into
/// [`crate::Error::GrammarNotConvergent`] by the grammar builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Divergence {
    /// (I − R) is singular: some cycle carries probability mass exactly 1.
    Singular,
    /// The inverse has negative (or non-finite) entries: some cycle carries
    /// probability mass above 1.
    ExcessMass,
}

/// A closure matrix over non-terminal ids, stored densely. Each entry is
/// kept both as a probability and encoded under the grammar's semiring,
/// and each row remembers its non-zero columns for cheap enumeration.
#[derive(Debug, Clone)]
pub(crate) struct ClosureMatrix {
    size: usize,
    probabilities: Vec<f64>,
    scores: Vec<f64>,
    nonzero_columns: Vec<Vec<usize>>,
}

impl ClosureMatrix {
    pub fn probability(&self, row: usize, column: usize) -> f64 {
        self.probabilities[row * self.size + column]
    }

    pub fn score(&self, row: usize, column: usize) -> f64 {
        self.scores[row * self.size + column]
    }

    /// Columns `y` with a non-zero entry `(row, y)`, in ascending order.
    pub fn nonzero_columns(&self, row: usize) -> &[usize] {
        &self.nonzero_columns[row]
    }
}

/// Compute R* = (I − R)⁻¹ from the dense one-step matrix `one_step`
/// (row-major, `size` × `size`, probability space) by Gauss–Jordan
/// elimination, then encode the entries under `semiring`.
pub(crate) fn star_closure(
    one_step: &[f64],
    size: usize,
    semiring: Semiring,
) -> Result<ClosureMatrix, Divergence> {
    debug_assert_eq!(one_step.len(), size * size);

    // a = I - R, inverse starts as I and receives the same row operations.
    let mut a = vec![0.0; size * size];
    let mut inverse = vec![0.0; size * size];
    for row in 0..size {
        for column in 0..size {
            let identity = if row == column { 1.0 } else { 0.0 };
            a[row * size + column] = identity - one_step[row * size + column];
        }
        inverse[row * size + row] = 1.0;
    }

    for column in 0..size {
        let pivot_row = (column..size)
            .max_by(|&r, &s| {
                a[r * size + column]
                    .abs()
                    .total_cmp(&a[s * size + column].abs())
            })
            .expect("pivot search over a non-empty row range");
        if a[pivot_row * size + column].abs() <= PIVOT_EPSILON {
            return Err(Divergence::Singular);
        }
        if pivot_row != column {
            swap_rows(&mut a, size, pivot_row, column);
            swap_rows(&mut inverse, size, pivot_row, column);
        }

        let pivot = a[column * size + column];
        for k in 0..size {
            a[column * size + k] /= pivot;
            inverse[column * size + k] /= pivot;
        }

        for row in 0..size {
            if row == column {
                continue;
            }
            let factor = a[row * size + column];
            if factor == 0.0 {
                continue;
            }
            for k in 0..size {
                a[row * size + k] -= factor * a[column * size + k];
                inverse[row * size + k] -= factor * inverse[column * size + k];
            }
        }
    }

    let mut probabilities = inverse;
    for entry in &mut probabilities {
        if !entry.is_finite() || *entry < NEGATIVE_TOLERANCE {
            return Err(Divergence::ExcessMass);
        }
        if *entry < 0.0 {
            *entry = 0.0;
        }
    }

    let scores = probabilities
        .iter()
        .map(|&probability| semiring.from_probability(probability))
        .collect();
    let nonzero_columns = (0..size)
        .map(|row| {
            (0..size)
                .filter(|&column| probabilities[row * size + column] > 0.0)
                .collect()
        })
        .collect();

    Ok(ClosureMatrix {
        size,
        probabilities,
        scores,
        nonzero_columns,
    })
}

fn swap_rows(matrix: &mut [f64], size: usize, row: usize, other: usize) {
    for k in 0..size {
        matrix.swap(row * size + k, other * size + k);
    }
}
