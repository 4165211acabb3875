//! Dense in-memory embedding matrix with cosine similarity ranking.
//!
//! Rows are stored contiguously in row-major order; row `i` is the embedding
//! of corpus entry `i`. Row norms are computed once at construction since the
//! matrix is never mutated afterwards.

use std::cmp::Ordering;

use rayon::prelude::*;

/// Read-only `[rows, dimensions]` matrix of embeddings.
#[derive(Debug, Clone)]
pub struct EmbeddingMatrix {
    data: Vec<f32>,
    rows: usize,
    dimensions: usize,
    /// L2 norm of each row
    norms: Vec<f32>,
}

/// A row of the matrix paired with its similarity to a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRow {
    /// Positional index of the row (and of the matching corpus entry)
    pub index: usize,
    /// Cosine similarity in [-1.0, 1.0]
    pub score: f32,
}

impl EmbeddingMatrix {
    /// Build a matrix from a flat row-major buffer.
    pub fn new(data: Vec<f32>, rows: usize, dimensions: usize) -> Result<Self, IndexError> {
        let expected = rows
            .checked_mul(dimensions)
            .ok_or(IndexError::Overflow { rows, dimensions })?;

        if data.len() != expected {
            return Err(IndexError::DimensionMismatch {
                expected,
                got: data.len(),
            });
        }

        let norms = if dimensions == 0 {
            vec![0.0; rows]
        } else {
            data.par_chunks_exact(dimensions).map(l2_norm).collect()
        };

        Ok(Self {
            data,
            rows,
            dimensions,
            norms,
        })
    }

    /// Build a matrix from individual row vectors. All rows must share one length.
    #[cfg(test)]
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let count = rows.len();
        let dimensions = rows.first().map(Vec::len).unwrap_or(0);

        let mut data = Vec::with_capacity(count * dimensions);
        for row in rows {
            if row.len() != dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: dimensions,
                    got: row.len(),
                });
            }
            data.extend(row);
        }

        Self::new(data, count, dimensions)
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Embedding dimensionality.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Borrow row `index`.
    ///
    /// # Panics
    /// If `index >= self.rows()`.
    pub fn row(&self, index: usize) -> &[f32] {
        assert!(
            index < self.rows,
            "embedding row {index} out of range (rows: {})",
            self.rows
        );
        let start = index * self.dimensions;
        &self.data[start..start + self.dimensions]
    }

    /// Cosine similarity of `query` against every row, in row order.
    pub fn scores(&self, query: &[f32]) -> Result<Vec<f32>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let query_norm = l2_norm(query);

        Ok((0..self.rows)
            .into_par_iter()
            .map(|i| similarity_with_norms(query, self.row(i), query_norm, self.norms[i]))
            .collect())
    }

    /// Select the `k` rows most similar to `query`, best first.
    ///
    /// Ties on score are broken by the higher row index first.
    pub fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRow>, IndexError> {
        let mut candidates: Vec<ScoredRow> = self
            .scores(query)?
            .into_iter()
            .enumerate()
            .map(|(index, score)| ScoredRow { index, score })
            .collect();

        let k = k.min(candidates.len());
        if k == 0 {
            return Ok(vec![]);
        }

        if k < candidates.len() {
            candidates.select_nth_unstable_by(k - 1, rank_order);
            candidates.truncate(k);
        }
        candidates.sort_unstable_by(rank_order);

        Ok(candidates)
    }
}

/// Descending score, then descending index.
fn rank_order(a: &ScoredRow, b: &ScoredRow) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.index.cmp(&a.index))
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity given precomputed norms.
///
/// Defined as `0.0` when either vector has zero magnitude.
fn similarity_with_norms(a: &[f32], b: &[f32], a_norm: f32, b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let similarity = dot_product / (a_norm * b_norm);
    if similarity.is_nan() {
        return 0.0;
    }

    // adding 0.0 folds -0.0 into 0.0 so equal scores tie under total_cmp
    similarity.clamp(-1.0, 1.0) + 0.0
}

/// Errors that can occur during matrix operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Matrix shape {rows}x{dimensions} overflows")]
    Overflow { rows: usize, dimensions: usize },
}
