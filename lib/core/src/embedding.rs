//! Embedding functions and raw embedding matrices
//!
//! An [`Embedding`] maps a batch of raw items to a batch of fixed-width
//! real vectors. Image and condition embeddings share this one capability
//! interface and are picked at construction time.

use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Batch-to-vector transform with a stable output width
pub trait Embedding<T>: Send {
    /// Width of every vector this embedding produces
    fn dim(&self) -> usize;

    /// Embed a batch of items, one output row per input item
    fn embed(&self, items: &[T]) -> Result<Vec<Vec<f64>>>;
}

/// Row-major `(N, D)` matrix of per-sample embeddings
#[derive(Debug, Clone, PartialEq)]
pub struct RawEmbeddings {
    dim: usize,
    data: Vec<f64>,
}

impl RawEmbeddings {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    /// Build a matrix from rows, rejecting rows whose width is not `dim`
    pub fn from_rows(dim: usize, rows: Vec<Vec<f64>>) -> Result<Self> {
        let mut raw = Self::new(dim);
        raw.push_batch(rows)?;
        Ok(raw)
    }

    /// Append a batch of rows. The whole batch is rejected if any row has
    /// the wrong width.
    pub fn push_batch(&mut self, rows: Vec<Vec<f64>>) -> Result<()> {
        if let Some(bad) = rows.iter().find(|row| row.len() != self.dim) {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                actual: bad.len(),
            });
        }
        self.data.reserve(rows.len() * self.dim);
        for row in rows {
            self.data.extend(row);
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of rows (samples)
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn row(&self, index: usize) -> &[f64] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    pub fn rows(&self) -> std::slice::ChunksExact<'_, f64> {
        self.data.chunks_exact(self.dim.max(1))
    }

    /// Horizontally stack `self` and `other` into `[self | other]`
    pub fn concat(&self, other: &RawEmbeddings) -> Result<RawEmbeddings> {
        if self.len() != other.len() {
            return Err(Error::DimensionMismatch {
                expected: self.len(),
                actual: other.len(),
            });
        }
        let dim = self.dim + other.dim;
        let mut data = Vec::with_capacity(self.len() * dim);
        for (left, right) in self.rows().zip(other.rows()) {
            data.extend_from_slice(left);
            data.extend_from_slice(right);
        }
        Ok(RawEmbeddings { dim, data })
    }

    /// Copy with every entry multiplied by `factor`
    #[must_use]
    pub fn scaled(&self, factor: f64) -> RawEmbeddings {
        RawEmbeddings {
            dim: self.dim,
            data: self.data.iter().map(|x| x * factor).collect(),
        }
    }

    /// Mean of the per-row L2 norms
    pub fn mean_norm(&self) -> Result<f64> {
        if self.is_empty() {
            return Err(Error::EmptySequence);
        }
        let total: f64 = self
            .rows()
            .map(|row| row.iter().map(|x| x * x).sum::<f64>().sqrt())
            .sum();
        Ok(total / self.len() as f64)
    }
}

/// Image and condition embeddings of the same samples, row-aligned
#[derive(Debug, Clone)]
pub struct EmbeddingPair {
    pub image: RawEmbeddings,
    pub condition: RawEmbeddings,
}

impl EmbeddingPair {
    #[must_use]
    pub fn len(&self) -> usize {
        self.image.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    /// `[image | condition]` without any alpha scaling
    pub fn joint(&self) -> Result<RawEmbeddings> {
        self.image.concat(&self.condition)
    }

    /// `[image | alpha * condition]`
    pub fn joint_scaled(&self, alpha: f64) -> Result<RawEmbeddings> {
        self.image.concat(&self.condition.scaled(alpha))
    }
}

/// Categorical condition embedding: label `k` maps to the `k`-th unit vector
#[derive(Debug, Clone, Copy)]
pub struct OneHotEmbedding {
    classes: usize,
}

impl OneHotEmbedding {
    pub fn new(classes: usize) -> Self {
        Self { classes }
    }
}

impl Embedding<usize> for OneHotEmbedding {
    fn dim(&self) -> usize {
        self.classes
    }

    fn embed(&self, items: &[usize]) -> Result<Vec<Vec<f64>>> {
        items
            .iter()
            .map(|&label| {
                if label >= self.classes {
                    return Err(Error::DimensionMismatch {
                        expected: self.classes,
                        actual: label + 1,
                    });
                }
                let mut row = vec![0.0; self.classes];
                row[label] = 1.0;
                Ok(row)
            })
            .collect()
    }
}

/// Pass-through embedding for items that already are feature vectors
#[derive(Debug, Clone, Copy)]
pub struct IdentityEmbedding {
    dim: usize,
}

impl IdentityEmbedding {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Embedding<Vec<f64>> for IdentityEmbedding {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, items: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        Ok(items.to_vec())
    }
}

/// Fixed random feature network: `tanh(W x)` with seeded Gaussian weights.
///
/// Stands in for a pretrained image network when none is available; it is
/// deterministic for a given seed so repeated runs embed identically.
#[derive(Debug, Clone)]
pub struct ProjectionEmbedding {
    input_dim: usize,
    output_dim: usize,
    weights: Vec<f64>,
}

impl ProjectionEmbedding {
    pub fn new(input_dim: usize, output_dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let scale = 1.0 / (input_dim.max(1) as f64).sqrt();
        let weights = (0..input_dim * output_dim)
            .map(|_| rng.sample::<f64, _>(StandardNormal) * scale)
            .collect();
        Self {
            input_dim,
            output_dim,
            weights,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }
}

impl Embedding<Vec<f64>> for ProjectionEmbedding {
    fn dim(&self) -> usize {
        self.output_dim
    }

    fn embed(&self, items: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        items
            .iter()
            .map(|item| {
                if item.len() != self.input_dim {
                    return Err(Error::DimensionMismatch {
                        expected: self.input_dim,
                        actual: item.len(),
                    });
                }
                Ok(self
                    .weights
                    .chunks_exact(self.input_dim.max(1))
                    .map(|w| w.iter().zip(item).map(|(a, b)| a * b).sum::<f64>().tanh())
                    .collect())
            })
            .collect()
    }
}

/// Adapter turning a closure into an [`Embedding`] with a declared width
pub struct FnEmbedding<F> {
    dim: usize,
    f: F,
}

impl<F> FnEmbedding<F> {
    pub fn new(dim: usize, f: F) -> Self {
        Self { dim, f }
    }
}

impl<T, F> Embedding<T> for FnEmbedding<F>
where
    F: Fn(&[T]) -> Result<Vec<Vec<f64>>> + Send,
{
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, items: &[T]) -> Result<Vec<Vec<f64>>> {
        (self.f)(items)
    }
}
