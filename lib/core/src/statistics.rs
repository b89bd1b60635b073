//! Gaussian summaries of embedding distributions
//!
//! [`GaussianStats::from_embeddings`] reduces a raw `(N, D)` matrix to its
//! mean and unbiased covariance. Rows are split into chunks that are reduced
//! in parallel (two-pass inside each chunk) and merged pairwise, which keeps
//! the result within rounding of a direct two-pass computation.

use crate::embedding::{EmbeddingPair, RawEmbeddings};
use crate::{Error, Result};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

/// Rows per parallel reduction chunk
const CHUNK_ROWS: usize = 512;

/// Mean, covariance and sample count of a distribution in embedding space
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianStats {
    pub mean: DVector<f64>,
    pub covariance: DMatrix<f64>,
    pub count: usize,
}

impl GaussianStats {
    pub fn new(mean: DVector<f64>, covariance: DMatrix<f64>, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(Error::EmptySequence);
        }
        if covariance.nrows() != mean.len() || covariance.ncols() != mean.len() {
            return Err(Error::DimensionMismatch {
                expected: mean.len(),
                actual: covariance.nrows().max(covariance.ncols()),
            });
        }
        Ok(Self {
            mean,
            covariance,
            count,
        })
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Reduce raw embeddings to their Gaussian summary
    pub fn from_embeddings(raw: &RawEmbeddings) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::EmptySequence);
        }
        let dim = raw.dim();
        raw.as_slice()
            .par_chunks(CHUNK_ROWS * dim)
            .map(|chunk| RunningMoments::from_chunk(dim, chunk))
            .reduce_with(|a, b| a.merge(&b))
            .ok_or(Error::EmptySequence)?
            .finish()
    }
}

/// Streaming first and second moments
///
/// Supports single-row updates (Welford) and merging of partial results
/// (Chan et al.), so moments can be built incrementally or in parallel.
#[derive(Debug, Clone)]
pub struct RunningMoments {
    count: usize,
    mean: DVector<f64>,
    m2: DMatrix<f64>,
}

impl RunningMoments {
    pub fn new(dim: usize) -> Self {
        Self {
            count: 0,
            mean: DVector::zeros(dim),
            m2: DMatrix::zeros(dim, dim),
        }
    }

    /// Two-pass moments of a contiguous row-major block
    pub fn from_chunk(dim: usize, chunk: &[f64]) -> Self {
        let rows = chunk.len() / dim;
        let mut centered = DMatrix::from_row_slice(rows, dim, chunk);
        let mean = centered.row_mean().transpose();
        for (j, mut column) in centered.column_iter_mut().enumerate() {
            column.add_scalar_mut(-mean[j]);
        }
        let m2 = centered.tr_mul(&centered);
        Self {
            count: rows,
            mean,
            m2,
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Fold one sample into the running moments
    pub fn update(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                actual: row.len(),
            });
        }
        let x = DVector::from_column_slice(row);
        self.count += 1;
        let delta = &x - &self.mean;
        self.mean += &delta / self.count as f64;
        let delta_after = &x - &self.mean;
        self.m2 += &delta * delta_after.transpose();
        Ok(())
    }

    /// Combine the moments of two disjoint sample sets
    #[must_use]
    pub fn merge(&self, other: &RunningMoments) -> RunningMoments {
        if other.count == 0 {
            return self.clone();
        }
        if self.count == 0 {
            return other.clone();
        }
        let (na, nb) = (self.count as f64, other.count as f64);
        let n = na + nb;
        let delta = &other.mean - &self.mean;
        let mean = &self.mean + &delta * (nb / n);
        let m2 = &self.m2 + &other.m2 + (&delta * delta.transpose()) * (na * nb / n);
        RunningMoments {
            count: self.count + other.count,
            mean,
            m2,
        }
    }

    /// Unbiased covariance (`N - 1`); a single sample has zero covariance
    pub fn finish(&self) -> Result<GaussianStats> {
        if self.count == 0 {
            return Err(Error::EmptySequence);
        }
        let covariance = if self.count > 1 {
            let cov = &self.m2 / (self.count - 1) as f64;
            (&cov + cov.transpose()) * 0.5
        } else {
            DMatrix::zeros(self.dim(), self.dim())
        };
        GaussianStats::new(self.mean.clone(), covariance, self.count)
    }
}

/// Unscaled statistics of `[image | condition]` embeddings
///
/// Keeping the condition block unscaled lets any alpha be applied later by
/// rescaling blocks instead of recomputing from raw embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct JointStatistics {
    stats: GaussianStats,
    image_dim: usize,
    condition_dim: usize,
}

impl JointStatistics {
    pub fn from_parts(stats: GaussianStats, image_dim: usize, condition_dim: usize) -> Result<Self> {
        if stats.dim() != image_dim + condition_dim {
            return Err(Error::DimensionMismatch {
                expected: image_dim + condition_dim,
                actual: stats.dim(),
            });
        }
        Ok(Self {
            stats,
            image_dim,
            condition_dim,
        })
    }

    pub fn from_pair(pair: &EmbeddingPair) -> Result<Self> {
        let stats = GaussianStats::from_embeddings(&pair.joint()?)?;
        Self::from_parts(stats, pair.image.dim(), pair.condition.dim())
    }

    #[inline]
    pub fn image_dim(&self) -> usize {
        self.image_dim
    }

    #[inline]
    pub fn condition_dim(&self) -> usize {
        self.condition_dim
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.stats.count
    }

    /// Unscaled joint statistics (alpha = 1)
    pub fn joint(&self) -> &GaussianStats {
        &self.stats
    }

    pub fn image_only(&self) -> GaussianStats {
        self.block(0, self.image_dim)
    }

    pub fn condition_only(&self) -> GaussianStats {
        self.block(self.image_dim, self.condition_dim)
    }

    /// Image-by-condition block of the joint covariance
    pub fn cross_covariance(&self) -> DMatrix<f64> {
        self.stats
            .covariance
            .view((0, self.image_dim), (self.image_dim, self.condition_dim))
            .into_owned()
    }

    /// Joint statistics with the condition embedding scaled by `alpha`
    ///
    /// Condition mean entries scale by alpha, the condition covariance block
    /// by alpha squared and the cross blocks by alpha.
    pub fn scaled(&self, alpha: f64) -> GaussianStats {
        let dim = self.stats.dim();
        let factor = |i: usize| if i < self.image_dim { 1.0 } else { alpha };

        let mean = DVector::from_fn(dim, |i, _| self.stats.mean[i] * factor(i));
        let covariance =
            DMatrix::from_fn(dim, dim, |i, j| self.stats.covariance[(i, j)] * factor(i) * factor(j));
        GaussianStats {
            mean,
            covariance,
            count: self.stats.count,
        }
    }

    fn block(&self, start: usize, len: usize) -> GaussianStats {
        GaussianStats {
            mean: self.stats.mean.rows(start, len).into_owned(),
            covariance: self.stats.covariance.view((start, start), (len, len)).into_owned(),
            count: self.stats.count,
        }
    }
}
