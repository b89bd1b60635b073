//! Fréchet distance between Gaussian summaries
//!
//! d² = |μa - μb|² + Tr(Ca) + Tr(Cb) - 2 Tr(√(Ca Cb))
//!
//! The product Ca Cb is not symmetric, so the exact path works on the
//! similar matrix √Ca Cb √Ca, which is symmetric PSD and has the same
//! eigenvalues. Rounding can still push eigenvalues slightly below zero;
//! they are clipped before the square root.
//!
//! The accelerated path runs a coupled Newton-Schulz iteration on Ca Cb
//! directly (matrix products only). Its result is verified against the
//! input and the exact path takes over when it did not converge.

use crate::alpha::validate_alpha;
use crate::statistics::{GaussianStats, JointStatistics};
use crate::{Error, Result};
use nalgebra::{DMatrix, DVector, Dyn, SymmetricEigen};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Eigen solver sweeps allowed per matrix dimension
const EIGEN_SWEEPS_PER_DIM: usize = 100;

/// `|ZY - I|_F` below which Newton-Schulz stops early
const NEWTON_SCHULZ_CONVERGED: f64 = 1e-10;

/// How the square root of the covariance product is computed
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum SqrtStrategy {
    /// Symmetric eigendecomposition
    #[default]
    Exact,
    /// Coupled Newton-Schulz iteration with a residual check
    NewtonSchulz { max_iterations: usize, tolerance: f64 },
}

/// Fréchet distance calculator with bounded ε·I regularization
#[derive(Debug, Clone, Copy)]
pub struct FrechetEngine {
    strategy: SqrtStrategy,
    initial_epsilon: f64,
    max_retries: usize,
}

impl Default for FrechetEngine {
    fn default() -> Self {
        Self {
            strategy: SqrtStrategy::Exact,
            initial_epsilon: 1e-6,
            max_retries: 5,
        }
    }
}

impl FrechetEngine {
    pub fn new(strategy: SqrtStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Regularization schedule: ε = initial, 10·initial, ... for `max_retries` retries
    pub fn with_regularization(mut self, initial_epsilon: f64, max_retries: usize) -> Self {
        self.initial_epsilon = initial_epsilon;
        self.max_retries = max_retries;
        self
    }

    pub fn strategy(&self) -> SqrtStrategy {
        self.strategy
    }

    /// Squared Fréchet distance between two Gaussian summaries
    pub fn distance(&self, a: &GaussianStats, b: &GaussianStats) -> Result<f64> {
        if a.dim() != b.dim() {
            return Err(Error::DimensionMismatch {
                expected: a.dim(),
                actual: b.dim(),
            });
        }
        if !is_finite(a) || !is_finite(b) {
            return Err(Error::FrechetComputation {
                attempts: 0,
                reason: "statistics contain non-finite values".to_string(),
            });
        }

        let mean_term = (&a.mean - &b.mean).norm_squared();
        let trace_term = a.covariance.trace() + b.covariance.trace();
        let trace_sqrt = self.regularized(&a.covariance, &b.covariance, |ca, cb| {
            self.trace_sqrt_product(ca, cb)
        })?;

        Ok((mean_term + trace_term - 2.0 * trace_sqrt).max(0.0))
    }

    /// Distance between the image-only blocks
    pub fn fid(&self, reference: &JointStatistics, generated: &JointStatistics) -> Result<f64> {
        self.distance(&reference.image_only(), &generated.image_only())
    }

    /// Distance between joint statistics with the condition block scaled by `alpha`
    pub fn fjd(&self, reference: &JointStatistics, generated: &JointStatistics, alpha: f64) -> Result<f64> {
        let alpha = validate_alpha(alpha)?;
        if reference.image_dim() != generated.image_dim() {
            return Err(Error::DimensionMismatch {
                expected: reference.image_dim(),
                actual: generated.image_dim(),
            });
        }
        self.distance(&reference.scaled(alpha), &generated.scaled(alpha))
    }

    fn trace_sqrt_product(&self, ca: &DMatrix<f64>, cb: &DMatrix<f64>) -> Result<f64> {
        match self.strategy {
            SqrtStrategy::Exact => exact_trace_sqrt(ca, cb),
            SqrtStrategy::NewtonSchulz {
                max_iterations,
                tolerance,
            } => match newton_schulz_sqrt(&(ca * cb), max_iterations, tolerance) {
                Ok(root) => Ok(root.trace()),
                Err(Error::NewtonSchulzDivergence { iterations, residual }) => {
                    warn!(
                        "Newton-Schulz did not converge ({} iterations, residual {:e}), using eigendecomposition",
                        iterations, residual
                    );
                    exact_trace_sqrt(ca, cb)
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Run `root` on the covariances, retrying with growing ε·I on failure
    fn regularized<F>(&self, ca: &DMatrix<f64>, cb: &DMatrix<f64>, mut root: F) -> Result<f64>
    where
        F: FnMut(&DMatrix<f64>, &DMatrix<f64>) -> Result<f64>,
    {
        let dim = ca.nrows();
        let mut reason = String::new();

        for attempt in 0..=self.max_retries {
            let outcome = if attempt == 0 {
                root(ca, cb)
            } else {
                let epsilon = self.initial_epsilon * 10f64.powi(attempt as i32 - 1);
                let offset = DMatrix::<f64>::identity(dim, dim) * epsilon;
                debug!("retrying matrix square root with epsilon {:e}", epsilon);
                root(&(ca + &offset), &(cb + &offset))
            };

            match outcome {
                Ok(value) if value.is_finite() => {
                    if attempt > 0 {
                        warn!("matrix square root needed {} regularization retries", attempt);
                    }
                    return Ok(value);
                }
                Ok(value) => reason = format!("non-finite trace {}", value),
                Err(e) => reason = e.to_string(),
            }
        }

        Err(Error::FrechetComputation {
            attempts: self.max_retries + 1,
            reason,
        })
    }
}

fn is_finite(stats: &GaussianStats) -> bool {
    stats.mean.iter().all(|x| x.is_finite()) && stats.covariance.iter().all(|x| x.is_finite())
}

fn symmetric_eigen(m: DMatrix<f64>) -> Result<SymmetricEigen<f64, Dyn>> {
    let dim = m.nrows();
    let symmetric = (&m + m.transpose()) * 0.5;
    SymmetricEigen::try_new(symmetric, f64::EPSILON, EIGEN_SWEEPS_PER_DIM * dim.max(1)).ok_or_else(|| {
        Error::FrechetComputation {
            attempts: 1,
            reason: "eigendecomposition did not converge".to_string(),
        }
    })
}

/// Square roots of eigenvalues, with negative and rounding-level values set to zero
fn clipped_roots(eigenvalues: &DVector<f64>) -> DVector<f64> {
    let largest = eigenvalues.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    let floor = eigenvalues.len() as f64 * f64::EPSILON * largest;
    eigenvalues.map(|v| if v > floor { v.sqrt() } else { 0.0 })
}

/// Principal square root of a symmetric PSD matrix
pub fn psd_sqrt(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let eigen = symmetric_eigen(m.clone())?;
    let roots = clipped_roots(&eigen.eigenvalues);
    let vectors = &eigen.eigenvectors;
    Ok(vectors * DMatrix::from_diagonal(&roots) * vectors.transpose())
}

/// Tr(√(Ca Cb)) through the symmetric form √Ca Cb √Ca
pub fn exact_trace_sqrt(ca: &DMatrix<f64>, cb: &DMatrix<f64>) -> Result<f64> {
    let sqrt_a = psd_sqrt(ca)?;
    let inner = &sqrt_a * cb * &sqrt_a;
    let eigen = symmetric_eigen(inner)?;
    Ok(clipped_roots(&eigen.eigenvalues).sum())
}

/// Square root of `p` by the coupled Newton-Schulz iteration
///
/// Fails with [`Error::NewtonSchulzDivergence`] when the relative residual
/// `|S² - P|_F / |P|_F` is above `tolerance` after the iteration cap.
pub fn newton_schulz_sqrt(p: &DMatrix<f64>, max_iterations: usize, tolerance: f64) -> Result<DMatrix<f64>> {
    let dim = p.nrows();
    let norm = p.norm();
    if norm == 0.0 {
        return Ok(DMatrix::zeros(dim, dim));
    }
    if !norm.is_finite() {
        return Err(Error::NewtonSchulzDivergence {
            iterations: 0,
            residual: f64::INFINITY,
        });
    }

    let identity = DMatrix::<f64>::identity(dim, dim);
    let mut y = p / norm;
    let mut z = identity.clone();
    let mut iterations = 0;
    while iterations < max_iterations {
        let zy = &z * &y;
        if (&zy - &identity).norm() < NEWTON_SCHULZ_CONVERGED {
            break;
        }
        let t = (&identity * 3.0 - zy) * 0.5;
        y = &y * &t;
        z = &t * &z;
        iterations += 1;
    }

    let root = y * norm.sqrt();
    let residual = (&root * &root - p).norm() / norm;
    if !residual.is_finite() || residual > tolerance {
        return Err(Error::NewtonSchulzDivergence { iterations, residual });
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingPair, RawEmbeddings};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_stats(dim: usize, seed: u64) -> GaussianStats {
        let mut rng = StdRng::seed_from_u64(seed);
        let a = DMatrix::from_fn(dim, dim, |_, _| rng.random_range(-1.0..1.0));
        let covariance = &a * a.transpose() + DMatrix::identity(dim, dim) * 0.5;
        let mean = DVector::from_fn(dim, |_, _| rng.random_range(-2.0..2.0));
        GaussianStats::new(mean, covariance, 100).unwrap()
    }

    fn diagonal(mean: &[f64], variances: &[f64]) -> GaussianStats {
        GaussianStats::new(
            DVector::from_column_slice(mean),
            DMatrix::from_diagonal(&DVector::from_column_slice(variances)),
            10,
        )
        .unwrap()
    }

    fn newton_schulz() -> FrechetEngine {
        FrechetEngine::new(SqrtStrategy::NewtonSchulz {
            max_iterations: 100,
            tolerance: 1e-4,
        })
    }

    #[test]
    fn test_identity() {
        let stats = random_stats(6, 1);
        assert!(FrechetEngine::default().distance(&stats, &stats).unwrap() < 1e-6);
        assert!(newton_schulz().distance(&stats, &stats).unwrap() < 1e-6);
    }

    #[test]
    fn test_symmetry() {
        let a = random_stats(5, 2);
        let b = random_stats(5, 3);
        let engine = FrechetEngine::default();
        let ab = engine.distance(&a, &b).unwrap();
        let ba = engine.distance(&b, &a).unwrap();
        assert!((ab - ba).abs() <= 1e-9 * ab.max(1.0));
    }

    #[test]
    fn test_closed_form_diagonal() {
        // (√σa - √σb)² per axis plus squared mean offset
        let a = diagonal(&[0.0, 1.0], &[4.0, 1.0]);
        let b = diagonal(&[1.0, 1.0], &[9.0, 16.0]);
        let expected = 1.0 + (2.0f64 - 3.0).powi(2) + (1.0f64 - 4.0).powi(2);
        let d = FrechetEngine::default().distance(&a, &b).unwrap();
        assert!((d - expected).abs() < 1e-9, "{} vs {}", d, expected);
        let d = newton_schulz().distance(&a, &b).unwrap();
        assert!((d - expected).abs() < 1e-6, "{} vs {}", d, expected);
    }

    #[test]
    fn test_singular_covariances() {
        let a = diagonal(&[0.0, 0.0], &[1.0, 0.0]);
        let b = diagonal(&[0.0, 0.0], &[4.0, 0.0]);
        let d = FrechetEngine::default().distance(&a, &b).unwrap();
        assert!((d - 1.0).abs() < 1e-6);
        let d = newton_schulz().distance(&a, &b).unwrap();
        assert!((d - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_strategies_agree() {
        let a = random_stats(8, 4);
        let b = random_stats(8, 5);
        let exact = FrechetEngine::default().distance(&a, &b).unwrap();
        let fast = newton_schulz().distance(&a, &b).unwrap();
        assert!((exact - fast).abs() <= 1e-6 * exact.max(1.0), "{} vs {}", exact, fast);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = FrechetEngine::default()
            .distance(&random_stats(3, 1), &random_stats(4, 1))
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 4 }));
    }

    #[test]
    fn test_non_finite_statistics() {
        let mut bad = random_stats(3, 6);
        bad.covariance[(1, 1)] = f64::NAN;
        let err = FrechetEngine::default().distance(&bad, &random_stats(3, 7)).unwrap_err();
        assert!(matches!(err, Error::FrechetComputation { .. }));
    }

    #[test]
    fn test_newton_schulz_reports_divergence() {
        let stats = random_stats(4, 8);
        let p = &stats.covariance * &stats.covariance;
        let err = newton_schulz_sqrt(&p, 1, 1e-8).unwrap_err();
        assert!(matches!(err, Error::NewtonSchulzDivergence { iterations: 1, .. }));

        let root = newton_schulz_sqrt(&p, 100, 1e-8).unwrap();
        assert!((&root - &stats.covariance).norm() < 1e-6);
    }

    #[test]
    fn test_divergent_newton_schulz_falls_back() {
        let a = random_stats(5, 9);
        let b = random_stats(5, 10);
        let starved = FrechetEngine::new(SqrtStrategy::NewtonSchulz {
            max_iterations: 1,
            tolerance: 1e-10,
        });
        let exact = FrechetEngine::default().distance(&a, &b).unwrap();
        let fallback = starved.distance(&a, &b).unwrap();
        assert!((exact - fallback).abs() <= 1e-9 * exact.max(1.0));
    }

    #[test]
    fn test_regularization_retries() {
        let engine = FrechetEngine::default();
        let c = DMatrix::<f64>::identity(2, 2);
        let mut seen = Vec::new();
        let value = engine
            .regularized(&c, &c, |ca, _| {
                let epsilon = ca[(0, 0)] - 1.0;
                seen.push(epsilon);
                if epsilon < 5e-6 {
                    Err(Error::FrechetComputation {
                        attempts: 1,
                        reason: "ill-conditioned".to_string(),
                    })
                } else {
                    Ok(2.0)
                }
            })
            .unwrap();
        assert_eq!(value, 2.0);
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], 0.0);

        let err = engine
            .regularized(&c, &c, |_, _| Ok(f64::NAN))
            .unwrap_err();
        assert!(matches!(err, Error::FrechetComputation { attempts: 6, .. }));
    }

    #[test]
    fn test_fjd_alpha_zero_equals_fid() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut rows = |n: usize, dim: usize, shift: f64| -> RawEmbeddings {
            let data: Vec<Vec<f64>> = (0..n)
                .map(|_| (0..dim).map(|_| shift + rng.random_range(-1.0..1.0)).collect())
                .collect();
            RawEmbeddings::from_rows(dim, data).unwrap()
        };
        let reference = JointStatistics::from_pair(&EmbeddingPair {
            image: rows(400, 4, 0.0),
            condition: rows(400, 3, 0.5),
        })
        .unwrap();
        let generated = JointStatistics::from_pair(&EmbeddingPair {
            image: rows(400, 4, 0.2),
            condition: rows(400, 3, 0.0),
        })
        .unwrap();

        let engine = FrechetEngine::default();
        let fid = engine.fid(&reference, &generated).unwrap();
        let fjd = engine.fjd(&reference, &generated, 0.0).unwrap();
        assert!((fid - fjd).abs() <= 1e-7 * fid.max(1.0), "{} vs {}", fid, fjd);
        assert!(engine.fjd(&reference, &generated, 1.0).unwrap() > fid);
        assert!(matches!(
            engine.fjd(&reference, &generated, -1.0),
            Err(Error::InvalidAlpha(_))
        ));
    }
}
