//! # FJD Core
//!
//! Statistics and distance engine behind FID and FJD.
//!
//! This crate provides the building blocks:
//!
//! - [`Embedding`] - batch-to-vector transform with a stable width
//! - [`DataSource`] / [`CyclingSource`] - restartable batch sequences
//! - [`Generator`] - conditional generator wrappers
//! - [`accumulator`] - drives sources and embeddings into raw matrices
//! - [`GaussianStats`] / [`JointStatistics`] - mean and covariance summaries
//! - [`FrechetEngine`] - numerically robust Fréchet distance
//!
//! ## Example
//!
//! ```rust
//! use fjd_core::{
//!     accumulator, CyclingSource, FrechetEngine, IdentityEmbedding, JointStatistics,
//!     OneHotEmbedding, VecSource,
//! };
//!
//! let samples: Vec<(Vec<f64>, usize)> = (0..64)
//!     .map(|i| (vec![(i % 4) as f64, (i % 7) as f64], i % 4))
//!     .collect();
//! let mut source = CyclingSource::new(VecSource::new(samples, 16).unwrap());
//!
//! let pair = accumulator::accumulate_reference(
//!     &mut source,
//!     &IdentityEmbedding::new(2),
//!     &OneHotEmbedding::new(4),
//! )
//! .unwrap();
//! let stats = JointStatistics::from_pair(&pair).unwrap();
//!
//! let engine = FrechetEngine::default();
//! assert!(engine.fjd(&stats, &stats, 1.0).unwrap() < 1e-6);
//! ```

pub mod accumulator;
pub mod alpha;
pub mod embedding;
pub mod error;
pub mod frechet;
pub mod generator;
pub mod source;
pub mod statistics;

pub use alpha::{default_alpha, validate_alpha};
pub use embedding::{
    Embedding, EmbeddingPair, FnEmbedding, IdentityEmbedding, OneHotEmbedding, ProjectionEmbedding,
    RawEmbeddings,
};
pub use error::{Error, Result};
pub use frechet::{FrechetEngine, SqrtStrategy};
pub use generator::{FnGenerator, Generator, LatentGenerator};
pub use source::{Batch, CyclingSource, DataSource, VecSource};
pub use statistics::{GaussianStats, JointStatistics, RunningMoments};
