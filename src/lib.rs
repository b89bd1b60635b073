//! # FJD
//!
//! Fréchet Joint Distance for conditional generative models.
//!
//! FID compares the distribution of generated images with a reference set.
//! FJD compares the *joint* distribution of images and their conditioning
//! (class labels, attributes, captions), so a generator that produces good
//! images for the wrong condition is penalized too. Both are Fréchet
//! distances between Gaussian summaries of embeddings.
//!
//! ## Quick Start
//!
//! ```rust
//! use fjd::prelude::*;
//! use fjd::synthetic::{ClassConditionalGaussian, GeneratorMode};
//!
//! let data = ClassConditionalGaussian::new(3, 4, 4.0, 0.5, 7).unwrap();
//! let mut metric = FjdMetric::new(
//!     FjdConfig::default(),
//!     data.generator(GeneratorMode::Faithful, 1),
//!     VecSource::new(data.sample(60, 2), 32).unwrap(),
//!     VecSource::new(data.sample(60, 3), 32).unwrap(),
//!     IdentityEmbedding::new(4),
//!     OneHotEmbedding::new(3),
//! )
//! .unwrap();
//!
//! let fid = metric.get_fid().unwrap();
//! let fjd = metric.get_fjd(None).unwrap();
//! assert!(fid >= 0.0 && fjd >= 0.0);
//! ```
//!
//! ## Crate Structure
//!
//! - [`fjd-core`](https://docs.rs/fjd-core) - embeddings, data sources, statistics, Fréchet engine
//! - [`fjd-storage`](https://docs.rs/fjd-storage) - reference statistics cache
//! - [`fjd-metric`](https://docs.rs/fjd-metric) - configuration and scoring orchestration

pub mod synthetic;

// Re-export core types
pub use fjd_core::{
    accumulator, default_alpha, validate_alpha, Batch, CyclingSource, DataSource, Embedding,
    EmbeddingPair, Error, FnEmbedding, FnGenerator, FrechetEngine, GaussianStats, Generator,
    IdentityEmbedding, JointStatistics, LatentGenerator, OneHotEmbedding, ProjectionEmbedding,
    RawEmbeddings, Result, RunningMoments, SqrtStrategy, VecSource,
};

// Re-export storage
pub use fjd_storage::{memoize, CacheOutcome, CachePolicy, ReferenceEntry, StatisticsCache};

// Re-export metric
pub use fjd_metric::{FjdConfig, FjdConfigBuilder, FjdMetric, SharedFjdMetric};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        DataSource, Embedding, Error, FjdConfig, FjdMetric, FrechetEngine, GaussianStats,
        Generator, IdentityEmbedding, JointStatistics, OneHotEmbedding, ProjectionEmbedding,
        Result, SharedFjdMetric, SqrtStrategy, VecSource,
    };
}
