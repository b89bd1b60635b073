//! # FJD Metric
//!
//! Orchestration of FID and FJD scoring: an immutable [`FjdConfig`], the
//! [`FjdMetric`] that owns the generator, data sources and embeddings, and
//! [`SharedFjdMetric`] for use across threads.

pub mod config;
pub mod metric;
pub mod shared;

pub use config::{FjdConfig, FjdConfigBuilder};
pub use metric::FjdMetric;
pub use shared::SharedFjdMetric;
