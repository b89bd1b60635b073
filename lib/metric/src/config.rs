use fjd_core::{validate_alpha, Error, FrechetEngine, Result, SqrtStrategy};
use fjd_storage::CachePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for an [`FjdMetric`](crate::FjdMetric)
///
/// Fixed once the metric is constructed. Build one with [`FjdConfig::builder`]
/// or start from `Default` and set fields directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FjdConfig {
    /// Where reference statistics are cached
    pub reference_stats_path: Option<PathBuf>,
    /// Load reference statistics from `reference_stats_path` when present
    pub use_cache: bool,
    /// Write computed reference statistics to `reference_stats_path`
    pub save_reference_stats: bool,
    /// Generator draws per condition in the generated pass
    pub samples_per_condition: usize,
    /// Use the Newton-Schulz square root instead of eigendecomposition
    pub accelerate: bool,
    /// Fixed alpha; calibrated from the reference embeddings when `None`
    pub alpha: Option<f64>,
    pub newton_schulz_iterations: usize,
    pub newton_schulz_tolerance: f64,
    pub max_regularization_retries: usize,
}

impl Default for FjdConfig {
    fn default() -> Self {
        Self {
            reference_stats_path: None,
            use_cache: true,
            save_reference_stats: false,
            samples_per_condition: 1,
            accelerate: false,
            alpha: None,
            newton_schulz_iterations: 100,
            newton_schulz_tolerance: 1e-4,
            max_regularization_retries: 5,
        }
    }
}

impl FjdConfig {
    pub fn builder() -> FjdConfigBuilder {
        FjdConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.samples_per_condition == 0 {
            return Err(Error::InvalidConfig(
                "samples_per_condition must be at least 1".to_string(),
            ));
        }
        if self.save_reference_stats && self.reference_stats_path.is_none() {
            return Err(Error::InvalidConfig(
                "save_reference_stats requires reference_stats_path".to_string(),
            ));
        }
        if self.newton_schulz_iterations == 0 {
            return Err(Error::InvalidConfig(
                "newton_schulz_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.newton_schulz_tolerance.is_finite() && self.newton_schulz_tolerance > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "newton_schulz_tolerance must be positive, got {}",
                self.newton_schulz_tolerance
            )));
        }
        if let Some(alpha) = self.alpha {
            validate_alpha(alpha)?;
        }
        Ok(())
    }

    pub fn sqrt_strategy(&self) -> SqrtStrategy {
        if self.accelerate {
            SqrtStrategy::NewtonSchulz {
                max_iterations: self.newton_schulz_iterations,
                tolerance: self.newton_schulz_tolerance,
            }
        } else {
            SqrtStrategy::Exact
        }
    }

    pub fn engine(&self) -> FrechetEngine {
        FrechetEngine::new(self.sqrt_strategy()).with_regularization(1e-6, self.max_regularization_retries)
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            path: self.reference_stats_path.clone(),
            use_cache: self.use_cache,
            save: self.save_reference_stats,
        }
    }
}

/// Builder for [`FjdConfig`]
#[derive(Debug, Clone, Default)]
pub struct FjdConfigBuilder {
    config: FjdConfig,
}

impl FjdConfigBuilder {
    pub fn reference_stats_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.reference_stats_path = Some(path.into());
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.config.use_cache = use_cache;
        self
    }

    pub fn save_reference_stats(mut self, save: bool) -> Self {
        self.config.save_reference_stats = save;
        self
    }

    pub fn samples_per_condition(mut self, samples: usize) -> Self {
        self.config.samples_per_condition = samples;
        self
    }

    pub fn accelerate(mut self, accelerate: bool) -> Self {
        self.config.accelerate = accelerate;
        self
    }

    pub fn alpha(mut self, alpha: f64) -> Self {
        self.config.alpha = Some(alpha);
        self
    }

    pub fn newton_schulz(mut self, iterations: usize, tolerance: f64) -> Self {
        self.config.newton_schulz_iterations = iterations;
        self.config.newton_schulz_tolerance = tolerance;
        self
    }

    pub fn max_regularization_retries(mut self, retries: usize) -> Self {
        self.config.max_regularization_retries = retries;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<FjdConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FjdConfig::default();
        assert!(config.use_cache);
        assert!(!config.save_reference_stats);
        assert_eq!(config.samples_per_condition, 1);
        assert_eq!(config.sqrt_strategy(), SqrtStrategy::Exact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = FjdConfig::builder()
            .reference_stats_path("/tmp/reference.stats")
            .save_reference_stats(true)
            .samples_per_condition(4)
            .accelerate(true)
            .newton_schulz(50, 1e-5)
            .alpha(2.5)
            .build()
            .unwrap();
        assert_eq!(config.samples_per_condition, 4);
        assert_eq!(config.alpha, Some(2.5));
        assert_eq!(
            config.sqrt_strategy(),
            SqrtStrategy::NewtonSchulz {
                max_iterations: 50,
                tolerance: 1e-5
            }
        );
        let policy = config.cache_policy();
        assert!(policy.save && policy.use_cache);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(FjdConfig::builder().samples_per_condition(0).build().is_err());
        assert!(FjdConfig::builder().save_reference_stats(true).build().is_err());
        assert!(FjdConfig::builder().newton_schulz(0, 1e-4).build().is_err());
        assert!(FjdConfig::builder().newton_schulz(10, 0.0).build().is_err());
        assert!(matches!(
            FjdConfig::builder().alpha(-1.0).build(),
            Err(Error::InvalidAlpha(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let config = FjdConfig::builder().alpha(0.5).build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: FjdConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
