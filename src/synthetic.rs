//! Synthetic class-conditional data for demos, tests and benchmarks
//!
//! Each class is an isotropic Gaussian around its own mean. Generators
//! built from the same distribution either respect the requested class or
//! deliberately draw from the wrong one.

use fjd_core::{Error, Generator, LatentGenerator, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Whether a synthetic generator honours its conditioning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorMode {
    /// Images come from the requested class
    Faithful,
    /// Images come from the next class over
    Shuffled,
}

/// Mixture of per-class isotropic Gaussians in image space
#[derive(Debug, Clone)]
pub struct ClassConditionalGaussian {
    means: Vec<Vec<f64>>,
    spread: f64,
}

impl ClassConditionalGaussian {
    /// Class means are drawn from `N(0, separation²)` per coordinate
    pub fn new(classes: usize, image_dim: usize, separation: f64, spread: f64, seed: u64) -> Result<Self> {
        if classes == 0 || image_dim == 0 {
            return Err(Error::InvalidConfig(
                "synthetic data needs at least one class and one image dimension".to_string(),
            ));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let means = (0..classes)
            .map(|_| {
                (0..image_dim)
                    .map(|_| rng.sample::<f64, _>(StandardNormal) * separation)
                    .collect()
            })
            .collect();
        Ok(Self { means, spread })
    }

    pub fn classes(&self) -> usize {
        self.means.len()
    }

    pub fn image_dim(&self) -> usize {
        self.means[0].len()
    }

    pub fn mean(&self, class: usize) -> Option<&[f64]> {
        self.means.get(class).map(Vec::as_slice)
    }

    /// Image for `class` at standard-normal offset `noise`
    pub fn image(&self, class: usize, noise: &[f64]) -> Result<Vec<f64>> {
        let mean = self.mean(class).ok_or(Error::DimensionMismatch {
            expected: self.classes(),
            actual: class + 1,
        })?;
        if noise.len() != mean.len() {
            return Err(Error::DimensionMismatch {
                expected: mean.len(),
                actual: noise.len(),
            });
        }
        Ok(mean.iter().zip(noise).map(|(m, z)| m + self.spread * z).collect())
    }

    /// `(image, label)` pairs, `samples_per_class` for every class, labels interleaved
    pub fn sample(&self, samples_per_class: usize, seed: u64) -> Vec<(Vec<f64>, usize)> {
        let mut rng = StdRng::seed_from_u64(seed);
        let classes = self.classes();
        (0..samples_per_class * classes)
            .map(|i| {
                let class = i % classes;
                let image = self.means[class]
                    .iter()
                    .map(|m| m + self.spread * rng.sample::<f64, _>(StandardNormal))
                    .collect();
                (image, class)
            })
            .collect()
    }

    /// Conditional generator drawing a fresh latent vector per image
    pub fn generator(&self, mode: GeneratorMode, seed: u64) -> impl Generator<usize, Image = Vec<f64>> {
        let data = self.clone();
        let shift = match mode {
            GeneratorMode::Faithful => 0,
            GeneratorMode::Shuffled => 1,
        };
        LatentGenerator::<_, Vec<f64>>::new(
            move |labels: &[usize], noise: &[Vec<f64>]| {
                labels
                    .iter()
                    .zip(noise)
                    .map(|(&label, z)| {
                        if label >= data.classes() {
                            return Err(Error::DimensionMismatch {
                                expected: data.classes(),
                                actual: label + 1,
                            });
                        }
                        data.image((label + shift) % data.classes(), z)
                    })
                    .collect::<Result<Vec<Vec<f64>>>>()
            },
            self.image_dim(),
            seed,
        )
    }
}
