//! Conditional generator wrappers
//!
//! The generative model is opaque: it maps a batch of conditions to a batch
//! of images. [`LatentGenerator`] owns the noise sampling so every call
//! pairs each condition with a freshly drawn latent vector.

use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::marker::PhantomData;

/// Conditioning batch to image batch of equal size
pub trait Generator<C>: Send {
    type Image;

    fn generate(&mut self, conditions: &[C]) -> Result<Vec<Self::Image>>;
}

impl<C, G: Generator<C> + ?Sized> Generator<C> for Box<G> {
    type Image = G::Image;

    fn generate(&mut self, conditions: &[C]) -> Result<Vec<Self::Image>> {
        (**self).generate(conditions)
    }
}

/// Adapter for a closure that already handles its own randomness
pub struct FnGenerator<F, I> {
    f: F,
    _image: PhantomData<fn() -> I>,
}

impl<F, I> FnGenerator<F, I> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _image: PhantomData,
        }
    }
}

impl<C, I, F> Generator<C> for FnGenerator<F, I>
where
    F: FnMut(&[C]) -> Result<Vec<I>> + Send,
{
    type Image = I;

    fn generate(&mut self, conditions: &[C]) -> Result<Vec<I>> {
        (self.f)(conditions)
    }
}

/// Wraps a model `(conditions, noise) -> images` and samples the noise.
///
/// Each condition gets an independent standard-normal latent vector of
/// `latent_dim` entries on every call.
pub struct LatentGenerator<F, I> {
    model: F,
    latent_dim: usize,
    rng: StdRng,
    _image: PhantomData<fn() -> I>,
}

impl<F, I> LatentGenerator<F, I> {
    pub fn new(model: F, latent_dim: usize, seed: u64) -> Self {
        Self {
            model,
            latent_dim,
            rng: StdRng::seed_from_u64(seed),
            _image: PhantomData,
        }
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    fn sample_noise(&mut self, count: usize) -> Vec<Vec<f64>> {
        let dim = self.latent_dim;
        let rng = &mut self.rng;
        (0..count)
            .map(|_| (0..dim).map(|_| rng.sample::<f64, _>(StandardNormal)).collect())
            .collect()
    }
}

impl<C, I, F> Generator<C> for LatentGenerator<F, I>
where
    F: FnMut(&[C], &[Vec<f64>]) -> Result<Vec<I>> + Send,
{
    type Image = I;

    fn generate(&mut self, conditions: &[C]) -> Result<Vec<I>> {
        let noise = self.sample_noise(conditions.len());
        (self.model)(conditions, &noise)
    }
}

/// Run the generator and check that it produced one image per condition
pub fn generate_checked<C, G>(generator: &mut G, conditions: &[C]) -> Result<Vec<G::Image>>
where
    G: Generator<C> + ?Sized,
{
    let images = generator.generate(conditions)?;
    if images.len() != conditions.len() {
        return Err(Error::GeneratorOutputShape {
            expected: conditions.len(),
            actual: images.len(),
        });
    }
    Ok(images)
}
