//! Finite, restartable data sources
//!
//! A [`DataSource`] yields one epoch of `(image, condition)` batches and can
//! be restarted. [`CyclingSource`] turns any source into an endless stream:
//! asking for a batch past the end starts a new epoch.

use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// A batch of paired images and conditions
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<I, C> {
    pub images: Vec<I>,
    pub conditions: Vec<C>,
}

impl<I, C> Batch<I, C> {
    pub fn new(images: Vec<I>, conditions: Vec<C>) -> Result<Self> {
        if images.len() != conditions.len() {
            return Err(Error::DimensionMismatch {
                expected: conditions.len(),
                actual: images.len(),
            });
        }
        Ok(Self { images, conditions })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// Finite sequence of batches that can be re-iterated from the start
pub trait DataSource: Send {
    type Image;
    type Condition;

    /// Next batch of the current epoch, `None` once the epoch is exhausted
    fn next_batch(&mut self) -> Option<Batch<Self::Image, Self::Condition>>;

    /// Begin a new epoch
    fn restart(&mut self);

    /// Number of batches in one epoch
    fn num_batches(&self) -> usize;
}

impl<S: DataSource + ?Sized> DataSource for Box<S> {
    type Image = S::Image;
    type Condition = S::Condition;

    fn next_batch(&mut self) -> Option<Batch<Self::Image, Self::Condition>> {
        (**self).next_batch()
    }

    fn restart(&mut self) {
        (**self).restart()
    }

    fn num_batches(&self) -> usize {
        (**self).num_batches()
    }
}

/// In-memory dataset served in fixed-size batches
///
/// With a shuffle seed the sample order is permuted at construction and
/// again on every restart; the permutation sequence is reproducible.
#[derive(Debug, Clone)]
pub struct VecSource<I, C> {
    samples: Vec<(I, C)>,
    batch_size: usize,
    position: usize,
    rng: Option<StdRng>,
}

impl<I, C> VecSource<I, C>
where
    I: Clone + Send,
    C: Clone + Send,
{
    pub fn new(samples: Vec<(I, C)>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".to_string()));
        }
        Ok(Self {
            samples,
            batch_size,
            position: 0,
            rng: None,
        })
    }

    /// Shuffle samples on every epoch using a seeded generator
    pub fn shuffled(mut self, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        self.samples.shuffle(&mut rng);
        self.rng = Some(rng);
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl<I, C> DataSource for VecSource<I, C>
where
    I: Clone + Send,
    C: Clone + Send,
{
    type Image = I;
    type Condition = C;

    fn next_batch(&mut self) -> Option<Batch<I, C>> {
        if self.position >= self.samples.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.samples.len());
        let (images, conditions) = self.samples[self.position..end].iter().cloned().unzip();
        self.position = end;
        Some(Batch { images, conditions })
    }

    fn restart(&mut self) {
        self.position = 0;
        if let Some(rng) = self.rng.as_mut() {
            self.samples.shuffle(rng);
        }
    }

    fn num_batches(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }
}

/// Endless view over a finite source
///
/// Iteration state lives here, so every caller drawing from the same
/// `CyclingSource` advances the same cursor.
#[derive(Debug)]
pub struct CyclingSource<S> {
    inner: S,
    epochs: usize,
}

impl<S: DataSource> CyclingSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, epochs: 0 }
    }

    /// Next batch, restarting the underlying source when it runs dry.
    ///
    /// Only a source that is still empty right after a restart is an error.
    pub fn next_batch(&mut self) -> Result<Batch<S::Image, S::Condition>> {
        if let Some(batch) = self.inner.next_batch() {
            return Ok(batch);
        }
        self.restart();
        self.inner.next_batch().ok_or(Error::EmptySequence)
    }

    /// Rewind to the start of a fresh epoch
    pub fn restart(&mut self) {
        self.inner.restart();
        self.epochs += 1;
    }

    /// Batches per epoch of the underlying source
    pub fn epoch_len(&self) -> usize {
        self.inner.num_batches()
    }

    /// How many times the underlying source has been restarted
    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}
