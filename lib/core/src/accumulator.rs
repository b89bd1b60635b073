//! Embedding accumulation over data sources
//!
//! Drives a source (and for the generated side, a generator) batch by batch
//! and collects row-aligned image and condition embeddings. Widths are
//! checked on every batch so a misbehaving embedding fails at the batch
//! that produced the wrong shape.

use crate::embedding::{Embedding, EmbeddingPair, RawEmbeddings};
use crate::generator::{generate_checked, Generator};
use crate::source::{CyclingSource, DataSource};
use crate::{Error, Result};
use tracing::debug;

fn embed_into<T, E>(embedding: &E, items: &[T], target: &mut RawEmbeddings) -> Result<()>
where
    E: Embedding<T> + ?Sized,
{
    let rows = embedding.embed(items)?;
    if rows.len() != items.len() {
        return Err(Error::DimensionMismatch {
            expected: items.len(),
            actual: rows.len(),
        });
    }
    target.push_batch(rows)
}

fn checked_dim(dim: usize) -> Result<usize> {
    if dim == 0 {
        return Err(Error::InvalidConfig("embedding width must be at least 1".to_string()));
    }
    Ok(dim)
}

/// Embed exactly one epoch of the reference source, from its start
pub fn accumulate_reference<S, IE, CE>(
    source: &mut CyclingSource<S>,
    image_embedding: &IE,
    condition_embedding: &CE,
) -> Result<EmbeddingPair>
where
    S: DataSource,
    IE: Embedding<S::Image> + ?Sized,
    CE: Embedding<S::Condition> + ?Sized,
{
    let mut image = RawEmbeddings::new(checked_dim(image_embedding.dim())?);
    let mut condition = RawEmbeddings::new(checked_dim(condition_embedding.dim())?);

    source.restart();
    let batches = source.epoch_len();
    for index in 0..batches {
        let batch = source.next_batch()?;
        embed_into(image_embedding, &batch.images, &mut image)?;
        embed_into(condition_embedding, &batch.conditions, &mut condition)?;
        debug!("reference batch {}/{}: {} samples", index + 1, batches, batch.len());
    }

    if image.is_empty() {
        return Err(Error::EmptySequence);
    }
    Ok(EmbeddingPair { image, condition })
}

/// Embed generator output for one epoch of the condition source
///
/// Every condition batch is sent through the generator
/// `samples_per_condition` times, so the result has
/// `samples_per_condition * source size` rows. The condition source keeps
/// its cursor between calls.
pub fn accumulate_generated<S, G, IE, CE>(
    conditions: &mut CyclingSource<S>,
    generator: &mut G,
    image_embedding: &IE,
    condition_embedding: &CE,
    samples_per_condition: usize,
) -> Result<EmbeddingPair>
where
    S: DataSource,
    G: Generator<S::Condition> + ?Sized,
    IE: Embedding<G::Image> + ?Sized,
    CE: Embedding<S::Condition> + ?Sized,
{
    if samples_per_condition == 0 {
        return Err(Error::InvalidConfig(
            "samples_per_condition must be at least 1".to_string(),
        ));
    }
    let mut image = RawEmbeddings::new(checked_dim(image_embedding.dim())?);
    let mut condition = RawEmbeddings::new(checked_dim(condition_embedding.dim())?);

    let batches = conditions.epoch_len();
    for index in 0..batches {
        let batch = conditions.next_batch()?;
        for _ in 0..samples_per_condition {
            let images = generate_checked(generator, &batch.conditions)?;
            embed_into(image_embedding, &images, &mut image)?;
            embed_into(condition_embedding, &batch.conditions, &mut condition)?;
        }
        debug!(
            "generated batch {}/{}: {} conditions x {}",
            index + 1,
            batches,
            batch.len(),
            samples_per_condition
        );
    }

    if image.is_empty() {
        return Err(Error::EmptySequence);
    }
    Ok(EmbeddingPair { image, condition })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{FnEmbedding, IdentityEmbedding, OneHotEmbedding};
    use crate::generator::FnGenerator;
    use crate::source::VecSource;
    use crate::statistics::GaussianStats;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dataset(n: usize) -> Vec<(Vec<f64>, usize)> {
        (0..n).map(|i| (vec![i as f64, (i * i) as f64 * 0.1], i % 3)).collect()
    }

    #[test]
    fn test_reference_pass_collects_all_samples() {
        let mut source = CyclingSource::new(VecSource::new(dataset(10), 4).unwrap());
        let pair = accumulate_reference(&mut source, &IdentityEmbedding::new(2), &OneHotEmbedding::new(3)).unwrap();
        assert_eq!(pair.len(), 10);
        assert_eq!(pair.image.dim(), 2);
        assert_eq!(pair.condition.dim(), 3);
        assert_eq!(pair.condition.row(4), &[0.0, 1.0, 0.0]);

        // a second pass starts from the beginning again
        let again = accumulate_reference(&mut source, &IdentityEmbedding::new(2), &OneHotEmbedding::new(3)).unwrap();
        assert_eq!(again.image, pair.image);
    }

    #[test]
    fn test_generated_pass_repeats_conditions() {
        let mut conditions = CyclingSource::new(VecSource::new(dataset(7), 3).unwrap());
        let mut generator = FnGenerator::new(|conds: &[usize]| {
            Ok::<_, Error>(conds.iter().map(|&c| vec![c as f64, 1.0]).collect::<Vec<Vec<f64>>>())
        });
        let pair = accumulate_generated(
            &mut conditions,
            &mut generator,
            &IdentityEmbedding::new(2),
            &OneHotEmbedding::new(3),
            3,
        )
        .unwrap();
        assert_eq!(pair.len(), 21);
        assert_eq!(pair.condition.len(), 21);
        // image and condition rows stay aligned
        for (image, condition) in pair.image.rows().zip(pair.condition.rows()) {
            assert_eq!(condition[image[0] as usize], 1.0);
        }
    }

    #[test]
    fn test_generated_pass_matches_two_pass_moments() {
        let mut conditions = CyclingSource::new(VecSource::new(dataset(50), 8).unwrap());
        let mut generator = FnGenerator::new(|conds: &[usize]| {
            Ok::<_, Error>(conds.iter().map(|&c| vec![c as f64 * 2.0, 5.0 - c as f64]).collect::<Vec<Vec<f64>>>())
        });
        let pair = accumulate_generated(
            &mut conditions,
            &mut generator,
            &IdentityEmbedding::new(2),
            &OneHotEmbedding::new(3),
            1,
        )
        .unwrap();
        let stats = GaussianStats::from_embeddings(&pair.image).unwrap();
        let n = pair.len() as f64;
        let mean0: f64 = pair.image.rows().map(|r| r[0]).sum::<f64>() / n;
        let var0: f64 = pair.image.rows().map(|r| (r[0] - mean0).powi(2)).sum::<f64>() / (n - 1.0);
        assert!((stats.mean[0] - mean0).abs() <= 1e-5 * mean0.abs());
        assert!((stats.covariance[(0, 0)] - var0).abs() <= 1e-5 * var0.abs());
    }

    #[test]
    fn test_generator_shape_error() {
        let mut conditions = CyclingSource::new(VecSource::new(dataset(4), 2).unwrap());
        let mut generator = FnGenerator::new(|_: &[usize]| Ok::<_, Error>(vec![vec![0.0, 0.0]]));
        let err = accumulate_generated(
            &mut conditions,
            &mut generator,
            &IdentityEmbedding::new(2),
            &OneHotEmbedding::new(3),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, Error::GeneratorOutputShape { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_width_change_detected_at_offending_batch() {
        let calls = AtomicUsize::new(0);
        let drifting = FnEmbedding::new(2, |items: &[Vec<f64>]| {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let width = if call >= 2 { 3 } else { 2 };
            Ok::<_, Error>(items.iter().map(|_| vec![0.5; width]).collect::<Vec<Vec<f64>>>())
        });
        let mut source = CyclingSource::new(VecSource::new(dataset(9), 3).unwrap());
        let err = accumulate_reference(&mut source, &drifting, &OneHotEmbedding::new(3)).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_empty_source() {
        let mut source: CyclingSource<VecSource<Vec<f64>, usize>> =
            CyclingSource::new(VecSource::new(Vec::new(), 4).unwrap());
        let err = accumulate_reference(&mut source, &IdentityEmbedding::new(2), &OneHotEmbedding::new(3)).unwrap_err();
        assert!(matches!(err, Error::EmptySequence));
    }

    #[test]
    fn test_zero_samples_per_condition_rejected() {
        let mut conditions = CyclingSource::new(VecSource::new(dataset(4), 2).unwrap());
        let mut generator = FnGenerator::new(|conds: &[usize]| Ok::<_, Error>(vec![vec![0.0, 0.0]; conds.len()]));
        assert!(accumulate_generated(
            &mut conditions,
            &mut generator,
            &IdentityEmbedding::new(2),
            &OneHotEmbedding::new(3),
            0,
        )
        .is_err());
    }
}
