use crate::config::FjdConfig;
use fjd_core::accumulator::{accumulate_generated, accumulate_reference};
use fjd_core::{
    default_alpha, validate_alpha, CyclingSource, DataSource, Embedding, FrechetEngine,
    GaussianStats, Generator, JointStatistics, Result,
};
use fjd_storage::{memoize, CacheOutcome, ReferenceEntry};
use tracing::{debug, info};

type BoxedSource<I, C> = Box<dyn DataSource<Image = I, Condition = C>>;

/// Scores a conditional generator against a reference dataset
///
/// Reference statistics are computed once (or loaded from the cache) and
/// kept for the lifetime of the metric. Generated statistics are drawn
/// fresh on every scoring call; the condition source keeps its cursor
/// between calls, so consecutive draws see consecutive conditions.
pub struct FjdMetric<I, C> {
    config: FjdConfig,
    engine: FrechetEngine,
    generator: Box<dyn Generator<C, Image = I>>,
    reference_source: CyclingSource<BoxedSource<I, C>>,
    condition_source: CyclingSource<BoxedSource<I, C>>,
    image_embedding: Box<dyn Embedding<I>>,
    condition_embedding: Box<dyn Embedding<C>>,
    reference: Option<ReferenceEntry>,
}

impl<I, C> FjdMetric<I, C> {
    pub fn new<G, R, S, IE, CE>(
        config: FjdConfig,
        generator: G,
        reference_source: R,
        condition_source: S,
        image_embedding: IE,
        condition_embedding: CE,
    ) -> Result<Self>
    where
        G: Generator<C, Image = I> + 'static,
        R: DataSource<Image = I, Condition = C> + 'static,
        S: DataSource<Image = I, Condition = C> + 'static,
        IE: Embedding<I> + 'static,
        CE: Embedding<C> + 'static,
    {
        config.validate()?;
        let engine = config.engine();
        Ok(Self {
            config,
            engine,
            generator: Box::new(generator),
            reference_source: CyclingSource::new(Box::new(reference_source)),
            condition_source: CyclingSource::new(Box::new(condition_source)),
            image_embedding: Box::new(image_embedding),
            condition_embedding: Box::new(condition_embedding),
            reference: None,
        })
    }

    pub fn config(&self) -> &FjdConfig {
        &self.config
    }

    pub fn engine(&self) -> &FrechetEngine {
        &self.engine
    }

    /// Reference statistics, computed or loaded on first use
    pub fn reference_statistics(&mut self) -> Result<&JointStatistics> {
        Ok(&self.reference_entry()?.statistics)
    }

    /// Alpha used when a scoring call does not name one
    ///
    /// The configured alpha if set, otherwise the ratio of mean image norm to
    /// mean condition norm over the reference embeddings.
    pub fn default_alpha(&mut self) -> Result<f64> {
        if let Some(alpha) = self.config.alpha {
            return Ok(alpha);
        }
        Ok(self.reference_entry()?.alpha)
    }

    /// One fresh draw from the generator, summarized without alpha applied
    pub fn generated_joint_statistics(&mut self) -> Result<JointStatistics> {
        let pair = accumulate_generated(
            &mut self.condition_source,
            self.generator.as_mut(),
            self.image_embedding.as_ref(),
            self.condition_embedding.as_ref(),
            self.config.samples_per_condition,
        )?;
        debug!("Generated pass embedded {} samples", pair.len());
        JointStatistics::from_pair(&pair)
    }

    /// Statistics of a fresh draw with the condition block scaled by alpha
    pub fn generated_statistics(&mut self, alpha: Option<f64>) -> Result<GaussianStats> {
        let alpha = self.resolve_alpha(alpha)?;
        Ok(self.generated_joint_statistics()?.scaled(alpha))
    }

    pub fn get_fid(&mut self) -> Result<f64> {
        self.reference_entry()?;
        let generated = self.generated_joint_statistics()?;
        let engine = self.engine;
        let fid = engine.fid(self.reference_statistics()?, &generated)?;
        info!("FID: {:.6}", fid);
        Ok(fid)
    }

    pub fn get_fjd(&mut self, alpha: Option<f64>) -> Result<f64> {
        let alpha = self.resolve_alpha(alpha)?;
        let generated = self.generated_joint_statistics()?;
        let fjd = self.fjd_for(&generated, alpha)?;
        info!("FJD (alpha = {:.4}): {:.6}", alpha, fjd);
        Ok(fjd)
    }

    /// FJD of an existing generated draw against the reference
    pub fn fjd_for(&mut self, generated: &JointStatistics, alpha: f64) -> Result<f64> {
        let alpha = validate_alpha(alpha)?;
        let engine = self.engine;
        engine.fjd(self.reference_statistics()?, generated, alpha)
    }

    /// FJD at each alpha from a single generated draw
    ///
    /// Every alpha is checked before anything is sampled. An empty slice
    /// returns an empty result without touching the generator.
    pub fn sweep_alpha(&mut self, alphas: &[f64]) -> Result<Vec<f64>> {
        if alphas.is_empty() {
            return Ok(Vec::new());
        }
        for &alpha in alphas {
            validate_alpha(alpha)?;
        }

        self.reference_entry()?;
        let generated = self.generated_joint_statistics()?;
        let scores = alphas
            .iter()
            .map(|&alpha| self.fjd_for(&generated, alpha))
            .collect::<Result<Vec<f64>>>()?;
        info!("Swept {} alpha values", scores.len());
        Ok(scores)
    }

    fn resolve_alpha(&mut self, alpha: Option<f64>) -> Result<f64> {
        match alpha {
            Some(alpha) => validate_alpha(alpha),
            None => self.default_alpha(),
        }
    }

    fn reference_entry(&mut self) -> Result<&ReferenceEntry> {
        let entry = match self.reference.take() {
            Some(entry) => entry,
            None => self.compute_reference()?,
        };
        Ok(&*self.reference.insert(entry))
    }

    fn compute_reference(&mut self) -> Result<ReferenceEntry> {
        let policy = self.config.cache_policy();
        let image_dim = self.image_embedding.dim();
        let condition_dim = self.condition_embedding.dim();

        let source = &mut self.reference_source;
        let image_embedding = self.image_embedding.as_ref();
        let condition_embedding = self.condition_embedding.as_ref();
        let (entry, outcome) = memoize(&policy, image_dim, condition_dim, || {
            let pair = accumulate_reference(source, image_embedding, condition_embedding)?;
            let alpha = default_alpha(&pair.image, &pair.condition)?;
            Ok(ReferenceEntry {
                statistics: JointStatistics::from_pair(&pair)?,
                alpha,
            })
        })?;

        match outcome {
            CacheOutcome::Loaded => info!(
                "Loaded reference statistics ({} samples, alpha = {:.4})",
                entry.statistics.count(),
                entry.alpha
            ),
            CacheOutcome::Computed | CacheOutcome::ComputedAndSaved => info!(
                "Computed reference statistics ({} samples, alpha = {:.4})",
                entry.statistics.count(),
                entry.alpha
            ),
        }
        Ok(entry)
    }
}
