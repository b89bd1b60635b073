use crate::cache::{ReferenceEntry, StatisticsCache};
use fjd_core::{Error, Result};
use std::path::PathBuf;
use tracing::{info, warn};

/// How reference statistics interact with the on-disk cache
#[derive(Debug, Clone, Default)]
pub struct CachePolicy {
    pub path: Option<PathBuf>,
    /// Read an existing cache file instead of recomputing
    pub use_cache: bool,
    /// Write freshly computed statistics back to `path`
    pub save: bool,
}

impl CachePolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(path: impl Into<PathBuf>, use_cache: bool, save: bool) -> Self {
        Self {
            path: Some(path.into()),
            use_cache,
            save,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.save && self.path.is_none() {
            return Err(Error::InvalidConfig(
                "saving reference statistics requires a cache path".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where a memoized entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Loaded,
    Computed,
    ComputedAndSaved,
}

/// Return cached reference statistics or compute (and optionally save) them
///
/// A cache file whose widths disagree with `image_dim`/`condition_dim` is
/// always an error. An unreadable file is an error when `save` is set, since
/// silently overwriting it would hide the problem; otherwise it is logged and
/// the statistics are recomputed.
pub fn memoize<F>(
    policy: &CachePolicy,
    image_dim: usize,
    condition_dim: usize,
    compute: F,
) -> Result<(ReferenceEntry, CacheOutcome)>
where
    F: FnOnce() -> Result<ReferenceEntry>,
{
    policy.validate()?;
    let cache = policy.path.as_ref().map(StatisticsCache::new);

    if let Some(cache) = cache.as_ref().filter(|c| policy.use_cache && c.exists()) {
        match cache.load(image_dim, condition_dim) {
            Ok(entry) => {
                info!("Using cached reference statistics from {:?}", cache.path());
                return Ok((entry, CacheOutcome::Loaded));
            }
            Err(e @ Error::CacheDimensionMismatch { .. }) => return Err(e),
            Err(e) if policy.save => return Err(e),
            Err(e) => warn!("Ignoring unreadable cache {:?}: {}", cache.path(), e),
        }
    }

    let entry = compute()?;
    match cache.filter(|_| policy.save) {
        Some(cache) => {
            cache.save(&entry)?;
            Ok((entry, CacheOutcome::ComputedAndSaved))
        }
        None => Ok((entry, CacheOutcome::Computed)),
    }
}
