use crate::metric::FjdMetric;
use fjd_core::{JointStatistics, Result};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Thread-safe handle to an [`FjdMetric`]
///
/// Each scoring call holds the lock for its whole duration, so calls from
/// different threads are serialized and draw from the shared condition
/// source one after another.
pub struct SharedFjdMetric<I, C> {
    inner: Arc<Mutex<FjdMetric<I, C>>>,
}

impl<I, C> Clone for SharedFjdMetric<I, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, C> SharedFjdMetric<I, C> {
    pub fn new(metric: FjdMetric<I, C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(metric)),
        }
    }

    /// Exclusive access for calls not wrapped here
    pub fn lock(&self) -> MutexGuard<'_, FjdMetric<I, C>> {
        self.inner.lock()
    }

    pub fn reference_statistics(&self) -> Result<JointStatistics> {
        self.inner.lock().reference_statistics().cloned()
    }

    pub fn default_alpha(&self) -> Result<f64> {
        self.inner.lock().default_alpha()
    }

    pub fn get_fid(&self) -> Result<f64> {
        self.inner.lock().get_fid()
    }

    pub fn get_fjd(&self, alpha: Option<f64>) -> Result<f64> {
        self.inner.lock().get_fjd(alpha)
    }

    pub fn sweep_alpha(&self, alphas: &[f64]) -> Result<Vec<f64>> {
        self.inner.lock().sweep_alpha(alphas)
    }
}
