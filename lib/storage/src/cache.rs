// Binary cache for reference statistics
use atomicwrites::{AtomicFile, OverwriteBehavior};
use fjd_core::{Error, GaussianStats, JointStatistics, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MAGIC: &str = "FJDSTATS";
const FORMAT_VERSION: u32 = 1;

const IMAGE_MEAN: &str = "image_mean";
const IMAGE_COVARIANCE: &str = "image_covariance";
const CONDITION_MEAN: &str = "condition_mean";
const CONDITION_COVARIANCE: &str = "condition_covariance";
const CROSS_COVARIANCE: &str = "cross_covariance";

/// A named, shaped array of row-major values
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedArray {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl NamedArray {
    fn vector(name: &str, v: &DVector<f64>) -> Self {
        Self {
            name: name.to_string(),
            shape: vec![v.len()],
            data: v.iter().copied().collect(),
        }
    }

    fn matrix(name: &str, m: &DMatrix<f64>) -> Self {
        // nalgebra stores column-major; the file is row-major
        Self {
            name: name.to_string(),
            shape: vec![m.nrows(), m.ncols()],
            data: m.transpose().as_slice().to_vec(),
        }
    }
}

/// On-disk layout of a cache file
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheFile {
    pub magic: String,
    pub version: u32,
    pub image_dim: usize,
    pub condition_dim: usize,
    pub count: u64,
    pub alpha: f64,
    pub arrays: Vec<NamedArray>,
}

impl CacheFile {
    fn array(&self, name: &str, shape: &[usize]) -> Result<&NamedArray> {
        let array = self
            .arrays
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::CacheRead(format!("missing array '{}'", name)))?;
        if array.shape != shape || array.data.len() != shape.iter().product::<usize>() {
            return Err(Error::CacheRead(format!(
                "array '{}' has shape {:?} with {} values, expected {:?}",
                name,
                array.shape,
                array.data.len(),
                shape
            )));
        }
        Ok(array)
    }

    fn vector(&self, name: &str, len: usize) -> Result<DVector<f64>> {
        Ok(DVector::from_column_slice(&self.array(name, &[len])?.data))
    }

    fn matrix(&self, name: &str, rows: usize, cols: usize) -> Result<DMatrix<f64>> {
        Ok(DMatrix::from_row_slice(rows, cols, &self.array(name, &[rows, cols])?.data))
    }
}

/// Reference statistics together with their calibrated alpha
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEntry {
    pub statistics: JointStatistics,
    pub alpha: f64,
}

/// Reads and writes a single statistics cache file
pub struct StatisticsCache {
    path: PathBuf,
}

impl StatisticsCache {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Persist the entry. The file is written to a temporary sibling and
    /// renamed into place, so a failed write never leaves a readable file.
    pub fn save(&self, entry: &ReferenceEntry) -> Result<()> {
        let stats = &entry.statistics;
        let cache = CacheFile {
            magic: MAGIC.to_string(),
            version: FORMAT_VERSION,
            image_dim: stats.image_dim(),
            condition_dim: stats.condition_dim(),
            count: stats.count() as u64,
            alpha: entry.alpha,
            arrays: vec![
                NamedArray::vector(IMAGE_MEAN, &stats.image_only().mean),
                NamedArray::matrix(IMAGE_COVARIANCE, &stats.image_only().covariance),
                NamedArray::vector(CONDITION_MEAN, &stats.condition_only().mean),
                NamedArray::matrix(CONDITION_COVARIANCE, &stats.condition_only().covariance),
                NamedArray::matrix(CROSS_COVARIANCE, &stats.cross_covariance()),
            ],
        };

        let data = bincode::serialize(&cache)
            .map_err(|e| Error::CacheWrite(format!("Serialization error: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::CacheWrite(format!("{}: {}", parent.display(), e)))?;
        }

        AtomicFile::new(&self.path, OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(&data))
            .map_err(|e| Error::CacheWrite(format!("{}: {}", self.path.display(), e)))?;

        info!("Saved reference statistics to {:?} ({} bytes)", self.path, data.len());
        Ok(())
    }

    /// Load the entry, checking it against the embedding widths in use
    pub fn load(&self, image_dim: usize, condition_dim: usize) -> Result<ReferenceEntry> {
        let data = std::fs::read(&self.path)
            .map_err(|e| Error::CacheRead(format!("{}: {}", self.path.display(), e)))?;
        let cache: CacheFile = bincode::deserialize(&data)
            .map_err(|e| Error::CacheRead(format!("Deserialization error: {}", e)))?;

        if cache.magic != MAGIC || cache.version != FORMAT_VERSION {
            return Err(Error::CacheRead(format!(
                "unrecognized cache format '{}' v{}",
                cache.magic, cache.version
            )));
        }
        if cache.image_dim != image_dim || cache.condition_dim != condition_dim {
            return Err(Error::CacheDimensionMismatch {
                expected_image: image_dim,
                expected_condition: condition_dim,
                found_image: cache.image_dim,
                found_condition: cache.condition_dim,
            });
        }

        let (di, dc) = (image_dim, condition_dim);
        let image_mean = cache.vector(IMAGE_MEAN, di)?;
        let image_cov = cache.matrix(IMAGE_COVARIANCE, di, di)?;
        let condition_mean = cache.vector(CONDITION_MEAN, dc)?;
        let condition_cov = cache.matrix(CONDITION_COVARIANCE, dc, dc)?;
        let cross = cache.matrix(CROSS_COVARIANCE, di, dc)?;

        let dim = di + dc;
        let mean = DVector::from_fn(dim, |i, _| {
            if i < di {
                image_mean[i]
            } else {
                condition_mean[i - di]
            }
        });
        let covariance = DMatrix::from_fn(dim, dim, |i, j| match (i < di, j < di) {
            (true, true) => image_cov[(i, j)],
            (true, false) => cross[(i, j - di)],
            (false, true) => cross[(j, i - di)],
            (false, false) => condition_cov[(i - di, j - di)],
        });

        let stats = GaussianStats::new(mean, covariance, cache.count as usize)
            .map_err(|e| Error::CacheRead(e.to_string()))?;
        debug!("Loaded {} samples of ({}, {}) statistics from {:?}", cache.count, di, dc, self.path);

        Ok(ReferenceEntry {
            statistics: JointStatistics::from_parts(stats, di, dc)?,
            alpha: cache.alpha,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fjd_core::{EmbeddingPair, RawEmbeddings};

    fn entry() -> ReferenceEntry {
        let image: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![i as f64 * 0.5, (i % 5) as f64, ((i * 7) % 11) as f64])
            .collect();
        let condition: Vec<Vec<f64>> = (0..40).map(|i| vec![(i % 2) as f64, 1.0 - (i % 2) as f64]).collect();
        let pair = EmbeddingPair {
            image: RawEmbeddings::from_rows(3, image).unwrap(),
            condition: RawEmbeddings::from_rows(2, condition).unwrap(),
        };
        ReferenceEntry {
            statistics: JointStatistics::from_pair(&pair).unwrap(),
            alpha: 1.75,
        }
    }

    #[test]
    fn test_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = StatisticsCache::new(temp_dir.path().join("nested").join("reference.stats"));
        let saved = entry();

        cache.save(&saved).unwrap();
        assert!(cache.exists());
        let loaded = cache.load(3, 2).unwrap();

        assert_eq!(loaded.alpha, 1.75);
        assert_eq!(loaded.statistics.count(), 40);
        let (a, b) = (saved.statistics.joint(), loaded.statistics.joint());
        for i in 0..5 {
            assert!((a.mean[i] - b.mean[i]).abs() <= 1e-6 * a.mean[i].abs().max(1.0));
            for j in 0..5 {
                let (x, y) = (a.covariance[(i, j)], b.covariance[(i, j)]);
                assert!((x - y).abs() <= 1e-6 * x.abs().max(1.0), "({}, {}): {} vs {}", i, j, x, y);
            }
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = StatisticsCache::new(temp_dir.path().join("reference.stats"));
        cache.save(&entry()).unwrap();
        let err = cache.load(3, 4).unwrap_err();
        assert!(matches!(
            err,
            Error::CacheDimensionMismatch {
                expected_image: 3,
                expected_condition: 4,
                found_image: 3,
                found_condition: 2,
            }
        ));
    }

    #[test]
    fn test_corrupt_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("reference.stats");
        std::fs::write(&path, b"not a cache").unwrap();
        let err = StatisticsCache::new(&path).load(3, 2).unwrap_err();
        assert!(matches!(err, Error::CacheRead(_)));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = StatisticsCache::new(temp_dir.path().join("absent.stats"));
        assert!(!cache.exists());
        assert!(matches!(cache.load(3, 2), Err(Error::CacheRead(_))));
    }

    #[test]
    fn test_failed_write_leaves_no_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        // a directory where the cache file should go makes the final rename fail
        let path = temp_dir.path().join("reference.stats");
        std::fs::create_dir_all(path.join("occupied")).unwrap();
        let cache = StatisticsCache::new(&path);
        assert!(matches!(cache.save(&entry()), Err(Error::CacheWrite(_))));
        assert!(path.is_dir());
        assert!(matches!(cache.load(3, 2), Err(Error::CacheRead(_))));
    }
}
