use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Sequence yielded no samples")]
    EmptySequence,

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "Cached statistics have dimensions ({found_image}, {found_condition}), \
         embeddings in use have ({expected_image}, {expected_condition})"
    )]
    CacheDimensionMismatch {
        expected_image: usize,
        expected_condition: usize,
        found_image: usize,
        found_condition: usize,
    },

    #[error("Cache read error: {0}")]
    CacheRead(String),

    #[error("Cache write error: {0}")]
    CacheWrite(String),

    #[error("Condition embeddings have zero mean norm")]
    ZeroNorm,

    #[error("Generator returned {actual} samples for a batch of {expected} conditions")]
    GeneratorOutputShape { expected: usize, actual: usize },

    #[error("Frechet distance failed after {attempts} attempts: {reason}")]
    FrechetComputation { attempts: usize, reason: String },

    #[error("Newton-Schulz iteration diverged after {iterations} iterations (residual {residual:e})")]
    NewtonSchulzDivergence { iterations: usize, residual: f64 },

    #[error("Invalid alpha: {0}")]
    InvalidAlpha(f64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
