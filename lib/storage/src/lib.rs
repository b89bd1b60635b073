//! # FJD Storage
//!
//! Persistence for reference statistics: a versioned binary cache file
//! written atomically, and the memoization policy that decides whether to
//! load, compute or save.

pub mod cache;
pub mod memo;

pub use cache::{CacheFile, NamedArray, ReferenceEntry, StatisticsCache};
pub use memo::{memoize, CacheOutcome, CachePolicy};
