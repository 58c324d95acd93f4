//! Structure scores.

pub mod bde_cache;

pub use bde_cache::{BdeMetricCache, CacheStats};
