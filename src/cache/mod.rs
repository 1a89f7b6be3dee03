//! Request de-duplicating, short-TTL response cache.

pub mod freshness;
pub mod key;

pub use freshness::{CacheEntry, CacheStats, FreshnessCache};
pub use key::{CacheKey, RouteKind, COORD_PRECISION};
