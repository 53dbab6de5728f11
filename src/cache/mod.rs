pub mod bounded;
pub mod coordinator;
pub mod entry;
mod lru;
pub mod metrics;

pub use bounded::BoundedConcurrentCache;
pub use coordinator::{CacheCoordinator, CoordinatorState, RefreshStats, WarmReport};
pub use entry::CacheEntry;
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
