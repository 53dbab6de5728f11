use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free hit/miss/eviction counters for a single cache.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    total_hit_latency_ns: AtomicU64,
    total_miss_latency_ns: AtomicU64,
}

impl CacheMetrics {
    pub fn record_hit(&self, elapsed: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.total_hit_latency_ns
            .fetch_add(saturating_nanos(elapsed), Ordering::Relaxed);
    }

    pub fn record_miss(&self, elapsed: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.total_miss_latency_ns
            .fetch_add(saturating_nanos(elapsed), Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.total_hit_latency_ns.store(0, Ordering::Relaxed);
        self.total_miss_latency_ns.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self, size: usize, capacity: usize) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            total_hit_latency_ns: self.total_hit_latency_ns.load(Ordering::Relaxed),
            total_miss_latency_ns: self.total_miss_latency_ns.load(Ordering::Relaxed),
            size,
            capacity,
        }
    }
}

fn saturating_nanos(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_hit_latency_ns: u64,
    pub total_miss_latency_ns: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheMetricsSnapshot {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Hit rate as a percentage; zero before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            total => self.hits as f64 * 100.0 / total as f64,
        }
    }

    pub fn average_hit_latency(&self) -> Duration {
        average(self.total_hit_latency_ns, self.hits)
    }

    pub fn average_miss_latency(&self) -> Duration {
        average(self.total_miss_latency_ns, self.misses)
    }
}

fn average(total_ns: u64, count: u64) -> Duration {
    total_ns
        .checked_div(count)
        .map(Duration::from_nanos)
        .unwrap_or(Duration::ZERO)
}
