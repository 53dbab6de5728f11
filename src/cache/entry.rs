use std::time::Instant;

/// One cached value plus its access bookkeeping.
///
/// `last_accessed` and `access_count` only ever move forward while the entry
/// is live.
#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    pub key: K,
    pub value: V,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub access_count: u64,
}

impl<K, V> CacheEntry<K, V> {
    pub fn new(key: K, value: V) -> Self {
        let now = Instant::now();
        Self {
            key,
            value,
            created_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    pub fn record_access(&mut self) {
        self.last_accessed = Instant::now().max(self.last_accessed);
        self.access_count = self.access_count.saturating_add(1);
    }

    /// Replaces the value in place; counts as a recency touch but not as a
    /// read.
    pub fn overwrite(&mut self, value: V) {
        self.value = value;
        self.last_accessed = Instant::now().max(self.last_accessed);
    }
}
