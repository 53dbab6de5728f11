//! The external data-source collaborator consumed by the cache coordinator.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::SourceError;

/// Read access to the system of record behind a cache.
pub trait DataSource: Send + Sync {
    type Entity: Clone + Send + Sync + 'static;

    fn list_all(&self) -> Result<Vec<Self::Entity>, SourceError>;

    fn find_by_id(&self, id: &str) -> Result<Option<Self::Entity>, SourceError>;

    /// Cache key for an entity.
    fn key_of(&self, entity: &Self::Entity) -> String;
}

/// In-memory data source, keyed by a caller supplied function.
///
/// Availability can be toggled to simulate an unreachable backend, and the
/// number of `list_all` calls is counted so refresh cadence can be observed.
pub struct MemorySource<E> {
    records: RwLock<Vec<E>>,
    key_fn: fn(&E) -> String,
    available: AtomicBool,
    listings: AtomicU64,
}

impl<E> MemorySource<E>
where
    E: Clone + Send + Sync + 'static,
{
    pub fn new(records: Vec<E>, key_fn: fn(&E) -> String) -> Self {
        Self {
            records: RwLock::new(records),
            key_fn,
            available: AtomicBool::new(true),
            listings: AtomicU64::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Replaces the record with the same key, or appends it.
    pub fn upsert(&self, record: E) {
        let key = (self.key_fn)(&record);
        let mut records = self.records.write();
        match records.iter_mut().find(|existing| (self.key_fn)(existing) == key) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    pub fn listings(&self) -> u64 {
        self.listings.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), SourceError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SourceError::Unavailable("memory source switched off".into()))
        }
    }
}

impl<E> DataSource for MemorySource<E>
where
    E: Clone + Send + Sync + 'static,
{
    type Entity = E;

    fn list_all(&self) -> Result<Vec<E>, SourceError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.records.read().clone())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<E>, SourceError> {
        self.check_available()?;
        Ok(self
            .records
            .read()
            .iter()
            .find(|record| (self.key_fn)(record) == id)
            .cloned())
    }

    fn key_of(&self, entity: &E) -> String {
        (self.key_fn)(entity)
    }
}
