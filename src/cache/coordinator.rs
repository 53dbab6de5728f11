use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::bounded::BoundedConcurrentCache;
use crate::audit::AuditTrail;
use crate::config::{CoreConfig, RECORDS_CACHE, REPORTS_CACHE};
use crate::error::ConfigError;
use crate::runtime::{PeriodicTask, ShutdownStatus};
use crate::source::DataSource;

const AUDIT_OPERATION: &str = "CACHE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Warmed,
    Refreshing,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmReport {
    pub loaded: usize,
    pub skipped: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub cycles: u64,
    pub failures: u64,
    pub last_loaded: u64,
}

/// Owns the `records` cache and the derived `reports` cache, loads records
/// from a [`DataSource`] and keeps them fresh in the background.
///
/// Derived reports are keyed by the same identity as records; replacing or
/// invalidating a record drops its report.
pub struct CacheCoordinator<V, R = String> {
    shared: Arc<Shared<V, R>>,
    refresh: Mutex<Option<PeriodicTask>>,
    grace: Duration,
}

struct Shared<V, R> {
    records: BoundedConcurrentCache<String, V>,
    reports: BoundedConcurrentCache<String, R>,
    state: Mutex<CoordinatorState>,
    audit: AuditTrail,
    cycles: AtomicU64,
    failures: AtomicU64,
    last_loaded: AtomicU64,
}

impl<V, R> CacheCoordinator<V, R>
where
    V: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new(config: &CoreConfig, audit: AuditTrail) -> Result<Self, ConfigError> {
        config.refresh.validate()?;
        let records =
            BoundedConcurrentCache::new(RECORDS_CACHE, config.cache.capacity_for(RECORDS_CACHE)?)?;
        let reports =
            BoundedConcurrentCache::new(REPORTS_CACHE, config.cache.capacity_for(REPORTS_CACHE)?)?;
        Ok(Self {
            shared: Arc::new(Shared {
                records,
                reports,
                state: Mutex::new(CoordinatorState::Idle),
                audit,
                cycles: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                last_loaded: AtomicU64::new(0),
            }),
            refresh: Mutex::new(None),
            grace: config.refresh.grace(),
        })
    }

    pub fn records(&self) -> &BoundedConcurrentCache<String, V> {
        &self.shared.records
    }

    pub fn reports(&self) -> &BoundedConcurrentCache<String, R> {
        &self.shared.reports
    }

    pub fn state(&self) -> CoordinatorState {
        *self.shared.state.lock()
    }

    pub fn refresh_stats(&self) -> RefreshStats {
        RefreshStats {
            cycles: self.shared.cycles.load(Ordering::Relaxed),
            failures: self.shared.failures.load(Ordering::Relaxed),
            last_loaded: self.shared.last_loaded.load(Ordering::Relaxed),
        }
    }

    /// Bulk-loads every record the source lists. A source that cannot be
    /// reached leaves the cache empty; nothing is retried.
    pub fn warm<S>(&self, source: &S) -> WarmReport
    where
        S: DataSource<Entity = V> + ?Sized,
    {
        if self.state() == CoordinatorState::Stopped {
            warn!("warm requested after shutdown; ignoring");
            return WarmReport::default();
        }
        let started = Instant::now();
        let report = match source.list_all() {
            Ok(entities) => {
                let loaded = entities.len();
                for entity in entities {
                    self.shared.store_record(source.key_of(&entity), entity);
                }
                WarmReport {
                    loaded,
                    ..WarmReport::default()
                }
            }
            Err(err) => {
                warn!(error = %err, "cache warm-up failed; starting empty");
                WarmReport {
                    skipped: 1,
                    ..WarmReport::default()
                }
            }
        };
        self.finish_warm(report, started);
        report
    }

    /// Loads individual ids in parallel. Ids that fail to load are skipped,
    /// ids the source does not know are counted as missing.
    pub fn warm_keys<S>(&self, source: &S, ids: &[String]) -> WarmReport
    where
        S: DataSource<Entity = V> + ?Sized,
    {
        if self.state() == CoordinatorState::Stopped {
            warn!("warm requested after shutdown; ignoring");
            return WarmReport::default();
        }
        let started = Instant::now();
        let report = ids
            .par_iter()
            .map(|id| match source.find_by_id(id) {
                Ok(Some(entity)) => {
                    self.shared.store_record(id.clone(), entity);
                    WarmReport {
                        loaded: 1,
                        ..WarmReport::default()
                    }
                }
                Ok(None) => WarmReport {
                    missing: 1,
                    ..WarmReport::default()
                },
                Err(err) => {
                    debug!(id = %id, error = %err, "skipping record during warm-up");
                    WarmReport {
                        skipped: 1,
                        ..WarmReport::default()
                    }
                }
            })
            .reduce(WarmReport::default, |a, b| WarmReport {
                loaded: a.loaded + b.loaded,
                skipped: a.skipped + b.skipped,
                missing: a.missing + b.missing,
            });
        self.finish_warm(report, started);
        report
    }

    fn finish_warm(&self, report: WarmReport, started: Instant) {
        {
            let mut state = self.shared.state.lock();
            if *state == CoordinatorState::Idle {
                *state = CoordinatorState::Warmed;
            }
        }
        self.shared.last_loaded.store(report.loaded as u64, Ordering::Relaxed);
        info!(
            loaded = report.loaded,
            skipped = report.skipped,
            missing = report.missing,
            "cache warmed"
        );
        self.shared.audit.log(
            AUDIT_OPERATION,
            "WARM",
            elapsed_ms(started),
            report.skipped == 0,
            &format!(
                "loaded={} skipped={} missing={}",
                report.loaded, report.skipped, report.missing
            ),
        );
    }

    /// Starts re-listing the source every `interval`, overwriting cached
    /// records. Any previous refresh task is stopped first.
    pub fn start_auto_refresh<S>(&self, source: Arc<S>, interval: Duration) -> std::io::Result<()>
    where
        S: DataSource<Entity = V> + 'static,
    {
        // Shutdown flips the state while holding this lock.
        let mut slot = self.refresh.lock();
        if self.state() == CoordinatorState::Stopped {
            warn!("auto-refresh requested after shutdown; ignoring");
            return Ok(());
        }
        if let Some(mut previous) = slot.take() {
            previous.stop(self.grace);
        }
        let shared = Arc::clone(&self.shared);
        let task = PeriodicTask::spawn("gk-cache-refresh", interval, move |stop| {
            if !stop.is_stopped() {
                shared.refresh_cycle(source.as_ref());
            }
        })?;
        *slot = Some(task);
        info!(interval_secs = interval.as_secs_f64(), "cache auto-refresh started");
        Ok(())
    }

    /// Runs one refresh cycle on the calling thread.
    pub fn refresh_now<S>(&self, source: &S) -> bool
    where
        S: DataSource<Entity = V> + ?Sized,
    {
        self.shared.refresh_cycle(source)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let started = Instant::now();
        let value = self.shared.records.get(&key.to_string());
        self.shared.audit.log(
            AUDIT_OPERATION,
            "GET",
            elapsed_ms(started),
            true,
            &format!(
                "key={key} {}",
                if value.is_some() { "hit" } else { "miss" }
            ),
        );
        value
    }

    pub fn put(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let started = Instant::now();
        self.shared.store_record(key.clone(), value);
        self.shared.audit.log(
            AUDIT_OPERATION,
            "PUT",
            elapsed_ms(started),
            true,
            &format!("key={key}"),
        );
    }

    /// Drops the record and its derived report. Returns whether a record
    /// was cached.
    pub fn invalidate(&self, key: &str) -> bool {
        let started = Instant::now();
        let key = key.to_string();
        let removed = self.shared.records.invalidate(&key);
        let report_removed = self.shared.reports.invalidate(&key);
        self.shared.audit.log(
            AUDIT_OPERATION,
            "INVALIDATE",
            elapsed_ms(started),
            true,
            &format!("key={key} removed={removed} report_removed={report_removed}"),
        );
        removed
    }

    pub fn get_report(&self, key: &str) -> Option<R> {
        self.shared.reports.get(&key.to_string())
    }

    pub fn put_report(&self, key: impl Into<String>, report: R) {
        self.shared.reports.put(key.into(), report);
    }

    /// Stops the refresh task, waiting up to the configured grace period
    /// for an in-flight cycle. The coordinator keeps serving lookups.
    pub fn shutdown(&self) -> ShutdownStatus {
        let task = {
            let mut slot = self.refresh.lock();
            *self.shared.state.lock() = CoordinatorState::Stopped;
            slot.take()
        };
        let status = match task {
            Some(mut task) => task.stop(self.grace),
            None => ShutdownStatus::Graceful,
        };
        info!(graceful = status.is_graceful(), "cache coordinator stopped");
        status
    }
}

impl<V, R> Drop for CacheCoordinator<V, R> {
    fn drop(&mut self) {
        if let Some(mut task) = self.refresh.get_mut().take() {
            task.stop(Duration::ZERO);
        }
    }
}

impl<V, R> Shared<V, R>
where
    V: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    // Record first, then the report: a report derived from the old record
    // in between is dropped too.
    fn store_record(&self, key: String, value: V) {
        self.records.put(key.clone(), value);
        self.reports.invalidate(&key);
    }

    fn set_state_unless_stopped(&self, next: CoordinatorState) {
        let mut state = self.state.lock();
        if *state != CoordinatorState::Stopped {
            *state = next;
        }
    }

    fn refresh_cycle<S>(&self, source: &S) -> bool
    where
        S: DataSource<Entity = V> + ?Sized,
    {
        self.set_state_unless_stopped(CoordinatorState::Refreshing);
        let started = Instant::now();
        self.cycles.fetch_add(1, Ordering::Relaxed);
        let outcome = source.list_all();
        let ok = match outcome {
            Ok(entities) => {
                let loaded = entities.len();
                for entity in entities {
                    self.store_record(source.key_of(&entity), entity);
                }
                self.last_loaded.store(loaded as u64, Ordering::Relaxed);
                debug!(loaded, "cache refresh cycle completed");
                self.audit.log(
                    AUDIT_OPERATION,
                    "REFRESH",
                    elapsed_ms(started),
                    true,
                    &format!("loaded={loaded}"),
                );
                true
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "cache refresh failed; retrying next interval");
                self.audit.log(
                    AUDIT_OPERATION,
                    "REFRESH",
                    elapsed_ms(started),
                    false,
                    &err.to_string(),
                );
                false
            }
        };
        self.set_state_unless_stopped(CoordinatorState::Warmed);
        ok
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
