use std::time::Duration;

use anyhow::Result;
use gradekeeper::config::{CoreConfig, RECORDS_CACHE, REPORTS_CACHE};
use gradekeeper::error::ConfigError;

#[test]
fn defaults_are_valid() {
    let config = CoreConfig::default();
    config.validate().unwrap();
    assert_eq!(config.cache.capacity_for(RECORDS_CACHE).unwrap(), 150);
    assert_eq!(config.refresh.interval(), Duration::from_secs(300));
    assert_eq!(config.refresh.grace(), Duration::from_secs(3));
    assert_eq!((config.pool.min_workers, config.pool.max_workers), (2, 8));
    assert_eq!(config.audit.rotation_bytes, 10 * 1024 * 1024);
    assert!(config.audit.enabled);
}

#[test]
fn toml_overrides_merge_with_defaults() -> Result<()> {
    let config = CoreConfig::from_toml_str(
        r#"
        [cache]
        default_capacity = 64

        [cache.capacities]
        records = 500

        [pool]
        min_workers = 1
        max_workers = 4

        [audit]
        dir = "/var/lib/gradekeeper/audit"
        rotation_bytes = 4096
        "#,
    )?;
    config.validate()?;

    assert_eq!(config.cache.capacity_for(RECORDS_CACHE)?, 500);
    assert_eq!(config.cache.capacity_for(REPORTS_CACHE)?, 64);
    assert_eq!(config.pool.max_workers, 4);
    assert_eq!(config.pool.grace_ms, 3_000);
    assert_eq!(config.audit.rotation_bytes, 4096);
    assert_eq!(config.refresh.interval_secs, 300);
    Ok(())
}

#[test]
fn zero_capacity_names_the_cache() {
    let mut config = CoreConfig::default();
    config.cache.capacities.insert("reports".into(), 0);
    match config.validate() {
        Err(ConfigError::ZeroCapacity { name }) => assert_eq!(name, "reports"),
        other => panic!("unexpected validation result: {other:?}"),
    }
}

#[test]
fn inconsistent_worker_bounds_are_rejected() {
    let mut config = CoreConfig::default();
    config.pool.min_workers = 6;
    config.pool.max_workers = 3;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::WorkerBounds { min: 6, max: 3 })
    ));
}

#[test]
fn zero_refresh_interval_is_rejected() {
    let mut config = CoreConfig::default();
    config.refresh.interval_secs = 0;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ZeroDuration { .. })
    ));
}

#[test]
fn malformed_file_reports_its_path() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("gradekeeper.toml");
    std::fs::write(&path, "[pool\nmin_workers = ")?;

    match CoreConfig::from_file(&path) {
        Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("unexpected parse result: {other:?}"),
    }
    Ok(())
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = CoreConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
