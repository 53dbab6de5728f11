use tracing_subscriber::EnvFilter;

/// Environment variable holding the `tracing` filter directive.
pub const LOG_ENV: &str = "GRADEKEEPER_LOG";

/// Installs the global `tracing` subscriber writing to stderr.
///
/// The filter is read from `GRADEKEEPER_LOG` (for example
/// `gradekeeper=debug`) and defaults to `info`. Calling this more than once
/// is harmless; only the first call installs a subscriber.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init();
}
