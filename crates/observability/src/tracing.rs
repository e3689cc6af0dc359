//! Subscriber construction.
//!
//! `RUST_LOG` wins over the built-in directives when set and valid.

use tracing_subscriber::EnvFilter;

/// Directives used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVES: &str = "info";

/// Directives for tests: the archiver crates at debug, everything else quiet.
pub const TEST_DIRECTIVES: &str = "warn,retention_infra=debug,retention_core=debug";

/// Filter from `RUST_LOG`, falling back to `default_directives`.
pub fn env_filter(default_directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives))
}

/// JSON lines with timestamps and span context.
pub fn init(default_directives: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directives))
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(true)
        .try_init();
}

/// Compact output routed through the test harness's captured writer.
pub fn init_test(default_directives: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directives))
        .compact()
        .with_test_writer()
        .try_init();
}
