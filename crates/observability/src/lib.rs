//! Process-wide logging setup for the archiver.

/// Initialize JSON logging filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; only the first call installs a subscriber.
pub fn init() {
    tracing::init(tracing::DEFAULT_DIRECTIVES);
}

/// Initialize compact, test-captured logging. Safe to call from every test.
pub fn init_for_tests() {
    tracing::init_test(tracing::TEST_DIRECTIVES);
}

/// Filter and subscriber construction.
pub mod tracing;
