// Test logging setup.

use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

/// Installs a test-friendly subscriber once per test binary.
/// `RUST_LOG` overrides the default `debug` filter.
pub fn init_test_logging() {
    INIT.get_or_init(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("diskjanitor=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
