//! Utility functions.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for tests. `RUST_LOG` wins over the default filter;
/// repeated calls are harmless.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("flowstate_core=debug,flowstate_dsl=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
