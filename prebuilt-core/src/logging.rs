/// Initialize tracing for tests with sensible defaults.
///
/// Log output goes through the test writer, so it only shows up for failing tests.  Safe to call
/// from any number of tests; only the first call installs the subscriber.
///
/// # Log Level
///
/// Defaults to DEBUG level, but can be overridden by setting `PREBUILT_LOG` or `RUST_LOG`
/// environment variables before running tests (`PREBUILT_LOG` takes priority).
pub(crate) fn init_test_logging() {
    use std::sync::OnceLock;
    use tracing_subscriber::{EnvFilter, fmt};

    static INIT: OnceLock<()> = OnceLock::new();

    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_env("PREBUILT_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("debug"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}
