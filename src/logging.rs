use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (e.g. `info`, `debug`,
/// `payout_sheet=trace`) is used.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Debug-level logging captured by the test harness.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
