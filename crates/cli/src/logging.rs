//! Tracing setup: `RUST_LOG`-driven filtering, falling back to `info` for
//! this crate and `dominds_core` when unset.
pub fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
