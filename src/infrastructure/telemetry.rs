//! Structured logging setup.

const DEFAULT_FILTER: &str = "deadline_scheduler=info";

/// Installs a stderr fmt subscriber filtered by `RUST_LOG`, falling back to
/// `deadline_scheduler=info`. Does nothing when a subscriber is already set.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
