/// Initialize the global `tracing` subscriber from `RUST_LOG`, falling back
/// to a sane default filter when it is unset or invalid.
pub fn init(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .try_init();
}
