//! Logger bootstrap for embedding hosts and tests.

/// Initialize logging for standalone hosts.
///
/// Respects RUST_LOG, defaults to `info`.
pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

/// Like `init_logger` but tolerates repeated calls (tests).
pub fn try_init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .is_test(true)
        .try_init();
}
