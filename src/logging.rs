//! Logger setup.

/// Initializes env_logger.
///
/// `RUST_LOG` wins when it is set, otherwise `level` is used as the filter.
/// Calling this more than once is harmless.
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, level);

    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .try_init();
}
