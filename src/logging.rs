use env_logger::{Builder, Env};

/// Environment variable holding the log filter, checked before `RUST_LOG`
pub const LOG_ENV: &str = "MEDIASWEEP_LOG";

/// Set up the global logger.
///
/// The filter comes from `MEDIASWEEP_LOG`, then `RUST_LOG`, then falls back to
/// `warn`, or `debug` when `verbose` is set. Info lines reach the user through
/// the progress observer instead. Calling it twice is harmless.
pub fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env = if std::env::var_os(LOG_ENV).is_some() {
        Env::new().filter(LOG_ENV)
    } else {
        Env::default().default_filter_or(default_level)
    };

    let _ = Builder::from_env(env)
        .format_timestamp_secs()
        .format_target(verbose)
        .try_init();
}
