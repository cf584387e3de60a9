//! Logging helpers

/// Initialize the logger
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialization (tests, embedding hosts) is not an error.
    let _ = env_logger::Builder::from_env(env).try_init();
}
