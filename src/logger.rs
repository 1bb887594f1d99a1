use log::LevelFilter;

/// Level used when `RUST_LOG` is not set.
pub fn default_level(quiet: bool, verbose: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Warn
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Initialise the global logger. `RUST_LOG` overrides the flag-derived level.
/// Calling it again is harmless.
pub fn init(quiet: bool, verbose: bool) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(default_level(quiet, verbose))
        .format_timestamp_millis()
        .parse_default_env();
    let _ = builder.try_init();
}
