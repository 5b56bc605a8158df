//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber, writing to stderr so command output stays clean.
///
/// `RUST_LOG` wins when set; otherwise `warn`, or `debug` for this crate when verbose.
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(verbose: bool, json: bool) {
    let default = if verbose { "warn,autorent=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
