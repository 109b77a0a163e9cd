//! Logging setup for the `dna` binary.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor the manifest sets one.
const DEFAULT_FILTER: &str = "warn";

/// Initialize logging.
///
/// Precedence: `RUST_LOG`, then `verbose` (`debug`), then `filter` from
/// `[logging]` in `dna.toml`. With none set, only warnings and errors show.
pub fn init_logging(filter: Option<&str>, verbose: bool) {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) if verbose => EnvFilter::new("debug"),
        Err(_) => EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER)),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(env_filter)
        .init();
}
