//! Tracing setup for the binary.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Map `-v` count to a level: WARN, INFO, DEBUG, then TRACE.
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// `rust_log` directives when given and valid, otherwise the `-v` level.
fn filter_for(verbosity: u8, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::default().add_directive(level_for(verbosity).into()))
}

/// Install a compact stderr subscriber. A set `RUST_LOG` takes precedence
/// over the verbosity level.
pub fn init(verbosity: u8) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter_for(verbosity, rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();

    // Already set in tests
    let _ = tracing::subscriber::set_global_default(subscriber);
}
