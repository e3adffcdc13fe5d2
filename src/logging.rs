//! Diagnostic logging setup.
//!
//! Diagnostics go to stderr. Stdout is reserved for the structured output
//! each command documents (identifiers, JSON, signal lines).

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub fn default_level(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "warn" }
}

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
/// Calling this more than once is harmless.
pub fn init(verbose: bool) {
    let level = default_level(verbose);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .try_init();
}
