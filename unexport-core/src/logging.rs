//! Logging setup using **tracing**.
//!
//! Library code only emits events; the binary installs the subscriber once.
//! Diagnostics (affected packages, safe/unsafe lists) are `info` events, so
//! they show up with `--verbose` or `RUST_LOG=unexport_core=info`.

use tracing_subscriber::EnvFilter;

/// Default filter directive when `RUST_LOG` is unset.
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "info"
    } else {
        "warn"
    }
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Initializes the global tracing subscriber.
///
/// Writes to stderr so stdout stays reserved for the summary and the JSON
/// report. With `json` set, every event is a JSON object (level, target,
/// fields); otherwise a compact human-readable line.
///
/// # Environment Variables
/// - `RUST_LOG`: overrides the level chosen from `verbose`
pub fn init_logging(verbose: bool, json: bool) {
    if json {
        init_structured_logging(verbose);
        return;
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .try_init();
}

/// Initializes the JSON subscriber.
pub fn init_structured_logging(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_level(true)
        .with_target(true)
        .with_current_span(true)
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr)
        .try_init();
}
