//! Tracing subscriber setup for binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERBOSE_FILTER: &str = "debug,data=trace";

/// Install the global subscriber.
///
/// `RUST_LOG` decides the filter, falling back to `info`. `verbose` forces
/// `debug`, with the data engine at `trace` so executed SQL shows up next to
/// its transaction events.
pub fn init_tracing(verbose: bool) {
    tracing_subscriber::registry()
        .with(filter(verbose))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    }
}
