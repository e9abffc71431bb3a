//! Tracing subscriber wiring.
//!
//! The runtime instruments its operations with `tracing`; this module wires
//! a reasonable default subscriber (env-filter + fmt + error-context layer)
//! for binaries and tests that want one. Libraries embedding duraloom
//! typically install their own subscriber instead.

use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the default subscriber, ignoring failure if one is already set.
pub fn init() {
    let _ = try_init();
}

/// Install the default subscriber: `RUST_LOG`-driven filtering (default
/// `info`), compact fmt output, and span-trace capture for errors.
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(ErrorLayer::default())
        .try_init()
}
