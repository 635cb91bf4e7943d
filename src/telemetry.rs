//! Tracing setup for binaries and tests embedding the broker.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive variable, e.g. `BROKER_LOG=inproc_broker=debug`.
pub const LOG_ENV: &str = "BROKER_LOG";

/// Install a global fmt subscriber filtered by `BROKER_LOG`.
///
/// Defaults to "info" if `BROKER_LOG` is not set. Fails if a global
/// subscriber is already installed, so tests can call it freely and ignore
/// the result.
pub fn init_tracing() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
