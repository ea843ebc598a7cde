//! Tracing subscriber setup for the `matting` binary.
//!
//! Library crates only emit events. The binary installs a registry with an
//! [`EnvFilter`] and a compact fmt layer; `RUST_LOG` takes precedence over
//! the `-v` count.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter directive for a `-v` count.
pub const fn verbosity_to_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Filter from `RUST_LOG`, or from the verbosity when it is unset.
pub fn env_filter(verbosity: u8) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(verbosity_to_filter(verbosity))?),
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails when the filter cannot be parsed or a subscriber is already set.
pub fn init_tracing(verbosity: u8) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    Registry::default()
        .with(env_filter(verbosity)?)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
