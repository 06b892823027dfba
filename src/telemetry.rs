//! Tracing setup for binaries embedding the core.

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter` when set.
pub fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .with_context(|| format!("invalid log filter '{}'", default_filter))?,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}
