//! Log subscriber setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use p2pdex_types::{DexError, LogConfig, Result};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.filter`. Calling this again once a
/// subscriber is installed is a no-op.
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| {
            DexError::Configuration(format!("log filter {:?}: {e}", config.filter))
        })?,
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(config.json.then(|| fmt::layer().json()))
        .with((!config.json).then(fmt::layer))
        .try_init();
    if let Err(e) = installed {
        tracing::debug!(error = %e, "Subscriber already installed");
    }
    Ok(())
}
