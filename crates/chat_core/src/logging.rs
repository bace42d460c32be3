use tracing_subscriber::EnvFilter;

use crate::error::{ChatError, Result};

/// Installs the global fmt subscriber. `RUST_LOG` wins over the configured level.
pub fn init(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(true)
        .try_init()
        .map_err(ChatError::LoggingInit)
}
