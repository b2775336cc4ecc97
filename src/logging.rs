use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::{
    config::LoggingConfig,
    error::{AppError, Result},
};

/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| AppError::Config(format!("Failed to create log filter: {e}")))?;

    let registry = Registry::default().with(env_filter);

    let initialized = if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    initialized.map_err(|e| AppError::Config(format!("Failed to install log subscriber: {e}")))?;

    tracing::info!(level = %config.level, format = %config.format, "Logging initialized");
    Ok(())
}
