use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{LoopError, Result};

/// Install the global subscriber. `RUST_LOG` wins over the configured filter.
pub fn init_tracing(cfg: &LoggingConfig) -> Result<()> {
    let filter = build_filter(cfg)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if cfg.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.map_err(|err| LoopError::Config(format!("failed to install tracing: {err}")))
}

fn build_filter(cfg: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&cfg.filter)
        .map_err(|err| LoopError::Config(format!("invalid log filter `{}`: {err}", cfg.filter)))
}
