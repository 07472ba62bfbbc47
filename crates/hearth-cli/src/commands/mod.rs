//! CLI commands.

pub mod chat;
pub mod imagine;
pub mod info;
pub mod status;
pub mod stop;

use hearth_chat::{Assistant, HearthConfig};

/// Load configuration from the environment and `.env`.
pub(crate) fn load_config() -> miette::Result<HearthConfig> {
    HearthConfig::from_env().map_err(|e| miette::miette!("Invalid configuration: {}", e))
}

pub(crate) fn assistant(config: &HearthConfig) -> miette::Result<Assistant> {
    Assistant::from_config(config).map_err(|e| miette::miette!("Invalid configuration: {}", e))
}
