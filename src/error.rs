// Error types for the control plane

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] switchyard_config::ConfigError),

    #[error("Feature flag error: {0}")]
    Flag(#[from] switchyard_flags::FlagError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] switchyard_discovery::DiscoveryError),

    #[error("Logging error: {0}")]
    Log(#[from] switchyard_log::LogError),
}

pub type Result<T> = std::result::Result<T, Error>;
