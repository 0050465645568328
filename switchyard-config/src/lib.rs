// Layered configuration for the Switchyard control plane
//
// Settings are assembled from built-in defaults, JSON/TOML/env files, a
// `.env` file and `SWITCHYARD_*` environment variables, later layers
// overriding earlier ones key by key.

pub mod builder;
pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use builder::{DEFAULT_PREFIX, SettingsLoader};
pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat, merge};
pub use settings::{DiscoverySettings, FlagSettings, LogSettings, Settings};
pub use validation::{ConfigValidator, Validate};

impl Settings {
    /// Load settings from `.env` (if present) and the `SWITCHYARD_*`
    /// environment on top of the defaults.
    pub fn load() -> Result<Self> {
        SettingsLoader::new().load_dotenv(None).load_env().build()
    }
}
