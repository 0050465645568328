// SettingsLoader - layered settings builder

use crate::env::EnvLoader;
use crate::loader::{ConfigLoader, merge};
use crate::settings::Settings;
use crate::validation::Validate;
use crate::{ConfigError, Result};
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

/// Default environment variable prefix
pub const DEFAULT_PREFIX: &str = "SWITCHYARD";

/// Builder for [`Settings`]
///
/// Layers apply in a fixed order regardless of call order: defaults, then
/// config files in the order added, then the `.env` file, then the process
/// environment.
pub struct SettingsLoader {
    prefix: String,
    load_env: bool,
    load_dotenv: bool,
    dotenv_path: Option<PathBuf>,
    config_files: Vec<PathBuf>,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            load_env: false,
            load_dotenv: false,
            dotenv_path: None,
            config_files: Vec::new(),
        }
    }

    /// Set environment variable prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Enable loading from environment variables
    pub fn load_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Enable loading from a .env file; `None` looks for `.env` in the
    /// working directory and its parents and skips silently if absent.
    pub fn load_dotenv(mut self, path: Option<PathBuf>) -> Self {
        self.load_dotenv = true;
        self.dotenv_path = path;
        self
    }

    /// Add a configuration file; the format is chosen by extension
    pub fn add_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_files.push(path.into());
        self
    }

    /// Build and validate the settings
    pub fn build(self) -> Result<Settings> {
        let mut tree = serde_json::to_value(Settings::default())
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;

        for path in &self.config_files {
            let loader = ConfigLoader::auto(path)?;
            merge(&mut tree, loader.load_file(path)?);
            debug!("Loaded configuration file {}", path.display());
        }

        let env = EnvLoader::new(Some(self.prefix.clone()));

        if self.load_dotenv {
            let pairs = self.read_dotenv()?;
            merge(&mut tree, env.load_from(pairs));
        }

        if self.load_env {
            merge(&mut tree, env.load());
        }

        let settings = Self::deserialize(tree)?;
        settings.validate()?;
        Ok(settings)
    }

    fn read_dotenv(&self) -> Result<Vec<(String, String)>> {
        let iter = match self.dotenv_path {
            Some(ref path) => {
                dotenvy::from_path_iter(path).map_err(|e| ConfigError::LoadError(e.to_string()))?
            }
            None => match dotenvy::dotenv_iter() {
                Ok(iter) => iter,
                Err(e) if e.not_found() => return Ok(Vec::new()),
                Err(e) => return Err(ConfigError::LoadError(e.to_string())),
            },
        };

        iter.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn deserialize(tree: Value) -> Result<Settings> {
        serde_json::from_value(tree).map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}
