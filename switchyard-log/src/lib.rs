//! Switchyard Logging
//!
//! Installs a [`tracing`] subscriber for the Switchyard crates, which all log
//! through the `tracing` macros.
//!
//! # Features
//!
//! - **Environment-controlled**: `SWITCHYARD_DEBUG=1` enables debug logging
//! - **Structured logging**: JSON output by default
//! - **`RUST_LOG` aware**: a `RUST_LOG` filter takes precedence over the
//!   configured level
//!
//! # Usage
//!
//! ```rust
//! use switchyard_log::{Format, Level, LogConfig};
//!
//! let config = LogConfig::new(Level::Debug, Format::Compact);
//! tracing::subscriber::with_default(config.subscriber(), || {
//!     tracing::debug!(service = "checkout", "Registered instance");
//! });
//! ```
//!
//! # Environment Variables
//!
//! - `SWITCHYARD_DEBUG=1` - Enable debug logging
//! - `SWITCHYARD_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `SWITCHYARD_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `SWITCHYARD_LOG_COLOR=1|0` - Enable/disable colors
//! - `SWITCHYARD_LOG_MODULE=1|0` - Include the event target

use std::env;
use std::str::FromStr;
use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level for emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    Debug,
    Info,
    Warn,
    /// Error level (least verbose)
    Error,
    /// Off (no logging)
    Off,
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "off" | "none" => Ok(Level::Off),
            _ => Err(format!("unknown log level '{}'", s)),
        }
    }
}

impl Level {
    /// Filter directive understood by [`EnvFilter`].
    pub fn as_directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_directive().to_uppercase())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Format::Pretty),
            "compact" => Ok(Format::Compact),
            "json" => Ok(Format::Json),
            _ => Err(format!("unknown log format '{}'", s)),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Errors raised while installing the subscriber.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("Failed to install global subscriber: {0}")]
    Init(String),
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether ANSI colors are enabled
    pub color: bool,
    /// Whether to include the event target
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: Format::Json,
            color: false,
            module_path: true,
        }
    }
}

fn truthy(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}

impl LogConfig {
    pub fn new(level: Level, format: Format) -> Self {
        Self {
            level,
            format,
            ..Self::default()
        }
    }

    /// Create config from the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `SWITCHYARD_*` environment overrides on top of this config.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides read through `lookup`, keyed by variable name.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug = lookup("SWITCHYARD_DEBUG").is_some_and(|v| truthy(&v));

        let level = lookup("SWITCHYARD_LOG_LEVEL").and_then(|s| s.parse::<Level>().ok());
        if let Some(level) = level {
            self.level = level;
        } else if debug && self.level > Level::Debug {
            self.level = Level::Debug;
        }

        let format = lookup("SWITCHYARD_LOG_FORMAT").and_then(|s| s.parse::<Format>().ok());
        if let Some(format) = format {
            self.format = format;
        }

        if let Some(color) = lookup("SWITCHYARD_LOG_COLOR") {
            self.color = truthy(&color);
        }

        if let Some(module) = lookup("SWITCHYARD_LOG_MODULE") {
            self.module_path = truthy(&module);
        }

        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Build the event filter, preferring `RUST_LOG` when it is set and valid.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_directive()))
    }

    fn fmt_layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync + 'static>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(self.color)
            .with_target(self.module_path);

        match self.format {
            Format::Pretty => layer.pretty().boxed(),
            Format::Compact => layer.compact().boxed(),
            Format::Json => layer.json().boxed(),
        }
    }

    /// Create a subscriber for this config without installing it.
    pub fn subscriber(&self) -> impl Subscriber + Send + Sync + 'static {
        tracing_subscriber::registry()
            .with(self.filter())
            .with(self.fmt_layer())
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Install `config` as the global subscriber.
///
/// Does nothing if a global subscriber is already installed.
pub fn init(config: &LogConfig) {
    let _ = try_init(config);
}

/// Install `config` as the global subscriber, reporting a second
/// installation as an error.
pub fn try_init(config: &LogConfig) -> Result<(), LogError> {
    config
        .subscriber()
        .try_init()
        .map_err(|e| LogError::Init(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
