use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use wirekit::Signal;

/// Application configuration: typed global sections plus a free-form
/// per-component bag.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Logging configuration (optional, uses defaults if None).
    pub logging: Option<LoggingConfig>,
    /// Container lifecycle settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Per-component configuration bag: component name → arbitrary YAML/JSON value.
    #[serde(default)]
    pub components: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Signals cancelling the container in addition to Ctrl+C.
    #[serde(default)]
    pub signals: Vec<Signal>,
    /// Upper bound for the shutdown phase; 0 means no deadline.
    #[serde(default)]
    pub shutdown_timeout_sec: u64,
}

/// Logging configuration: target prefix → section.
/// Key "default" is the catch-all for targets without their own section.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/wirekit.log"; empty disables the file sink
    #[serde(default)]
    pub file_level: String,
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration for component '{component}'")]
    Missing { component: String },
    #[error("invalid configuration for component '{component}'")]
    Invalid {
        component: String,
        #[source]
        source: serde_json::Error,
    },
}

pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: "logs/wirekit.log".to_string(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: Some(default_logging_config()),
            runtime: RuntimeConfig::default(),
            components: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Layered loading: defaults → YAML file → environment variables.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        // Optional sections stay None unless YAML/ENV provide them.
        let base = AppConfig {
            logging: None,
            runtime: RuntimeConfig::default(),
            components: HashMap::new(),
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(config_path.as_ref()))
            // APP__RUNTIME__SHUTDOWN_TIMEOUT_SEC=5 maps to runtime.shutdown_timeout_sec
            .merge(Env::prefixed("APP__").split("__"));

        figment.extract().with_context(|| {
            format!(
                "Failed to load config from '{}'",
                config_path.as_ref().display()
            )
        })
    }

    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            match args.verbose {
                0 => {}
                1 => default_section.console_level = "debug".to_string(),
                _ => default_section.console_level = "trace".to_string(),
            }
        }
    }

    /// Typed view of one entry of the `components` bag.
    pub fn component_config<T: DeserializeOwned>(&self, component: &str) -> Result<T, ConfigError> {
        let raw = self
            .components
            .get(component)
            .ok_or_else(|| ConfigError::Missing {
                component: component.to_string(),
            })?;
        serde_json::from_value(raw.clone()).map_err(|source| ConfigError::Invalid {
            component: component.to_string(),
            source,
        })
    }

    /// Like `component_config`, falling back to `T::default()` when the entry is absent.
    pub fn component_config_or_default<T: DeserializeOwned + Default>(
        &self,
        component: &str,
    ) -> Result<T, ConfigError> {
        match self.component_config(component) {
            Err(ConfigError::Missing { .. }) => Ok(T::default()),
            other => other,
        }
    }
}

/// Command line arguments that override loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// `-v` count: 1 raises the default console level to debug, 2+ to trace.
    pub verbose: u8,
}
