use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::rl::RLConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub rl: RLConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Directory holding the engine snapshot and network weights
    pub dir: PathBuf,
    /// File stem; the network is written to `<name>_network.json`
    pub name: String,
    /// Seconds between autosaves during long-running commands (0 disables)
    pub autosave_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./models"),
            name: "rl_gem_engine".to_string(),
            autosave_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON formatted logs
    pub json: bool,
    /// Optional directory for daily-rotated log files
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("GEMSCOUT_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (GEMSCOUT__RL__AGENT__BACKEND, etc.)
            .add_source(
                Environment::with_prefix("GEMSCOUT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load a single explicit file on top of the built-in defaults
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()).required(true))
            .add_source(
                Environment::with_prefix("GEMSCOUT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = match self.rl.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };

        if self.persistence.name.trim().is_empty() {
            errors.push("persistence.name must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_yields_defaults() {
        let config = AppConfig::load_from("/nonexistent/gemscout-config").unwrap();
        assert_eq!(config.persistence.name, "rl_gem_engine");
        assert_eq!(config.rl.environment.initial_balance, 10_000.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("gemscout_cfg_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("custom.toml");
        std::fs::write(
            &path,
            "[rl.agent]\nbackend = \"heuristic\"\n\n[persistence]\nname = \"alt\"\n",
        )
        .unwrap();

        let config = AppConfig::load_file(&path).unwrap();
        assert_eq!(config.rl.agent.backend, crate::rl::PolicyBackend::Heuristic);
        assert_eq!(config.persistence.name, "alt");
        assert_eq!(config.rl.agent.epsilon_decay, 0.995);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
