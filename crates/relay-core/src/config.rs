//! Configuration management for Relay
//!
//! Handles loading and saving the backend launch settings and the small set
//! of host preferences.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend process settings
    #[serde(default)]
    pub backend: BackendConfig,
    /// General application settings
    #[serde(default)]
    pub general: GeneralConfig,
}

/// How to launch and supervise the backend process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Executable name or path
    pub command: String,
    /// Arguments passed to the executable
    pub args: Vec<String>,
    /// Working directory for the process (inherits ours when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Re-spawn attempts after a crash before giving up
    pub max_reconnect_attempts: u32,
    /// Liveness check period
    pub watchdog_interval_ms: u64,
    /// Delay before the first reconnect attempt; doubles per attempt
    pub initial_backoff_ms: u64,
    /// How long disconnect waits for the process to exit before killing it
    pub shutdown_timeout_ms: u64,
    /// Log every request and event line at debug level
    pub trace_protocol: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: "codebuff".to_string(),
            args: vec!["ide".to_string(), "--stdio".to_string()],
            working_dir: None,
            max_reconnect_attempts: 5,
            watchdog_interval_ms: 1000,
            initial_backoff_ms: 1000,
            shutdown_timeout_ms: 3000,
            trace_protocol: false,
        }
    }
}

impl BackendConfig {
    /// Backend launched as `command args...`
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            ..Self::default()
        }
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Render tool call and tool result events
    pub show_tool_calls: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            show_tool_calls: true,
        }
    }
}

/// Configuration manager for loading and saving config
pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    /// Create a config manager with a specific path
    pub fn with_path(config_path: PathBuf) -> Result<Self> {
        let config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            Config::default()
        };

        Ok(Self { config_path, config })
    }

    /// Get the default config path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("relay").join("config.toml"))
    }

    fn load_from_path(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&self.config_path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Point the backend at a different executable
    pub fn set_backend_command(&mut self, command: impl Into<String>) {
        self.config.backend.command = command.into();
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            config_path: PathBuf::from("config.toml"),
            config: Config::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend.command, "codebuff");
        assert_eq!(config.backend.args, vec!["ide", "--stdio"]);
        assert_eq!(config.backend.max_reconnect_attempts, 5);
        assert_eq!(config.backend.watchdog_interval(), Duration::from_secs(1));
        assert_eq!(config.backend.initial_backoff(), Duration::from_secs(1));
        assert!(!config.backend.trace_protocol);
        assert!(config.general.show_tool_calls);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[backend]"));
        assert!(toml_str.contains("max_reconnect_attempts = 5"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.backend, config.backend);
    }

    #[test]
    fn test_partial_backend_section() {
        let parsed: Config = toml::from_str(
            r#"
            [backend]
            command = "/opt/codebuff/bin/codebuff"
            max_reconnect_attempts = 2
            "#,
        )
        .unwrap();

        assert_eq!(parsed.backend.command, "/opt/codebuff/bin/codebuff");
        assert_eq!(parsed.backend.max_reconnect_attempts, 2);
        assert_eq!(parsed.backend.args, vec!["ide", "--stdio"]);
        assert_eq!(parsed.general.log_level, "warn");
    }

    #[test]
    fn test_backend_new_keeps_defaults() {
        let backend = BackendConfig::new("cat", vec![]);
        assert_eq!(backend.command, "cat");
        assert!(backend.args.is_empty());
        assert_eq!(backend.shutdown_timeout(), Duration::from_secs(3));
    }
}
