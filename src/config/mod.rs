//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, RetentionConfig, ...)
//! - [`defaults`]: `serde(default = "...")` helper functions
//! - [`validation`]: startup config validation

mod defaults;
mod types;
mod validation;

pub use types::{
    AuthConfig, Config, DatabaseConfig, DispatchConfig, GroupsConfig, LogFormat,
    OAuthProviderBlock, RetentionConfig, ServerConfig,
};
pub use validation::{ValidationError, validate};

use std::path::Path;
use thiserror::Error;

/// Configuration load errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    /// Load and parse a TOML config file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        Ok(config)
    }

    /// A minimal config for unit tests elsewhere in the crate, equivalent to
    /// parsing `[server]\nname = "test"`.
    #[cfg(test)]
    pub fn default_for_tests() -> Self {
        toml::from_str("[server]\nname = \"test\"\n").expect("static test config parses")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_errors() {
        let err = Config::load(Path::new("/nonexistent/rportd.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn retention_defaults_to_unset() {
        let toml = r#"
[server]
name = "rportd-1"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.retention.keep_disconnected_clients.is_none());
        assert_eq!(config.retention.reaper_period_secs, 60);
    }

    #[test]
    fn load_reads_a_real_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rportd.toml");
        std::fs::write(
            &path,
            "[server]\nname = \"rportd-1\"\n\n[retention]\nkeep_disconnected_clients = \"1h\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.name, "rportd-1");
        assert_eq!(
            config.retention.keep_disconnected_clients,
            Some(std::time::Duration::from_secs(3600))
        );
    }
}
