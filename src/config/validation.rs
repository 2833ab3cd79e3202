//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.
//! Per spec.md §7, a `ConfigInvalid` error is rejected at load time and
//! never reaches the core at runtime.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("database.path is required")]
    MissingDatabasePath,
    #[error("oauth provider block {0} is missing a recognized provider name")]
    UnknownOAuthProvider(String),
    #[error("oauth provider block {0} is missing client_id")]
    MissingOAuthClientId(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    if config.database.path.is_empty() {
        errors.push(ValidationError::MissingDatabasePath);
    }

    for block in &config.auth.oauth {
        if !matches!(block.provider.as_str(), "github" | "microsoft" | "auth0") {
            errors.push(ValidationError::UnknownOAuthProvider(block.provider.clone()));
        }
        if block.client_id.is_empty() {
            errors.push(ValidationError::MissingOAuthClientId(block.provider.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid_config() -> String {
        r#"
[server]
name = "rportd-1"

[database]
path = "rportd.db"
"#
        .to_string()
    }

    #[test]
    fn valid_config_passes() {
        let config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn empty_server_name_fails() {
        let toml = r#"
[server]
name = ""

[database]
path = "rportd.db"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingServerName)));
    }

    #[test]
    fn unknown_oauth_provider_fails() {
        let toml = r#"
[server]
name = "rportd-1"

[database]
path = "rportd.db"

[[auth.oauth]]
provider = "bitbucket"
authorize_url = "https://example.com/authorize"
token_url = "https://example.com/token"
redirect_uri = "https://rportd.example.com/cb"
client_id = "abc"
client_secret = "xyz"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::UnknownOAuthProvider(_)))
        );
    }
}
