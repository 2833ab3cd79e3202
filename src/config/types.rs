//! Configuration type definitions.
//!
//! All the sub-config structs used by the main [`Config`].

use serde::Deserialize;

use super::defaults::{
    default_dispatch_slack_secs, default_log_format, default_oauth_login_uri,
    default_reaper_period_secs, default_session_supersede_grace_secs,
};

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity.
    pub server: ServerConfig,
    /// Durable store configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Client retention / obsolescence policy.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Dispatcher policy defaults.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Local and OAuth authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Group-based authorization configuration.
    #[serde(default)]
    pub groups: GroupsConfig,
}

/// Log output format, matching `tracing_subscriber`'s pretty/json split.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name, used in logs and audit trails.
    pub name: String,
    /// Log output format.
    #[serde(default = "default_log_format")]
    pub log_format_raw: String,
}

impl ServerConfig {
    pub fn log_format(&self) -> LogFormat {
        match self.log_format_raw.as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Durable store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file, or `:memory:`.
    #[serde(default = "super::defaults::default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: super::defaults::default_database_path(),
        }
    }
}

/// Client retention / obsolescence policy (spec.md §4.2, §4.8).
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// How long a disconnected client is kept before becoming obsolete.
    /// Unset means "no client is ever obsolete" (the noObsoleteProvider
    /// behavior).
    #[serde(default, with = "humantime_serde_opt")]
    pub keep_disconnected_clients: Option<std::time::Duration>,
    /// How often the reaper task runs.
    #[serde(default = "default_reaper_period_secs")]
    pub reaper_period_secs: u64,
}

impl RetentionConfig {
    pub fn reaper_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reaper_period_secs)
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_disconnected_clients: None,
            reaper_period_secs: default_reaper_period_secs(),
        }
    }
}

/// Dispatcher policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Optional cap on concurrently-dispatched clients within one multi-job.
    #[serde(default)]
    pub max_concurrent_per_multi_job: Option<usize>,
    /// Grace period given to a superseded session before it is force-closed.
    #[serde(default = "default_session_supersede_grace_secs")]
    pub session_supersede_grace_secs: u64,
    /// Extra slack added on top of a job's `timeout_sec` before the dispatcher
    /// gives up waiting and marks it `unknown`.
    #[serde(default = "default_dispatch_slack_secs")]
    pub dispatch_slack_secs: u64,
}

impl DispatchConfig {
    pub fn session_supersede_grace(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session_supersede_grace_secs)
    }

    pub fn dispatch_slack(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.dispatch_slack_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_multi_job: None,
            session_supersede_grace_secs: default_session_supersede_grace_secs(),
            dispatch_slack_secs: default_dispatch_slack_secs(),
        }
    }
}

/// Authentication configuration: local credentials plus OAuth provider blocks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Configured OAuth capability blocks, keyed by provider name at startup.
    #[serde(default)]
    pub oauth: Vec<OAuthProviderBlock>,
}

/// One configured OAuth capability (spec.md §9 / §4.1; see
/// `plus/capabilities/oauth/oauth.go` in the original source).
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthProviderBlock {
    /// One of "github", "microsoft", "auth0".
    pub provider: String,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub required_organization: Option<String>,
    #[serde(default)]
    pub jwks_url: Option<String>,
    #[serde(default)]
    pub role_claim: Option<String>,
    #[serde(default)]
    pub required_role: Option<String>,
    #[serde(default)]
    pub username_claim: Option<String>,
    #[serde(default)]
    pub permitted_user_list: bool,
    #[serde(default = "default_oauth_login_uri")]
    pub login_uri: String,
}

/// Group-based authorization configuration (spec.md §4.7).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupsConfig {
    /// Any user belonging to one of these groups sees every client,
    /// bypassing `allowed_user_groups` intersection.
    #[serde(default)]
    pub admin_groups: Vec<String>,
}

/// Minimal `humantime`-style (de)serialization for `Option<Duration>` without
/// pulling in the `humantime-serde` crate: accepts a plain integer (seconds)
/// or an RFC3339-ish "Xs"/"Xm"/"Xh" suffix, same as the original's
/// `viper`-backed `time.Duration` parsing.
mod humantime_serde_opt {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw else { return Ok(None) };
        parse_duration(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom)
    }

    fn parse_duration(raw: &str) -> Result<Duration, String> {
        let raw = raw.trim();
        if let Some(secs) = raw.strip_suffix('s') {
            return secs
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| e.to_string());
        }
        if let Some(mins) = raw.strip_suffix('m') {
            return mins
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|e| e.to_string());
        }
        if let Some(hours) = raw.strip_suffix('h') {
            return hours
                .parse::<u64>()
                .map(|h| Duration::from_secs(h * 3600))
                .map_err(|e| e.to_string());
        }
        raw.parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| format!("invalid duration: '{raw}'"))
    }

}
