//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse with serde's
//! `#[serde(default = "...")]`.

pub fn default_reaper_period_secs() -> u64 {
    60
}

pub fn default_session_supersede_grace_secs() -> u64 {
    5
}

pub fn default_dispatch_slack_secs() -> u64 {
    5
}

pub fn default_log_format() -> String {
    "pretty".to_string()
}

pub fn default_database_path() -> String {
    "rportd.db".to_string()
}

pub fn default_oauth_login_uri() -> String {
    "/oauth/exchangecode".to_string()
}
