//! Integration test common infrastructure.
//!
//! Builds an in-memory [`Fleet`] (config + `:memory:` SQLite) the way the
//! crate's own unit tests do, plus a scripted [`Transport`] so scenarios can
//! control exactly what a "client" does without a real wire protocol.

use async_trait::async_trait;
use rportd_fleet::config::Config;
use rportd_fleet::db::Database;
use rportd_fleet::error::SessionError;
use rportd_fleet::jobs::JobSpec;
use rportd_fleet::state::{ClientSession, Fleet, JobOutcome, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A minimal valid config, equivalent to the crate's own
/// `Config::default_for_tests`.
pub fn test_config() -> Config {
    toml::from_str("[server]\nname = \"test\"\n").expect("static test config parses")
}

pub async fn test_fleet() -> Fleet {
    let db = Database::new(":memory:").await.expect("in-memory db opens");
    Fleet::new(test_config(), db).await.expect("fleet constructs")
}

/// A transport whose outcome and latency are fixed up front, for
/// deterministic dispatch scenarios (spec.md §8).
pub struct ScriptedTransport {
    pub exit_code: Option<i64>,
    pub delay: Option<Duration>,
    closed: AtomicBool,
}

impl ScriptedTransport {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            exit_code: Some(0),
            delay: None,
            closed: AtomicBool::new(false),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            exit_code: Some(1),
            delay: None,
            closed: AtomicBool::new(false),
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            exit_code: Some(0),
            delay: Some(delay),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn run_job(&self, _spec: &JobSpec) -> Result<JobOutcome, SessionError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(JobOutcome {
            exit_code: self.exit_code,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn cancel_job(&self) {}

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Attach a scripted client to `fleet` and return its session handle.
pub async fn attach_scripted(fleet: &Fleet, id: &str, transport: Arc<ScriptedTransport>) -> Arc<ClientSession> {
    fleet
        .attach(id.to_string(), "auth".into(), "box".into(), transport)
        .await
        .expect("attach succeeds")
}
