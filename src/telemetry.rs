//! Dispatch-aware telemetry.
//!
//! Provides structured tracing spans carrying client-fleet context, so a job
//! can be correlated across its dispatch, session, and storage log lines by
//! `jid`/`multi_job_id`/`client_id` alone.
//!
//! - `DispatchTraceContext`: captures job/client/command attributes.
//! - `create_dispatch_span`/`create_session_span`: convenience constructors.
//! - `Timer`: records wall-clock duration on drop via `tracing`.

use std::time::Instant;
use tracing::{Level, Span, span};

/// Trace context for one dispatched job, mirroring the fields carried on
/// [`crate::jobs::Job`] so a span's attributes line up with its persisted row.
#[derive(Debug, Clone, Default)]
pub struct DispatchTraceContext {
    pub jid: Option<String>,
    pub multi_job_id: Option<String>,
    pub client_id: Option<String>,
    pub command: Option<String>,
    pub created_by: Option<String>,
}

impl DispatchTraceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jid(mut self, jid: impl Into<String>) -> Self {
        self.jid = Some(jid.into());
        self
    }

    pub fn with_multi_job_id(mut self, multi_job_id: impl Into<String>) -> Self {
        self.multi_job_id = Some(multi_job_id.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    /// Build a tracing span carrying every set attribute as a structured
    /// field, so downstream log lines within it inherit `jid`/`client_id`.
    pub fn into_span(self) -> Span {
        span!(
            Level::INFO,
            "dispatch.job",
            jid = self.jid.as_deref(),
            multi_job_id = self.multi_job_id.as_deref(),
            client_id = self.client_id.as_deref(),
            command = self.command.as_deref(),
            created_by = self.created_by.as_deref(),
        )
    }
}

/// Convenience constructor for a single-job dispatch span.
pub fn create_dispatch_span(jid: &str, client_id: &str, command: &str) -> Span {
    DispatchTraceContext::new()
        .with_jid(jid)
        .with_client_id(client_id)
        .with_command(command)
        .into_span()
}

/// Span for session lifecycle events (attach/detach/supersede), scoped to
/// one client id.
pub fn create_session_span(client_id: &str, event: &str) -> Span {
    span!(Level::DEBUG, "session.lifecycle", client_id = client_id, event = event)
}

/// Times a unit of work and logs its duration at debug level on drop. Unlike
/// the dispatch counters in [`crate::metrics`], this is for ad hoc timing
/// around code that isn't itself a full job dispatch (e.g. a single tunnel
/// open).
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), start: Instant::now() }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        tracing::debug!(label = %self.label, elapsed_secs = self.elapsed_secs(), "timed operation finished");
    }
}
