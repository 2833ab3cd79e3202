//! Job and MultiJob domain types (spec.md §4.5 JobStore, C5).
//!
//! These are plain value types; persistence lives in [`crate::db::jobs`] and
//! the durable+serialized store sits in [`store`].

mod store;

pub use store::{JobFilter, JobStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status lifecycle for a single Job. Transitions are monotone: `Running` may
/// move once to exactly one terminal state; terminal states are frozen
/// (spec.md §4.5 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Successful,
    Failed,
    Unknown,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Successful => "successful",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        }
    }

    pub fn from_str(raw: &str) -> Self {
        match raw {
            "successful" => JobStatus::Successful,
            "failed" => JobStatus::Failed,
            "unknown" => JobStatus::Unknown,
            _ => JobStatus::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// The inputs needed to run a command on one client (spec.md §4.4 command
/// channel): carried end-to-end from `Dispatcher` through `ClientSession`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    pub command: String,
    pub interpreter: Option<String>,
    pub cwd: Option<String>,
    #[serde(default)]
    pub is_sudo: bool,
    pub timeout_sec: u64,
}

/// A command executed on one client, with recorded status and output
/// (spec.md §3 Job entity).
#[derive(Debug, Clone)]
pub struct Job {
    pub jid: String,
    pub client_id: String,
    pub multi_job_id: Option<String>,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i64>,
    pub command: String,
    pub interpreter: Option<String>,
    pub cwd: Option<String>,
    pub is_sudo: bool,
    pub timeout_sec: u64,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
    pub created_by: String,
}

impl Job {
    pub fn new_running(
        jid: String,
        client_id: String,
        multi_job_id: Option<String>,
        spec: JobSpec,
        created_by: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            jid,
            client_id,
            multi_job_id,
            status: JobStatus::Running,
            started_at: now,
            finished_at: None,
            exit_code: None,
            command: spec.command,
            interpreter: spec.interpreter,
            cwd: spec.cwd,
            is_sudo: spec.is_sudo,
            timeout_sec: spec.timeout_sec,
            stdout: String::new(),
            stderr: String::new(),
            error: None,
            created_by,
        }
    }

    /// Synthesize a job that never ran because its client was offline
    /// (spec.md §4.6 dispatch step 3, "not connected").
    pub fn offline(
        jid: String,
        client_id: String,
        multi_job_id: Option<String>,
        spec: JobSpec,
        created_by: String,
        now: DateTime<Utc>,
    ) -> Self {
        let mut job = Self::new_running(jid, client_id, multi_job_id, spec, created_by, now);
        job.finish_failed("client not connected".into(), now);
        job
    }

    /// Synthesize a job skipped by a sequential abort-on-error batch
    /// (spec.md §8 scenario 4).
    pub fn aborted(
        jid: String,
        client_id: String,
        multi_job_id: Option<String>,
        spec: JobSpec,
        created_by: String,
        now: DateTime<Utc>,
    ) -> Self {
        let mut job = Self::new_running(jid, client_id, multi_job_id, spec, created_by, now);
        job.finish_failed("aborted due to prior failure".into(), now);
        job
    }

    pub fn finish_success(
        &mut self,
        exit_code: Option<i64>,
        stdout: String,
        stderr: String,
        now: DateTime<Utc>,
    ) {
        self.status = JobStatus::Successful;
        self.exit_code = exit_code;
        self.stdout = stdout;
        self.stderr = stderr;
        self.finished_at = Some(now);
    }

    pub fn finish_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.finished_at = Some(now);
    }

    /// Timeout or cooperative cancellation (spec.md §7 Timeout/Canceled).
    pub fn finish_unknown(&mut self, error: String, now: DateTime<Utc>) {
        self.status = JobStatus::Unknown;
        self.error = Some(error);
        self.finished_at = Some(now);
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Successful
    }
}

/// A command fanned out to several clients (spec.md §3 MultiJob entity).
#[derive(Debug, Clone)]
pub struct MultiJob {
    pub jid: String,
    pub started_at: DateTime<Utc>,
    pub created_by: String,
    pub client_ids: Vec<String>,
    pub command: String,
    pub timeout_sec: u64,
    pub concurrent: bool,
    pub abort_on_err: bool,
    pub jobs: Vec<Job>,
}

impl MultiJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jid: String,
        created_by: String,
        client_ids: Vec<String>,
        command: String,
        timeout_sec: u64,
        concurrent: bool,
        abort_on_err: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let mut seen = std::collections::HashSet::new();
        let client_ids = client_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        Self {
            jid,
            started_at: now,
            created_by,
            client_ids,
            command,
            timeout_sec,
            concurrent,
            abort_on_err,
            jobs: Vec::new(),
        }
    }

    /// Overall state, derived from constituent Jobs (spec.md §7 Testable
    /// Properties): successful iff every Job is successful. A MultiJob with
    /// zero constituent jobs (empty permitted set) is successful.
    pub fn derived_status(&self) -> JobStatus {
        if self.jobs.iter().all(Job::is_success) {
            JobStatus::Successful
        } else {
            JobStatus::Failed
        }
    }
}
