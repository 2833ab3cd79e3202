//! Dispatcher (C6): fans a command out to a MultiJob's client set.
//!
//! Holds no persistent state of its own — every read/write goes through
//! [`crate::jobs::JobStore`] (C5) and the session lookups on [`crate::state::Fleet`]
//! (C4/C2). Grounded on the fan-out/cancellation-token shape used by the
//! teacher's worker-pool style tasks: one future per target, joined with
//! `futures_util`, gated by a semaphore in concurrent mode.

use crate::error::{DispatchError, SessionError};
use crate::jobs::{Job, JobSpec, JobStatus, MultiJob};
use crate::state::Fleet;
use chrono::Utc;
use futures_util::future::join_all;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wire payload for creating a MultiJob (spec.md §6).
#[derive(Debug, Clone, Deserialize)]
pub struct MultiJobRequest {
    pub client_ids: Vec<String>,
    pub command: String,
    pub timeout_sec: u64,
    pub concurrent: bool,
    pub abort_on_err: bool,
    #[serde(default)]
    pub interpreter: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub is_sudo: bool,
}

impl MultiJobRequest {
    fn job_spec(&self) -> JobSpec {
        JobSpec {
            command: self.command.clone(),
            interpreter: self.interpreter.clone(),
            cwd: self.cwd.clone(),
            is_sudo: self.is_sudo,
            timeout_sec: self.timeout_sec,
        }
    }
}

/// Runs `request` against `fleet`, scoped to `permitted_client_ids` — the
/// caller-scoped set already filtered by the authorization gate (spec.md
/// §4.6 "the effective permitted-client set from C7"). Returns the completed
/// MultiJob with every constituent Job persisted and the aggregate status
/// derived from them. `cancel` originates from the request that triggered
/// this dispatch and is propagated down to every constituent `execute`
/// (spec.md §5 "every long operation accepts a cancellation token propagated
/// from the originating request").
pub async fn dispatch_multi_job(
    fleet: &Fleet,
    multi_jid: String,
    created_by: String,
    permitted_client_ids: &[String],
    request: MultiJobRequest,
    cancel: CancellationToken,
) -> Result<MultiJob, DispatchError> {
    let now = Utc::now();

    let client_ids: Vec<String> = request
        .client_ids
        .iter()
        .filter(|id| permitted_client_ids.iter().any(|p| p == *id))
        .cloned()
        .collect();

    let multi = MultiJob::new(
        multi_jid.clone(),
        created_by.clone(),
        client_ids,
        request.command.clone(),
        request.timeout_sec,
        request.concurrent,
        request.abort_on_err,
        now,
    );
    fleet.jobs.create_multi(multi.clone()).await?;

    if multi.client_ids.is_empty() {
        info!(multi_jid = %multi_jid, "multi-job has no permitted clients, completing immediately");
        return fleet
            .jobs
            .get_multi(&multi_jid)
            .await?
            .ok_or_else(|| DispatchError::NotFound(multi_jid.clone()));
    }

    let aborted = Arc::new(AtomicBool::new(false));
    let spec = request.job_spec();

    if multi.concurrent {
        run_concurrent(
            fleet,
            &multi_jid,
            &multi.client_ids,
            &spec,
            &created_by,
            multi.abort_on_err,
            aborted,
            cancel,
        )
        .await?;
    } else {
        run_sequential(
            fleet,
            &multi_jid,
            &multi.client_ids,
            &spec,
            &created_by,
            multi.abort_on_err,
            cancel,
        )
        .await?;
    }

    fleet
        .jobs
        .get_multi(&multi_jid)
        .await?
        .ok_or_else(|| DispatchError::NotFound(multi_jid.clone()))
}

/// Sequential fan-out: dispatch targets in `client_ids` order, honoring
/// `abort_on_err` by skipping the remainder once one target fails (spec.md
/// §4.6 step 4 "sequential mode").
async fn run_sequential(
    fleet: &Fleet,
    multi_jid: &str,
    client_ids: &[String],
    spec: &JobSpec,
    created_by: &str,
    abort_on_err: bool,
    cancel: CancellationToken,
) -> Result<(), DispatchError> {
    let mut aborted = false;

    for client_id in client_ids {
        let jid = uuid::Uuid::new_v4().to_string();

        if aborted {
            let job = Job::aborted(jid, client_id.clone(), Some(multi_jid.to_string()), spec.clone(), created_by.to_string(), Utc::now());
            fleet.jobs.append_job_to_multi(multi_jid, job).await?;
            continue;
        }

        let job = dispatch_one(fleet, jid, client_id.clone(), multi_jid, spec, created_by, cancel.clone()).await?;
        if !job.is_success() && abort_on_err {
            aborted = true;
        }
        fleet.jobs.track_in_multi(multi_jid, job);
    }
    Ok(())
}

/// Concurrent fan-out: all targets dispatch at once (bounded by
/// `max_concurrent_per_multi_job` if configured), cooperatively cancelling
/// still-running dispatches once one fails under `abort_on_err` (spec.md
/// §4.6 step 4 "concurrent mode").
async fn run_concurrent(
    fleet: &Fleet,
    multi_jid: &str,
    client_ids: &[String],
    spec: &JobSpec,
    created_by: &str,
    abort_on_err: bool,
    aborted: Arc<AtomicBool>,
    cancel: CancellationToken,
) -> Result<(), DispatchError> {
    let permits = fleet
        .config
        .dispatch
        .max_concurrent_per_multi_job
        .unwrap_or(client_ids.len().max(1));
    let semaphore = Arc::new(Semaphore::new(permits));

    let futures = client_ids.iter().cloned().map(|client_id| {
        let semaphore = semaphore.clone();
        let aborted = aborted.clone();
        let spec = spec.clone();
        let created_by = created_by.to_string();
        let multi_jid = multi_jid.to_string();
        let cancel = cancel.clone();
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore not closed");
            let jid = uuid::Uuid::new_v4().to_string();

            if abort_on_err && aborted.load(Ordering::SeqCst) {
                let job = Job::aborted(jid, client_id, Some(multi_jid), spec, created_by, Utc::now());
                return (job, true);
            }

            match dispatch_one(fleet, jid, client_id, &multi_jid, &spec, &created_by, cancel).await {
                Ok(job) => {
                    if !job.is_success() && abort_on_err {
                        aborted.store(true, Ordering::SeqCst);
                    }
                    (job, false)
                }
                Err(e) => {
                    warn!(error = %e, "dispatch_one failed unexpectedly");
                    let job = Job::new_running(
                        uuid::Uuid::new_v4().to_string(),
                        String::new(),
                        Some(multi_jid.clone()),
                        spec.clone(),
                        created_by.clone(),
                        Utc::now(),
                    );
                    if abort_on_err {
                        aborted.store(true, Ordering::SeqCst);
                    }
                    (job, true)
                }
            }
        }
    });

    let results = join_all(futures).await;
    for (job, needs_durable_write) in results {
        if needs_durable_write {
            fleet.jobs.append_job_to_multi(multi_jid, job).await?;
        } else {
            fleet.jobs.track_in_multi(multi_jid, job);
        }
    }
    Ok(())
}

/// Dispatch a single job to one client: resolve its session, persist a
/// running row, issue `execute`, persist the terminal state (spec.md §4.6
/// step 3).
async fn dispatch_one(
    fleet: &Fleet,
    jid: String,
    client_id: String,
    multi_jid: &str,
    spec: &JobSpec,
    created_by: &str,
    cancel: CancellationToken,
) -> Result<Job, DispatchError> {
    let now = Utc::now();
    let _span = crate::telemetry::create_dispatch_span(&jid, &client_id, &spec.command).entered();

    crate::metrics::JOBS_DISPATCHED.inc();

    let Some(session) = fleet.sessions.get(&client_id) else {
        let job = Job::offline(
            jid,
            client_id,
            Some(multi_jid.to_string()),
            spec.clone(),
            created_by.to_string(),
            now,
        );
        fleet.jobs.create(job.clone()).await?;
        crate::metrics::JOBS_FAILED.inc();
        return Ok(job);
    };

    let mut job = Job::new_running(jid, client_id, Some(multi_jid.to_string()), spec.clone(), created_by.to_string(), now);
    fleet.jobs.create(job.clone()).await?;
    crate::metrics::DISPATCHES_IN_FLIGHT.inc();

    let slack = fleet.config.dispatch.dispatch_slack();
    let bound = Duration::from_secs(spec.timeout_sec) + slack;

    match tokio::time::timeout(bound, session.execute(spec.clone(), cancel)).await {
        Ok(Ok(outcome)) => match outcome.exit_code {
            Some(0) | None => {
                job.finish_success(outcome.exit_code, outcome.stdout, outcome.stderr, Utc::now());
                crate::metrics::JOBS_SUCCEEDED.inc();
            }
            Some(code) => {
                job.exit_code = outcome.exit_code;
                job.stdout = outcome.stdout;
                job.stderr = outcome.stderr;
                job.finish_failed(format!("command exited with status {code}"), Utc::now());
                crate::metrics::JOBS_FAILED.inc();
            }
        },
        // Each `SessionError` variant gets its own message/error_code rather
        // than collapsing to one string, so a canceled dispatch surfaces
        // `error="canceled"` (spec.md §5/§7) instead of looking like a
        // disconnect.
        Ok(Err(session_err)) => {
            let message = match &session_err {
                SessionError::Canceled => "canceled".to_string(),
                SessionError::Timeout => "command execution timed out".to_string(),
                SessionError::TransportClosed => "client disconnected mid-dispatch".to_string(),
                SessionError::SupersedeTimeout(_) => session_err.to_string(),
            };
            job.finish_unknown(message, Utc::now());
            crate::metrics::JOBS_TIMED_OUT.inc();
        }
        Err(_elapsed) => {
            job.finish_unknown("dispatch exceeded timeout and slack".into(), Utc::now());
            crate::metrics::JOBS_TIMED_OUT.inc();
        }
    }

    crate::metrics::DISPATCHES_IN_FLIGHT.dec();
    fleet.jobs.update(job.clone()).await?;
    Ok(job)
}
