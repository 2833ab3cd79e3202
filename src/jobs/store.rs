//! JobStore (C5): append-and-update persistent log of Jobs and MultiJobs.
//!
//! Grounded on the `ClientStore`/`TunnelRegistry` split of in-memory index vs
//! durable row used throughout `state/` — a `DashMap` keeps recent rows warm
//! for `get`/`list`, the `db::jobs` repository is the durable writer. Writes
//! are serialized per `jid` via a `DashMap<String, Mutex<()>>` of row locks so
//! two concurrent callers can't race a Job's terminal transition (spec.md
//! §4.7 "JobStore is append-and-update with row-level serialization on jid").

use crate::db::Database;
use crate::error::JobStoreError;
use crate::jobs::{Job, MultiJob};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Filter for `JobStore::list`. Empty means "no filter" for that field.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub client_id: Option<String>,
    pub multi_job_id: Option<String>,
}

pub struct JobStore {
    db: Database,
    jobs: DashMap<String, Job>,
    multi_jobs: DashMap<String, MultiJob>,
    row_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            jobs: DashMap::new(),
            multi_jobs: DashMap::new(),
            row_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, jid: &str) -> Arc<Mutex<()>> {
        self.row_locks
            .entry(jid.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn create(&self, job: Job) -> Result<(), JobStoreError> {
        let lock = self.lock_for(&job.jid);
        let _guard = lock.lock().await;
        self.db.jobs().create(&job).await?;
        self.jobs.insert(job.jid.clone(), job);
        Ok(())
    }

    /// Persist a job's current (possibly terminal) state. The caller owns the
    /// monotone-transition invariant; this just serializes the write against
    /// any other writer racing the same `jid`.
    pub async fn update(&self, job: Job) -> Result<(), JobStoreError> {
        let lock = self.lock_for(&job.jid);
        let _guard = lock.lock().await;
        self.db.jobs().update_status(&job).await?;
        self.jobs.insert(job.jid.clone(), job);
        Ok(())
    }

    pub async fn get(&self, jid: &str) -> Result<Option<Job>, JobStoreError> {
        if let Some(job) = self.jobs.get(jid) {
            return Ok(Some(job.clone()));
        }
        Ok(self.db.jobs().get(jid).await?)
    }

    pub async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, JobStoreError> {
        match (filter.client_id, filter.multi_job_id) {
            (Some(client_id), None) => Ok(self.db.jobs().list_for_client(&client_id).await?),
            (None, Some(multi_job_id)) => Ok(self.db.jobs().list_for_multi(&multi_job_id).await?),
            _ => Err(JobStoreError::InvalidFilter(
                "list requires exactly one of client_id or multi_job_id".into(),
            )),
        }
    }

    pub async fn create_multi(&self, multi: MultiJob) -> Result<(), JobStoreError> {
        let lock = self.lock_for(&multi.jid);
        let _guard = lock.lock().await;
        self.db.jobs().create_multi(&multi).await?;
        self.multi_jobs.insert(multi.jid.clone(), multi);
        Ok(())
    }

    pub async fn get_multi(&self, jid: &str) -> Result<Option<MultiJob>, JobStoreError> {
        Ok(self.db.jobs().get_multi(jid).await?)
    }

    /// Persist a Job that belongs to a MultiJob in one step (used for jobs
    /// synthesized already-terminal, e.g. offline/aborted — spec.md §4.6
    /// steps 3-4) and mirror it into the cached MultiJob's constituent list
    /// (spec.md §4.5 `append_job_to_multi`).
    pub async fn append_job_to_multi(&self, multi_jid: &str, job: Job) -> Result<(), JobStoreError> {
        self.create(job.clone()).await?;
        self.track_in_multi(multi_jid, job);
        Ok(())
    }

    /// Mirror an already-persisted Job into the cached MultiJob's
    /// constituent list, without touching durable storage. Used by the
    /// dispatcher after a job it separately `create`d/`update`d completes.
    pub fn track_in_multi(&self, multi_jid: &str, job: Job) {
        if let Some(mut multi) = self.multi_jobs.get_mut(multi_jid) {
            multi.jobs.push(job);
        }
    }
}
