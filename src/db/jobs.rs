//! Durable storage for `Job` and `MultiJob` rows (spec.md §6 `jobs`/`multi_jobs`).

use super::DbError;
use crate::jobs::{Job, JobStatus, MultiJob};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::SqlitePool;

pub struct JobRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> JobRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, job: &Job) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO jobs
                (jid, client_id, multi_job_id, status, started_at, finished_at, exit_code,
                 command, interpreter, cwd, is_sudo, timeout_sec, stdout, stderr, error, created_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.jid)
        .bind(&job.client_id)
        .bind(&job.multi_job_id)
        .bind(job.status.as_str())
        .bind(job.started_at.to_rfc3339())
        .bind(job.finished_at.map(|t| t.to_rfc3339()))
        .bind(job.exit_code)
        .bind(&job.command)
        .bind(&job.interpreter)
        .bind(&job.cwd)
        .bind(job.is_sudo)
        .bind(job.timeout_sec as i64)
        .bind(&job.stdout)
        .bind(&job.stderr)
        .bind(&job.error)
        .bind(&job.created_by)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Update an existing job's status and terminal fields. Callers are
    /// responsible for the monotone-transition invariant (spec.md §4.5) —
    /// this is a plain overwrite.
    pub async fn update_status(&self, job: &Job) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                status = ?, finished_at = ?, exit_code = ?, stdout = ?, stderr = ?, error = ?
            WHERE jid = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.finished_at.map(|t| t.to_rfc3339()))
        .bind(job.exit_code)
        .bind(&job.stdout)
        .bind(&job.stderr)
        .bind(&job.error)
        .bind(&job.jid)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::JobNotFound(job.jid.clone()));
        }
        Ok(())
    }

    pub async fn get(&self, jid: &str) -> Result<Option<Job>, DbError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE jid = ?")
            .bind(jid)
            .fetch_optional(self.pool)
            .await?;
        row.map(row_to_job).transpose()
    }

    pub async fn list_for_client(&self, client_id: &str) -> Result<Vec<Job>, DbError> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE client_id = ? ORDER BY started_at")
            .bind(client_id)
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(row_to_job).collect()
    }

    pub async fn list_for_multi(&self, multi_jid: &str) -> Result<Vec<Job>, DbError> {
        let rows =
            sqlx::query("SELECT * FROM jobs WHERE multi_job_id = ? ORDER BY started_at")
                .bind(multi_jid)
                .fetch_all(self.pool)
                .await?;
        rows.into_iter().map(row_to_job).collect()
    }

    pub async fn create_multi(&self, multi: &MultiJob) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO multi_jobs
                (jid, started_at, created_by, client_ids, command, timeout_sec, concurrent, abort_on_err)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&multi.jid)
        .bind(multi.started_at.to_rfc3339())
        .bind(&multi.created_by)
        .bind(
            serde_json::to_string(&multi.client_ids).map_err(|e| DbError::Internal(e.to_string()))?,
        )
        .bind(&multi.command)
        .bind(multi.timeout_sec as i64)
        .bind(multi.concurrent)
        .bind(multi.abort_on_err)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_multi(&self, jid: &str) -> Result<Option<MultiJob>, DbError> {
        let row = sqlx::query("SELECT * FROM multi_jobs WHERE jid = ?")
            .bind(jid)
            .fetch_optional(self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let client_ids_raw: String = row.try_get("client_ids")?;
        let started_at: String = row.try_get("started_at")?;

        let jobs = self.list_for_multi(jid).await?;

        Ok(Some(MultiJob {
            jid: row.try_get("jid")?,
            started_at: parse_timestamp(&started_at)?,
            created_by: row.try_get("created_by")?,
            client_ids: serde_json::from_str(&client_ids_raw).unwrap_or_default(),
            command: row.try_get("command")?,
            timeout_sec: row.try_get::<i64, _>("timeout_sec")? as u64,
            concurrent: row.try_get("concurrent")?,
            abort_on_err: row.try_get("abort_on_err")?,
            jobs,
        }))
    }
}

fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<Job, DbError> {
    let status_raw: String = row.try_get("status")?;
    let started_at: String = row.try_get("started_at")?;
    let finished_at: Option<String> = row.try_get("finished_at")?;

    Ok(Job {
        jid: row.try_get("jid")?,
        client_id: row.try_get("client_id")?,
        multi_job_id: row.try_get("multi_job_id")?,
        status: JobStatus::from_str(&status_raw),
        started_at: parse_timestamp(&started_at)?,
        finished_at: finished_at.map(|t| parse_timestamp(&t)).transpose()?,
        exit_code: row.try_get("exit_code")?,
        command: row.try_get("command")?,
        interpreter: row.try_get("interpreter")?,
        cwd: row.try_get("cwd")?,
        is_sudo: row.try_get("is_sudo")?,
        timeout_sec: row.try_get::<i64, _>("timeout_sec")? as u64,
        stdout: row.try_get("stdout")?,
        stderr: row.try_get("stderr")?,
        error: row.try_get("error")?,
        created_by: row.try_get("created_by")?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DbError::Internal(format!("invalid timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::jobs::JobSpec;

    fn spec() -> JobSpec {
        JobSpec {
            command: "uptime".into(),
            interpreter: None,
            cwd: None,
            is_sudo: false,
            timeout_sec: 30,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let db = Database::new(":memory:").await.unwrap();
        let job = Job::new_running("j1".into(), "c1".into(), None, spec(), "alice".into(), Utc::now());
        db.jobs().create(&job).await.unwrap();

        let got = db.jobs().get("j1").await.unwrap().unwrap();
        assert_eq!(got.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn update_status_transitions_to_terminal() {
        let db = Database::new(":memory:").await.unwrap();
        let mut job = Job::new_running("j1".into(), "c1".into(), None, spec(), "alice".into(), Utc::now());
        db.jobs().create(&job).await.unwrap();

        job.finish_success(Some(0), "ok".into(), String::new(), Utc::now());
        db.jobs().update_status(&job).await.unwrap();

        let got = db.jobs().get("j1").await.unwrap().unwrap();
        assert_eq!(got.status, JobStatus::Successful);
        assert_eq!(got.exit_code, Some(0));
    }

    #[tokio::test]
    async fn update_status_missing_job_errors() {
        let db = Database::new(":memory:").await.unwrap();
        let mut job = Job::new_running("missing".into(), "c1".into(), None, spec(), "alice".into(), Utc::now());
        job.finish_failed("boom".into(), Utc::now());
        let err = db.jobs().update_status(&job).await.unwrap_err();
        assert!(matches!(err, DbError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn multi_job_round_trips_with_constituent_jobs() {
        let db = Database::new(":memory:").await.unwrap();
        let multi = MultiJob::new(
            "m1".into(),
            "alice".into(),
            vec!["c1".into(), "c2".into()],
            "uptime".into(),
            30,
            true,
            false,
            Utc::now(),
        );
        db.jobs().create_multi(&multi).await.unwrap();

        let job = Job::new_running("j1".into(), "c1".into(), Some("m1".into()), spec(), "alice".into(), Utc::now());
        db.jobs().create(&job).await.unwrap();

        let got = db.jobs().get_multi("m1").await.unwrap().unwrap();
        assert_eq!(got.client_ids.len(), 2);
        assert_eq!(got.jobs.len(), 1);
    }
}
