use crate::database::{create_database_pool, run_migrations};
use crate::error::{AppError, AppResult};
use crate::models::job::{Job, JobStatus};
use crate::models::message::MailMessage;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;

const JOB_COLUMNS: &str =
    "id, subject, sender, body, status, result_json, error, created_at, processed_at";

const INSERT_JOB: &str =
    "INSERT INTO pending_documents (subject, sender, body, status, created_at) \
     VALUES (?, ?, ?, ?, ?)";

type UpdateQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

#[derive(Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens the store at `path`, creating the file, its parent directory and
    /// the job table as needed. Safe to call on every start.
    pub async fn initialize(path: &Path) -> AppResult<Self> {
        let pool = create_database_pool(path).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn insert(&self, subject: &str, sender: &str, body: &str) -> AppResult<i64> {
        let result = sqlx::query(INSERT_JOB)
            .bind(subject)
            .bind(sender)
            .bind(body)
            .bind(JobStatus::Pending.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to insert job: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    /// Inserts every message in one transaction: either all rows land or none.
    pub async fn insert_batch(&self, messages: &[MailMessage]) -> AppResult<Vec<i64>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to start transaction: {e}")))?;

        let mut ids = Vec::with_capacity(messages.len());
        for message in messages {
            let result = sqlx::query(INSERT_JOB)
                .bind(&message.subject)
                .bind(&message.sender)
                .bind(&message.body)
                .bind(JobStatus::Pending.as_str())
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to insert job: {e}")))?;
            ids.push(result.last_insert_rowid());
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to commit transaction: {e}")))?;

        Ok(ids)
    }

    /// All pending jobs, oldest first. Ids are assigned in insertion order, so
    /// they are the ordering key; `created_at` text may mix formats.
    pub async fn list_pending(&self) -> AppResult<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM pending_documents WHERE status = ? ORDER BY id ASC"
        ))
        .bind(JobStatus::Pending.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to get pending jobs: {e}")))?;

        rows.iter().map(job_from_row).collect()
    }

    pub async fn mark_processed(&self, job_id: i64, result: &serde_json::Value) -> AppResult<()> {
        let result_json = serde_json::to_string(result).map_err(|e| {
            AppError::Storage(format!("Failed to serialize result for job {job_id}: {e}"))
        })?;

        let query = sqlx::query(
            "UPDATE pending_documents \
             SET status = ?, result_json = ?, error = NULL, processed_at = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(JobStatus::Processed.as_str())
        .bind(result_json)
        .bind(Utc::now())
        .bind(job_id)
        .bind(JobStatus::Pending.as_str());

        self.finish_job(job_id, query).await
    }

    pub async fn mark_error(&self, job_id: i64, error_message: &str) -> AppResult<()> {
        let query = sqlx::query(
            "UPDATE pending_documents \
             SET status = ?, error = ?, result_json = NULL \
             WHERE id = ? AND status = ?",
        )
        .bind(JobStatus::Error.as_str())
        .bind(error_message)
        .bind(job_id)
        .bind(JobStatus::Pending.as_str());

        self.finish_job(job_id, query).await
    }

    /// Runs a pending -> terminal transition. A job that does not exist, or is
    /// no longer pending, is reported as `NotFound` and nothing changes.
    async fn finish_job(&self, job_id: i64, query: UpdateQuery<'_>) -> AppResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to start transaction: {e}")))?;

        let result = query
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to update job {job_id}: {e}")))?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| AppError::Storage(format!("Failed to rollback transaction: {e}")))?;
            return Err(AppError::NotFound(format!("No pending job with id {job_id}")));
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to commit transaction: {e}")))?;

        Ok(())
    }

    pub async fn get_job(&self, job_id: i64) -> AppResult<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM pending_documents WHERE id = ?"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to get job: {e}")))?;

        row.as_ref().map(job_from_row).transpose()
    }

    /// Most recent jobs first, optionally restricted to one status.
    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: u32) -> AppResult<Vec<Job>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {JOB_COLUMNS} FROM pending_documents \
                     WHERE status = ? ORDER BY id DESC LIMIT ?"
                ))
                .bind(status.as_str())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {JOB_COLUMNS} FROM pending_documents ORDER BY id DESC LIMIT ?"
                ))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| AppError::Storage(format!("Failed to list jobs: {e}")))?;

        rows.iter().map(job_from_row).collect()
    }

    pub async fn get_job_stats(&self) -> AppResult<BTreeMap<String, i64>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) as count
            FROM pending_documents
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to get job stats: {e}")))?;

        let mut stats = BTreeMap::new();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            stats.insert(status, count);
        }

        Ok(stats)
    }

    /// Returns every `error` job to `pending` and clears its error. This is
    /// an operator action; processing never calls it.
    pub async fn requeue_errors(&self) -> AppResult<u64> {
        let result =
            sqlx::query("UPDATE pending_documents SET status = ?, error = NULL WHERE status = ?")
                .bind(JobStatus::Pending.as_str())
                .bind(JobStatus::Error.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to requeue failed jobs: {e}")))?;

        Ok(result.rows_affected())
    }
}

fn job_from_row(row: &SqliteRow) -> AppResult<Job> {
    let status: String = row.try_get("status")?;
    let result_json: Option<String> = row.try_get("result_json")?;

    // Rows written by older tooling may hold non-JSON text; keep it verbatim.
    let result = result_json
        .map(|raw| serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw)));

    let created_at: Option<DateTime<Utc>> = row.try_get("created_at")?;

    Ok(Job {
        id: row.try_get("id")?,
        subject: row.try_get("subject")?,
        sender: row.try_get("sender")?,
        body: row.try_get("body")?,
        status: status.parse()?,
        result,
        error: row.try_get("error")?,
        created_at: created_at.unwrap_or_default(),
        processed_at: row.try_get("processed_at")?,
    })
}
