use crate::error::{AppError, AppResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;

pub async fn create_database_pool(db_path: &Path) -> AppResult<SqlitePool> {
    tracing::debug!("Database file path: {}", db_path.display());

    // Ensure the database directory exists
    let parent = db_path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            AppError::Storage(format!(
                "Failed to create database directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    // One connection: every store call runs sequentially against the file.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| {
            AppError::Storage(format!("Failed to open database {}: {e}", db_path.display()))
        })?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> AppResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::debug!("Database schema is up to date");
    Ok(())
}
