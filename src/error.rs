#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppError {
    /// The job table is unreachable or corrupt. Always fatal.
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Not Found error: {0}")]
    NotFound(String),
    /// A pre-flight check failed; nothing was mutated.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Scoped to a single job and recorded on it.
    #[error("Parse failure: {0}")]
    ParseFailure(String),
    #[error("Missing dependency: {0}")]
    MissingDependency(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Mail error: {0}")]
    Mail(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        AppError::Storage(format!("Failed to run migrations: {e}"))
    }
}

pub type AppResult<T> = Result<T, AppError>;
