use thiserror::Error;

/// Typed failure modes for the things engine. Orchestration code
/// (main, spawned tasks) works in `anyhow::Result` and wraps these
/// with `?`; anything that a caller might want to branch on is a
/// `ThingsError` variant instead of a string.
#[derive(Debug, Error)]
pub enum ThingsError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("bus error: {0}")]
    Bus(String),

    #[error("parse error: {0}")]
    Parse(String),
}

pub type ThingsResult<T> = std::result::Result<T, ThingsError>;

impl From<sqlx::Error> for ThingsError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("23505") => ThingsError::AlreadyExists(db_err.message().to_string()),
                Some("23503") | Some("23502") | Some("22P02") => {
                    ThingsError::Validation(db_err.message().to_string())
                }
                _ => ThingsError::Repository(err.to_string()),
            },
            sqlx::Error::RowNotFound => ThingsError::NotFound("row not found".to_string()),
            _ => ThingsError::Repository(err.to_string()),
        }
    }
}
