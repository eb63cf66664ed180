use thiserror::Error;

use vigil_core::VigilError;

/// Unique-violation SQLSTATE raised by partial unique indexes.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether the underlying sqlx error is a unique-constraint violation.
    pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(
            err,
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION)
        )
    }

    /// Map a sqlx error on insert/update, turning unique violations into
    /// `Conflict` with a caller-supplied message.
    pub(crate) fn on_write(err: sqlx::Error, conflict_msg: impl Into<String>) -> Self {
        if Self::is_unique_violation(&err) {
            StoreError::Conflict(conflict_msg.into())
        } else {
            StoreError::Database(err)
        }
    }
}

impl From<StoreError> for VigilError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(m) => VigilError::NotFound(m),
            StoreError::Conflict(m) => VigilError::Conflict(m),
            StoreError::InvalidInput(m) => VigilError::InvalidInput(m),
            StoreError::Config(m) => VigilError::Fatal(m),
            StoreError::Corrupt(m) => VigilError::Fatal(m),
            StoreError::Database(e) => VigilError::Transient(e.to_string()),
            StoreError::Migration(e) => VigilError::Fatal(e.to_string()),
        }
    }
}
