use thiserror::Error;

/// Broad failure classes shared across all vigil crates.
///
/// Crate-local errors (store, notify, rules) convert into this taxonomy
/// at the seams so the management surface and outbound bus messages can
/// report a stable, machine-readable kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Transient,
    Provider,
    Timeout,
    Fatal,
}

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl VigilError {
    /// The stable kind for status mapping and outbound messages.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VigilError::InvalidInput(_) => ErrorKind::InvalidInput,
            VigilError::NotFound(_) => ErrorKind::NotFound,
            VigilError::Conflict(_) => ErrorKind::Conflict,
            VigilError::Transient(_) => ErrorKind::Transient,
            VigilError::Provider(_) => ErrorKind::Provider,
            VigilError::Timeout(_) => ErrorKind::Timeout,
            VigilError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Whether a retry has any chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VigilError::Transient(_) | VigilError::Provider(_) | VigilError::Timeout(_)
        )
    }
}
