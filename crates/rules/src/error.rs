use thiserror::Error;

use vigil_core::VigilError;

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("rule '{name}' condition {index} failed to compile: {source}")]
    Compile {
        name: String,
        index: usize,
        #[source]
        source: vigil_expr::ExprError,
    },

    #[error("rule source error: {0}")]
    Source(String),

    #[error("evaluation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("evaluation cancelled")]
    Cancelled,

    #[error("evaluation pool is shut down")]
    PoolClosed,

    #[error(transparent)]
    Expr(#[from] vigil_expr::ExprError),
}

impl From<RulesError> for VigilError {
    fn from(err: RulesError) -> Self {
        match err {
            RulesError::Compile { .. } => VigilError::Fatal(err.to_string()),
            RulesError::Source(m) => VigilError::Transient(m),
            RulesError::Timeout(d) => VigilError::Timeout(format!("rule evaluation ({d:?})")),
            RulesError::Cancelled => VigilError::Transient("evaluation cancelled".to_string()),
            RulesError::PoolClosed => VigilError::Fatal("evaluation pool closed".to_string()),
            RulesError::Expr(e) => VigilError::InvalidInput(e.to_string()),
        }
    }
}
