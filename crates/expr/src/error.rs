use thiserror::Error;

/// Compile-time and runtime failures of the expression language.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("parse error at byte {pos}: {message}")]
    Parse { pos: usize, message: String },

    #[error("unknown identifier '{0}' (not in the evaluation environment)")]
    UnknownIdentifier(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{name}() expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("expression nesting exceeds depth limit")]
    DepthExceeded,

    #[error("type error: {0}")]
    Type(String),

    #[error("invalid regex '{pattern}': {message}")]
    Regex { pattern: String, message: String },
}
