//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every engine operation reports failures through this taxonomy so the
/// transport layer can map each kind to a stable status code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (empty justification, bad identifier, bad date ordering).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown principal, role, permission, rule or request.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Duplicate identifier, or a mutation against a retired/terminated entity.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Segregation-of-duties conflict.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// Workflow transition attempted from the wrong state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Transient storage failure (lock contention, lost connection).
    ///
    /// Retried at the operation boundary; callers only ever see it converted
    /// into [`DomainError::Conflict`] once retries are exhausted.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn policy(msg: impl Into<String>) -> Self {
        Self::PolicyViolation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Stable machine-readable code (used in API error bodies and audit details).
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::PolicyViolation(_) => "policy_violation",
            Self::InvalidState(_) => "invalid_state",
            Self::Unavailable(_) => "unavailable",
        }
    }
}
