//! Error types for the authorization engine

use thiserror::Error;

/// Coarse classification of an [`AuthzError`].
///
/// Outer layers map these to their own status codes; the engine never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    DependencyUnavailable,
    ValidationFailed,
    Internal,
}

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    /// Uniqueness or referential-integrity violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A backing store (database, cache) could not be reached or failed
    #[error("{dependency} unavailable: {message}")]
    DependencyUnavailable {
        dependency: &'static str,
        message: String,
    },

    /// Input rejected by validation (including role-tree cycles)
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthzError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn unavailable(dependency: &'static str, message: impl Into<String>) -> Self {
        Self::DependencyUnavailable {
            dependency,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::DependencyUnavailable { .. } => ErrorKind::DependencyUnavailable,
            Self::ValidationFailed(_) => ErrorKind::ValidationFailed,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when the failure came from an unreachable or failing backend.
    pub fn is_unavailable(&self) -> bool {
        self.kind() == ErrorKind::DependencyUnavailable
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
