use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RbacError {
    #[error("invalid environment: {0} (expected one of DEV, TST, UAT, PPE, PRD)")]
    InvalidEnvironment(String),

    #[error("invalid capability: {0}")]
    InvalidCapability(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("schema {database}.{schema} exists without managed access")]
    SchemaConflict { database: String, schema: String },

    #[error("role not found: {0}")]
    RoleNotFound(String),

    #[error("principal not found: {0}")]
    PrincipalNotFound(String),

    #[error("role {role} cannot be granted to {principal}: expected a {expected} principal")]
    PrincipalKindMismatch {
        principal: String,
        role: String,
        expected: String,
    },

    #[error("platform operation failed ({operation}): {message}")]
    PlatformOperationFailed { operation: String, message: String },

    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("operation timed out after {after_ms}ms: {operation}")]
    Timeout { operation: String, after_ms: u64 },

    #[error("cancelled before {0}")]
    Cancelled(String),
}

impl RbacError {
    /// Stable machine-readable code surfaced in structured results.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEnvironment(_) => "INVALID_ENVIRONMENT",
            Self::InvalidCapability(_) => "INVALID_CAPABILITY",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::SchemaConflict { .. } => "SCHEMA_CONFLICT",
            Self::RoleNotFound(_) => "ROLE_NOT_FOUND",
            Self::PrincipalNotFound(_) => "PRINCIPAL_NOT_FOUND",
            Self::PrincipalKindMismatch { .. } => "PRINCIPAL_KIND_MISMATCH",
            Self::PlatformOperationFailed { .. } => "PLATFORM_OPERATION_FAILED",
            Self::DatabaseNotFound(_) => "DATABASE_NOT_FOUND",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Cancelled(_) => "CANCELLED",
        }
    }

    /// Validation errors are raised before any platform operation runs.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidEnvironment(_) | Self::InvalidCapability(_) | Self::InvalidInput(_)
        )
    }

    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Serializable error body carried by every structured result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl From<&RbacError> for ErrorPayload {
    fn from(err: &RbacError) -> Self {
        err.payload()
    }
}

pub type Result<T> = std::result::Result<T, RbacError>;
