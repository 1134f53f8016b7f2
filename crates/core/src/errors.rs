use thiserror::Error;

use crate::domain::identity::Role;

/// Error taxonomy shared by the policy engine, the approval manager, and
/// the store adapter callers. The presentation layer renders these through
/// `message_key()`; the variants themselves stay UI-agnostic.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("role `{role}` is not allowed to {action}")]
    Forbidden { role: Role, action: &'static str },
    #[error("approval request `{id}` was already resolved")]
    InvalidState { id: String },
    #[error("editing window closed: incident belongs to {locked_month}")]
    StalePeriod { locked_month: String },
    #[error("store failure: {0}")]
    StorePassthrough(String),
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable key for the surrounding presentation layer. The core never
    /// renders user-facing text itself.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::Validation(_) => "error.validation",
            Self::NotFound { .. } => "error.not_found",
            Self::Forbidden { .. } => "error.forbidden",
            Self::InvalidState { .. } => "error.already_processed",
            Self::StalePeriod { .. } => "error.stale_period",
            Self::StorePassthrough(_) => "error.store_unavailable",
        }
    }

    /// Only store failures are worth a user-initiated retry; everything
    /// else requires a changed input or a refreshed view.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorePassthrough(_))
    }
}
