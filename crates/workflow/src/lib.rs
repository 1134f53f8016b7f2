//! Role-gated incident mutation workflow.
//!
//! The [`MutationGateway`] is the single entry point for incident writes:
//! it runs the mutation policy and either applies the change directly or
//! queues an approval request. The [`ApprovalManager`] is the resolver
//! side, where pending requests are reviewed, approved, or rejected.

pub mod gateway;
pub mod manager;

pub use gateway::{MutationGateway, MutationOutcome};
pub use manager::ApprovalManager;

pub(crate) fn store_error(err: opsboard_db::repositories::RepositoryError) -> opsboard_core::WorkflowError {
    opsboard_core::WorkflowError::StorePassthrough(err.to_string())
}
