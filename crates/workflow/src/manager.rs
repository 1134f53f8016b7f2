use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use opsboard_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use opsboard_core::{
    diff, ApprovalRequest, ApprovalRequestId, FieldChange, Principal, Role, WorkflowError,
};
use opsboard_db::repositories::{ApprovalRequestRepository, ApproveOutcome, RequestFilter};

use crate::store_error;

/// Resolver side of the approval workflow: listing, diffing, and the
/// approve/reject terminal transitions.
///
/// Eligibility is checked here against the escalation graph; the status
/// transition itself is left to the store's conditional update, so two
/// concurrent resolutions cannot both win.
pub struct ApprovalManager {
    requests: Arc<dyn ApprovalRequestRepository>,
    audit: Arc<dyn AuditSink>,
}

impl ApprovalManager {
    pub fn new(requests: Arc<dyn ApprovalRequestRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self { requests, audit }
    }

    /// Requests visible to the principal, newest first. The store scopes
    /// gestor listings to operador-requested entries.
    pub async fn list(
        &self,
        principal: &Principal,
        filter: RequestFilter,
    ) -> Result<Vec<ApprovalRequest>, WorkflowError> {
        if !principal.role.can_resolve_requests() {
            return Err(WorkflowError::Forbidden {
                role: principal.role,
                action: "view approval requests",
            });
        }
        self.requests.list(filter, principal.role).await.map_err(store_error)
    }

    /// Count of pending requests the principal could act on. Zero for
    /// roles outside the resolver tiers.
    pub async fn pending_count(&self, principal: &Principal) -> Result<u64, WorkflowError> {
        self.requests.count_pending(principal.role).await.map_err(store_error)
    }

    /// Field-by-field comparison for the review screen. Delete requests
    /// yield the single deletion sentinel.
    pub async fn review_diff(
        &self,
        principal: &Principal,
        id: &ApprovalRequestId,
    ) -> Result<Vec<FieldChange>, WorkflowError> {
        let request = self.load(principal, id).await?;
        Ok(diff(&request.before_snapshot, request.after_snapshot.as_ref()))
    }

    /// Approves a pending request and applies its stored mutation. The
    /// pending check is a conditional update in the store; a lost race
    /// surfaces as `InvalidState`, never as a double apply.
    pub async fn approve(
        &self,
        principal: &Principal,
        id: &ApprovalRequestId,
    ) -> Result<ApproveOutcome, WorkflowError> {
        let request = self.load(principal, id).await?;
        self.check_eligibility(principal, &request, "approve this request")?;

        let outcome = self
            .requests
            .approve_pending(id, &principal.id, Utc::now())
            .await
            .map_err(store_error)?;

        match &outcome {
            ApproveOutcome::Applied => {
                info!(
                    event_name = "approval.request_approved",
                    request_id = %id.0,
                    incident_id = %request.incident_id.0,
                    resolver = %principal.id,
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(request.incident_id.clone()),
                        Some(id.clone()),
                        "approval.request_approved",
                        AuditCategory::Approval,
                        &principal.id,
                        AuditOutcome::Success,
                    )
                    .with_metadata("operation", request.operation.as_str()),
                );
                Ok(outcome)
            }
            ApproveOutcome::FinalizedWithoutApply => {
                warn!(
                    event_name = "approval.request_approved_without_apply",
                    request_id = %id.0,
                    incident_id = %request.incident_id.0,
                    resolver = %principal.id,
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(request.incident_id.clone()),
                        Some(id.clone()),
                        "approval.request_approved_without_apply",
                        AuditCategory::Approval,
                        &principal.id,
                        AuditOutcome::Success,
                    )
                    .with_metadata("operation", request.operation.as_str()),
                );
                Ok(outcome)
            }
            ApproveOutcome::AlreadyResolved => {
                Err(WorkflowError::InvalidState { id: id.0.clone() })
            }
        }
    }

    /// Rejects a pending request. The incident is left untouched and the
    /// reason is mandatory.
    pub async fn reject(
        &self,
        principal: &Principal,
        id: &ApprovalRequestId,
        reason: &str,
    ) -> Result<(), WorkflowError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::validation("a rejection reason is required"));
        }

        let request = self.load(principal, id).await?;
        self.check_eligibility(principal, &request, "reject this request")?;

        let rejected = self
            .requests
            .reject_pending(id, &principal.id, Utc::now(), reason)
            .await
            .map_err(store_error)?;
        if !rejected {
            return Err(WorkflowError::InvalidState { id: id.0.clone() });
        }

        info!(
            event_name = "approval.request_rejected",
            request_id = %id.0,
            incident_id = %request.incident_id.0,
            resolver = %principal.id,
        );
        self.audit.emit(
            AuditEvent::new(
                Some(request.incident_id.clone()),
                Some(id.clone()),
                "approval.request_rejected",
                AuditCategory::Approval,
                &principal.id,
                AuditOutcome::Success,
            )
            .with_metadata("reason", reason),
        );

        Ok(())
    }

    async fn load(
        &self,
        principal: &Principal,
        id: &ApprovalRequestId,
    ) -> Result<ApprovalRequest, WorkflowError> {
        if !principal.role.can_resolve_requests() {
            return Err(WorkflowError::Forbidden {
                role: principal.role,
                action: "view approval requests",
            });
        }
        let request = self
            .requests
            .find_by_id(id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "approval request",
                id: id.0.clone(),
            })?;

        // Direct access by id follows the same visibility rule as the
        // listing: a gestor only sees the operador queue.
        if principal.role == Role::Gestor && request.requester_role() != Role::Operador {
            return Err(WorkflowError::Forbidden {
                role: principal.role,
                action: "view requests outside the operador queue",
            });
        }

        Ok(request)
    }

    fn check_eligibility(
        &self,
        principal: &Principal,
        request: &ApprovalRequest,
        action: &'static str,
    ) -> Result<(), WorkflowError> {
        if !principal.role.can_approve(request.requester_role()) {
            self.audit.emit(AuditEvent::new(
                Some(request.incident_id.clone()),
                Some(request.id.clone()),
                "approval.resolution_denied",
                AuditCategory::Approval,
                &principal.id,
                AuditOutcome::Denied,
            ));
            return Err(WorkflowError::Forbidden { role: principal.role, action });
        }
        Ok(())
    }
}
