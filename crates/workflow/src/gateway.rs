use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use opsboard_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use opsboard_core::domain::reference::Segment;
use opsboard_core::{
    decide, ApprovalRequest, ApprovalRequestId, DisplayNames, Incident, IncidentDraft, IncidentId,
    IncidentSnapshot, MutationDecision, MutationKind, Principal, ValidatedDraft, WorkflowError,
};
use opsboard_db::repositories::{
    ApprovalRequestRepository, IncidentFilter, IncidentListing, IncidentRepository,
    LookupRepository,
};

use crate::store_error;

/// Non-blocking policy decisions; blocked ones become errors at the gate.
enum GatePassed {
    Direct,
    Queue,
}

/// Result of a mutation attempt that passed the policy gate.
#[derive(Clone, Debug, PartialEq)]
pub enum MutationOutcome {
    /// The change was applied to the incident store immediately.
    Applied,
    /// The change was queued; nothing is visible on the dashboard until a
    /// resolver approves the request.
    Queued(ApprovalRequest),
}

/// Single entry point for incident writes. Every edit and delete passes
/// through the mutation policy here; nothing else writes to the incident
/// store.
pub struct MutationGateway {
    incidents: Arc<dyn IncidentRepository>,
    lookups: Arc<dyn LookupRepository>,
    requests: Arc<dyn ApprovalRequestRepository>,
    audit: Arc<dyn AuditSink>,
}

impl MutationGateway {
    pub fn new(
        incidents: Arc<dyn IncidentRepository>,
        lookups: Arc<dyn LookupRepository>,
        requests: Arc<dyn ApprovalRequestRepository>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { incidents, lookups, requests, audit }
    }

    /// Records a new incident. Creation is never gated by the approval
    /// workflow; the policy only covers mutations of existing rows.
    pub async fn create_incident(
        &self,
        principal: &Principal,
        draft: IncidentDraft,
    ) -> Result<Incident, WorkflowError> {
        if !principal.role.can_create_incidents() {
            return Err(WorkflowError::Forbidden {
                role: principal.role,
                action: "create incidents",
            });
        }

        let validated = draft.validate()?;
        check_temporal_order(&validated)?;
        self.resolve_names(&validated).await?;

        let now = Utc::now();
        let incident = Incident {
            id: IncidentId(Uuid::new_v4().to_string()),
            started_at: validated.started_at,
            ended_at: validated.ended_at,
            duration_minutes: validated.duration_minutes(),
            type_id: validated.type_id,
            environment_id: validated.environment_id,
            segment_id: validated.segment_id,
            criticality_id: validated.criticality_id,
            description: validated.description,
            actions_taken: validated.actions_taken,
            created_at: now,
            created_by: principal.id.clone(),
            updated_by: None,
        };

        self.incidents.insert(incident.clone()).await.map_err(store_error)?;

        info!(
            event_name = "incident.created",
            incident_id = %incident.id.0,
            actor = %principal.id,
            role = %principal.role,
        );
        self.audit.emit(AuditEvent::new(
            Some(incident.id.clone()),
            None,
            "incident.created",
            AuditCategory::Incident,
            &principal.id,
            AuditOutcome::Success,
        ));

        Ok(incident)
    }

    /// Requests an edit of an existing incident. Depending on the policy
    /// the edit is applied immediately or queued for approval.
    pub async fn request_edit(
        &self,
        principal: &Principal,
        incident_id: &IncidentId,
        draft: IncidentDraft,
    ) -> Result<MutationOutcome, WorkflowError> {
        let incident = self.load_incident(incident_id).await?;
        let decision =
            self.gate(principal, &incident, MutationKind::Edit, "edit incidents")?;

        let validated = draft.validate()?;
        check_temporal_order(&validated)?;
        let after_names = self.resolve_names(&validated).await?;

        let mut proposed = incident.clone();
        proposed.started_at = validated.started_at;
        proposed.ended_at = validated.ended_at;
        proposed.duration_minutes = validated.duration_minutes();
        proposed.type_id = validated.type_id;
        proposed.environment_id = validated.environment_id;
        proposed.segment_id = validated.segment_id;
        proposed.criticality_id = validated.criticality_id;
        proposed.description = validated.description;
        proposed.actions_taken = validated.actions_taken;
        proposed.updated_by = Some(principal.id.clone());

        match decision {
            GatePassed::Direct => {
                let updated = self.incidents.update(proposed).await.map_err(store_error)?;
                if !updated {
                    return Err(WorkflowError::NotFound {
                        entity: "incident",
                        id: incident_id.0.clone(),
                    });
                }

                info!(
                    event_name = "incident.edited",
                    incident_id = %incident_id.0,
                    actor = %principal.id,
                );
                self.audit.emit(AuditEvent::new(
                    Some(incident_id.clone()),
                    None,
                    "incident.edited",
                    AuditCategory::Incident,
                    &principal.id,
                    AuditOutcome::Success,
                ));
                Ok(MutationOutcome::Applied)
            }
            GatePassed::Queue => {
                let before_names = self.current_names(&incident).await?;
                let before =
                    IncidentSnapshot::from_incident(&incident, before_names, principal.role);
                let after =
                    IncidentSnapshot::from_incident(&proposed, after_names, principal.role);

                self.queue_request(principal, MutationKind::Edit, before, Some(after)).await
            }
        }
    }

    /// Requests deletion of an existing incident.
    pub async fn request_delete(
        &self,
        principal: &Principal,
        incident_id: &IncidentId,
    ) -> Result<MutationOutcome, WorkflowError> {
        let incident = self.load_incident(incident_id).await?;
        let decision =
            self.gate(principal, &incident, MutationKind::Delete, "delete incidents")?;

        match decision {
            GatePassed::Direct => {
                let deleted = self.incidents.delete(incident_id).await.map_err(store_error)?;
                if !deleted {
                    return Err(WorkflowError::NotFound {
                        entity: "incident",
                        id: incident_id.0.clone(),
                    });
                }

                info!(
                    event_name = "incident.deleted",
                    incident_id = %incident_id.0,
                    actor = %principal.id,
                );
                self.audit.emit(AuditEvent::new(
                    Some(incident_id.clone()),
                    None,
                    "incident.deleted",
                    AuditCategory::Incident,
                    &principal.id,
                    AuditOutcome::Success,
                ));
                Ok(MutationOutcome::Applied)
            }
            GatePassed::Queue => {
                let names = self.current_names(&incident).await?;
                let before = IncidentSnapshot::from_incident(&incident, names, principal.role);
                self.queue_request(principal, MutationKind::Delete, before, None).await
            }
        }
    }

    /// Filtered dashboard listing.
    pub async fn list_incidents(
        &self,
        principal: &Principal,
        filter: IncidentFilter,
    ) -> Result<Vec<IncidentListing>, WorkflowError> {
        if !principal.role.can_view_reports() && !principal.role.can_create_incidents() {
            return Err(WorkflowError::Forbidden {
                role: principal.role,
                action: "view the incident listing",
            });
        }
        self.incidents.query(filter).await.map_err(store_error)
    }

    fn gate(
        &self,
        principal: &Principal,
        incident: &Incident,
        operation: MutationKind,
        action: &'static str,
    ) -> Result<GatePassed, WorkflowError> {
        let decision = decide(principal.role, incident.created_at, operation, Utc::now());
        match &decision {
            MutationDecision::StalePeriod { locked_month } => {
                warn!(
                    event_name = "policy.stale_period",
                    incident_id = %incident.id.0,
                    actor = %principal.id,
                    locked_month = %locked_month,
                );
                self.audit.emit(AuditEvent::new(
                    Some(incident.id.clone()),
                    None,
                    "policy.stale_period",
                    AuditCategory::Policy,
                    &principal.id,
                    AuditOutcome::Denied,
                ));
                Err(WorkflowError::StalePeriod { locked_month: locked_month.clone() })
            }
            MutationDecision::Forbidden { role } => {
                self.audit.emit(AuditEvent::new(
                    Some(incident.id.clone()),
                    None,
                    "policy.forbidden",
                    AuditCategory::Policy,
                    &principal.id,
                    AuditOutcome::Denied,
                ));
                Err(WorkflowError::Forbidden { role: *role, action })
            }
            MutationDecision::Direct => Ok(GatePassed::Direct),
            MutationDecision::RequiresApproval { .. } => Ok(GatePassed::Queue),
        }
    }

    async fn queue_request(
        &self,
        principal: &Principal,
        operation: MutationKind,
        before: IncidentSnapshot,
        after: Option<IncidentSnapshot>,
    ) -> Result<MutationOutcome, WorkflowError> {
        let request = ApprovalRequest::new_pending(
            ApprovalRequestId(Uuid::new_v4().to_string()),
            operation,
            before,
            after,
            principal.id.clone(),
            Utc::now(),
        )?;

        self.requests.insert(request.clone()).await.map_err(store_error)?;

        info!(
            event_name = "approval.request_queued",
            request_id = %request.id.0,
            incident_id = %request.incident_id.0,
            operation = %operation,
            actor = %principal.id,
        );
        self.audit.emit(
            AuditEvent::new(
                Some(request.incident_id.clone()),
                Some(request.id.clone()),
                "approval.request_queued",
                AuditCategory::Approval,
                &principal.id,
                AuditOutcome::Success,
            )
            .with_metadata("operation", operation.as_str()),
        );

        Ok(MutationOutcome::Queued(request))
    }

    async fn load_incident(&self, id: &IncidentId) -> Result<Incident, WorkflowError> {
        self.incidents
            .find_by_id(id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| WorkflowError::NotFound { entity: "incident", id: id.0.clone() })
    }

    /// Resolves display names for a validated draft, checking that every
    /// classification reference exists and that the segment belongs to the
    /// chosen environment.
    async fn resolve_names(
        &self,
        validated: &ValidatedDraft,
    ) -> Result<DisplayNames, WorkflowError> {
        let environment = self
            .lookups
            .environment(validated.environment_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "environment",
                id: validated.environment_id.0.to_string(),
            })?;
        let segment: Segment = self
            .lookups
            .segment(validated.segment_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "segment",
                id: validated.segment_id.0.to_string(),
            })?;
        if segment.environment_id != environment.id {
            return Err(WorkflowError::validation(format!(
                "segment `{}` does not belong to environment `{}`",
                segment.name, environment.name
            )));
        }
        let incident_type = self
            .lookups
            .incident_type(validated.type_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "incident type",
                id: validated.type_id.0.to_string(),
            })?;
        let criticality = self
            .lookups
            .criticality(validated.criticality_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "criticality",
                id: validated.criticality_id.0.to_string(),
            })?;

        Ok(DisplayNames {
            type_name: incident_type.name,
            environment_name: environment.name,
            segment_name: segment.name,
            criticality_name: criticality.name,
        })
    }

    /// Display names for the stored state of an incident, used when
    /// snapshotting the before side of a request.
    async fn current_names(&self, incident: &Incident) -> Result<DisplayNames, WorkflowError> {
        let validated = ValidatedDraft {
            started_at: incident.started_at,
            ended_at: incident.ended_at,
            type_id: incident.type_id,
            environment_id: incident.environment_id,
            segment_id: incident.segment_id,
            criticality_id: incident.criticality_id,
            description: incident.description.clone(),
            actions_taken: incident.actions_taken.clone(),
        };
        self.resolve_names(&validated).await
    }
}

fn check_temporal_order(validated: &ValidatedDraft) -> Result<(), WorkflowError> {
    if let Some(ended_at) = validated.ended_at {
        if ended_at < validated.started_at {
            return Err(WorkflowError::validation("ended_at must not precede started_at"));
        }
    }
    Ok(())
}
