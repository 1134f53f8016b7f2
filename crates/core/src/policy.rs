use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::MutationKind;
use crate::domain::identity::Role;

/// Outcome of the mutation policy for a (role, incident age) pair.
///
/// `StalePeriod` is a hard stop, not a policy tier: editorial windows are
/// locked to the calendar month of creation and the lock applies to every
/// role, admin included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationDecision {
    Direct,
    RequiresApproval { eligible_approvers: Vec<Role> },
    StalePeriod { locked_month: String },
    Forbidden { role: Role },
}

/// Decides whether a requested edit/delete applies immediately, must be
/// queued for approval, or is blocked. Rules are evaluated in order; the
/// calendar-month lock wins over everything else. Month boundaries are
/// compared in UTC.
pub fn decide(
    role: Role,
    incident_created_at: DateTime<Utc>,
    _operation: MutationKind,
    now: DateTime<Utc>,
) -> MutationDecision {
    let created = (incident_created_at.year(), incident_created_at.month());
    let current = (now.year(), now.month());
    if created != current {
        return MutationDecision::StalePeriod { locked_month: format_month(incident_created_at) };
    }

    match role {
        Role::Admin => MutationDecision::Direct,
        Role::Gestor | Role::Operador => MutationDecision::RequiresApproval {
            eligible_approvers: Role::eligible_approvers(role).to_vec(),
        },
        Role::Cliente => MutationDecision::Forbidden { role },
    }
}

fn format_month(timestamp: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", timestamp.year(), timestamp.month())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::domain::approval::MutationKind;
    use crate::domain::identity::Role;

    use super::{decide, MutationDecision};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 15, 12, 0, 0).single().expect("timestamp")
    }

    #[test]
    fn stale_month_blocks_every_role() {
        let last_month = Utc.with_ymd_and_hms(2026, 7, 31, 23, 59, 0).single().expect("timestamp");

        for role in [Role::Admin, Role::Gestor, Role::Operador, Role::Cliente] {
            for operation in [MutationKind::Edit, MutationKind::Delete] {
                let decision = decide(role, last_month, operation, now());
                assert_eq!(
                    decision,
                    MutationDecision::StalePeriod { locked_month: "2026-07".to_string() },
                    "role {role} operation {operation}"
                );
            }
        }
    }

    #[test]
    fn month_lock_compares_month_and_year_not_age() {
        // Dec 2025 vs Jan 2026: different month even though < 31 days apart.
        let created = Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).single().expect("timestamp");
        let current = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).single().expect("timestamp");

        let decision = decide(Role::Admin, created, MutationKind::Edit, current);
        assert_eq!(decision, MutationDecision::StalePeriod { locked_month: "2025-12".to_string() });

        // Same month a year apart must also be stale.
        let year_apart = decide(
            Role::Admin,
            created,
            MutationKind::Edit,
            created + Duration::days(365),
        );
        assert!(matches!(year_apart, MutationDecision::StalePeriod { .. }));
    }

    #[test]
    fn admin_mutates_directly_within_the_month() {
        for operation in [MutationKind::Edit, MutationKind::Delete] {
            assert_eq!(decide(Role::Admin, now(), operation, now()), MutationDecision::Direct);
        }
    }

    #[test]
    fn gestor_requires_admin_approval() {
        let decision = decide(Role::Gestor, now(), MutationKind::Edit, now());
        assert_eq!(
            decision,
            MutationDecision::RequiresApproval { eligible_approvers: vec![Role::Admin] }
        );
    }

    #[test]
    fn operador_may_be_approved_by_either_tier_above() {
        let decision = decide(Role::Operador, now(), MutationKind::Delete, now());
        assert_eq!(
            decision,
            MutationDecision::RequiresApproval {
                eligible_approvers: vec![Role::Gestor, Role::Admin]
            }
        );
    }

    #[test]
    fn cliente_is_forbidden_even_within_the_month() {
        let decision = decide(Role::Cliente, now(), MutationKind::Edit, now());
        assert_eq!(decision, MutationDecision::Forbidden { role: Role::Cliente });
    }
}
