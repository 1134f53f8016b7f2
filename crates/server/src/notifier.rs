use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use opsboard_core::Role;
use opsboard_db::repositories::ApprovalRequestRepository;

/// Periodic pending-count poller behind the badge on the approvals menu.
///
/// Each resolver session gets its own notifier scoped to its role, so the
/// published number always matches what that resolver could act on. Store
/// failures keep the last published count; the badge goes stale rather
/// than flickering to zero.
pub struct PendingCountNotifier {
    requests: Arc<dyn ApprovalRequestRepository>,
    role: Role,
    refresh_interval: Duration,
}

/// Handle to a running notifier. Dropping it stops the polling task.
pub struct NotifierHandle {
    receiver: watch::Receiver<u64>,
    task: Option<JoinHandle<()>>,
}

impl NotifierHandle {
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.receiver.clone()
    }

    pub fn current(&self) -> u64 {
        *self.receiver.borrow()
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for NotifierHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl PendingCountNotifier {
    pub fn new(
        requests: Arc<dyn ApprovalRequestRepository>,
        role: Role,
        refresh_interval: Duration,
    ) -> Self {
        Self { requests, role, refresh_interval }
    }

    /// Publishes the current count immediately, then refreshes on the
    /// configured cadence. Roles outside the resolver tiers get a handle
    /// pinned to zero with no polling task behind it.
    pub async fn start(self) -> NotifierHandle {
        if !self.role.can_resolve_requests() {
            let (_, receiver) = watch::channel(0);
            return NotifierHandle { receiver, task: None };
        }

        let initial = match self.requests.count_pending(self.role).await {
            Ok(count) => count,
            Err(error) => {
                warn!(
                    event_name = "notifier.initial_count_failed",
                    role = %self.role,
                    error = %error,
                    "pending-count notifier starting at zero"
                );
                0
            }
        };

        let (sender, receiver) = watch::channel(initial);
        let requests = self.requests;
        let role = self.role;
        let refresh_interval = self.refresh_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval(refresh_interval);
            // A slow query must not cause a burst of catch-up polls.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if sender.is_closed() {
                    break;
                }

                match requests.count_pending(role).await {
                    Ok(count) => {
                        let changed = sender.send_if_modified(|current| {
                            let modified = *current != count;
                            *current = count;
                            modified
                        });
                        if changed {
                            debug!(
                                event_name = "notifier.count_updated",
                                role = %role,
                                pending = count,
                            );
                        }
                    }
                    Err(error) => {
                        warn!(
                            event_name = "notifier.refresh_failed",
                            role = %role,
                            error = %error,
                            "keeping last published pending count"
                        );
                    }
                }
            }
        });

        NotifierHandle { receiver, task: Some(task) }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use opsboard_core::{
        ApprovalRequest, ApprovalRequestId, Incident, IncidentId, IncidentSnapshot, MutationKind,
        Role,
    };
    use opsboard_core::{CriticalityId, DisplayNames, EnvironmentId, IncidentTypeId, SegmentId};
    use opsboard_db::repositories::{
        ApprovalRequestRepository, IncidentRepository, SqlApprovalRequestRepository,
        SqlIncidentRepository,
    };
    use opsboard_db::{migrations, seed_reference_data, DbPool};

    use super::PendingCountNotifier;

    async fn setup() -> DbPool {
        use std::str::FromStr;

        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

        // Under the paused test clock, any pool acquire that awaits the
        // SQLite worker thread (connect, test-before-acquire ping) loses
        // the race against the acquire-timeout timer, which auto-advances
        // and fires immediately. Connect under real time and disable the
        // before-acquire ping so acquires complete without awaiting.
        tokio::time::resume();
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .expect("options")
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .test_before_acquire(false)
            .connect_with(options)
            .await
            .expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        seed_reference_data(&pool).await.expect("reference data");
        tokio::time::pause();
        pool
    }

    /// Busy-waits (without parking, so the paused clock cannot
    /// auto-advance) until sqlx's spawned return-to-pool task has put the
    /// connection back in the idle queue. Acquiring from a quiescent pool
    /// completes on the first poll, so the acquire-timeout timer never
    /// gets a chance to fire under the paused clock.
    async fn quiesce(pool: &DbPool) {
        while pool.num_idle() < 1 {
            tokio::task::yield_now().await;
        }
    }

    async fn queue_request(pool: &DbPool, request_id: &str, incident_id: &str) {
        let incidents = SqlIncidentRepository::new(pool.clone());
        let requests = SqlApprovalRequestRepository::new(pool.clone());

        let now = Utc::now();
        let incident = Incident {
            id: IncidentId(incident_id.to_string()),
            started_at: now,
            ended_at: None,
            duration_minutes: None,
            type_id: IncidentTypeId(1),
            environment_id: EnvironmentId(1),
            segment_id: SegmentId(1),
            criticality_id: CriticalityId(1),
            description: "pending notifier fixture".to_string(),
            actions_taken: None,
            created_at: now,
            created_by: "u-op".to_string(),
            updated_by: None,
        };
        quiesce(pool).await;
        incidents.insert(incident.clone()).await.expect("insert incident");

        let names = DisplayNames {
            type_name: "Link Down".to_string(),
            environment_name: "Production".to_string(),
            segment_name: "Core".to_string(),
            criticality_name: "High".to_string(),
        };
        let before = IncidentSnapshot::from_incident(&incident, names, Role::Operador);
        let request = ApprovalRequest::new_pending(
            ApprovalRequestId(request_id.to_string()),
            MutationKind::Delete,
            before,
            None,
            "u-op",
            now,
        )
        .expect("pending request");
        quiesce(pool).await;
        requests.insert(request).await.expect("insert request");
        quiesce(pool).await;
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_initial_count_and_refreshes_on_cadence() {
        let pool = setup().await;
        queue_request(&pool, "req-1", "inc-1").await;

        let requests = Arc::new(SqlApprovalRequestRepository::new(pool.clone()));
        let notifier =
            PendingCountNotifier::new(requests.clone(), Role::Gestor, Duration::from_secs(60));
        let handle = notifier.start().await;
        assert_eq!(handle.current(), 1);

        queue_request(&pool, "req-2", "inc-2").await;

        let mut receiver = handle.subscribe();
        receiver.changed().await.expect("count update");
        assert_eq!(*receiver.borrow(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn resolved_requests_drop_out_of_the_count() {
        let pool = setup().await;
        queue_request(&pool, "req-1", "inc-1").await;

        let requests = Arc::new(SqlApprovalRequestRepository::new(pool.clone()));
        let notifier =
            PendingCountNotifier::new(requests.clone(), Role::Admin, Duration::from_secs(60));
        let handle = notifier.start().await;
        assert_eq!(handle.current(), 1);

        quiesce(&pool).await;
        requests
            .reject_pending(
                &ApprovalRequestId("req-1".to_string()),
                "u-admin",
                Utc::now(),
                "not needed",
            )
            .await
            .expect("reject");

        let mut receiver = handle.subscribe();
        receiver.changed().await.expect("count update");
        assert_eq!(*receiver.borrow(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn non_resolver_roles_are_pinned_to_zero() {
        let pool = setup().await;
        queue_request(&pool, "req-1", "inc-1").await;

        let requests = Arc::new(SqlApprovalRequestRepository::new(pool.clone()));
        let notifier =
            PendingCountNotifier::new(requests, Role::Operador, Duration::from_secs(60));
        let handle = notifier.start().await;

        assert_eq!(handle.current(), 0);
        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(handle.current(), 0);
    }
}
