//! Background sweeps: request expiry, presence reaping, and session
//! archival.

use crate::metrics;
use crate::state::Coordinator;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tandem_proto::{RequestStatus, ServerEvent, SessionPhase};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Handles to the spawned maintenance tasks.
pub struct MaintenanceHandles {
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceHandles {
    /// Stop all maintenance tasks. Sweeps are idempotent, so an abort
    /// mid-cycle leaves nothing inconsistent.
    pub fn abort_all(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for MaintenanceHandles {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Spawn the periodic maintenance tasks for a coordinator.
pub fn spawn_maintenance(coordinator: Arc<Coordinator>) -> MaintenanceHandles {
    info!(
        sweep_interval_ms = coordinator.config.matching.sweep_interval_ms,
        reap_after_secs = coordinator.config.presence.reap_after_secs,
        archive_grace_secs = coordinator.config.session.archive_grace_secs,
        "starting maintenance tasks"
    );
    MaintenanceHandles {
        tasks: vec![
            tokio::spawn(expiry_sweep(coordinator.clone())),
            tokio::spawn(presence_reaper(coordinator.clone())),
            tokio::spawn(session_archiver(coordinator)),
        ],
    }
}

/// Expire pending requests whose deadline has passed.
///
/// Expiry races with accept, cancel, and decline on the status lock;
/// whichever resolves first wins and the others become no-ops.
async fn expiry_sweep(coordinator: Arc<Coordinator>) {
    let mut interval = tokio::time::interval(coordinator.config.matching.sweep_interval());
    loop {
        interval.tick().await;
        let now = Utc::now();
        for request in coordinator.ledger.expired_by(now) {
            if request.resolve(RequestStatus::Expired).await.is_err() {
                continue;
            }
            coordinator.ledger.remove(&request.id);
            metrics::add_requests(-1);
            metrics::record_request_expired();

            let resolved = ServerEvent::RequestResolved {
                request_id: request.id,
                status: RequestStatus::Expired,
            };
            coordinator.send_to(&request.requester_id, resolved.clone());
            if let Some(target) = &request.target_id {
                coordinator.send_to(target, resolved);
            }
            debug!(request_id = %request.id, requester = %request.requester_id, "request expired");
        }
    }
}

/// Drop presence entries for users who disconnected long ago.
async fn presence_reaper(coordinator: Arc<Coordinator>) {
    let mut interval =
        tokio::time::interval(Duration::from_secs(coordinator.config.presence.reap_interval_secs));
    loop {
        interval.tick().await;
        let cutoff = Utc::now()
            - ChronoDuration::seconds(coordinator.config.presence.reap_after_secs as i64);

        let entries: Vec<_> = coordinator
            .presences
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        for (user_id, entry) in entries {
            let stale = {
                let presence = entry.read().await;
                !presence.is_connected()
                    && presence.in_session.is_none()
                    && presence.last_active < cutoff
            };
            if !stale {
                continue;
            }
            // Re-check under the map entry so a reconnect between the read
            // and the removal is not lost. A locked entry waits for the
            // next cycle.
            let removed = coordinator.presences.remove_if(&user_id, |_, value| {
                value
                    .try_read()
                    .map(|p| !p.is_connected() && p.in_session.is_none() && p.last_active < cutoff)
                    .unwrap_or(false)
            });
            if removed.is_some() {
                debug!(user_id = %user_id, "reaped stale presence");
            }
        }
    }
}

/// Archive ended sessions once both participants have departed or the
/// departure grace period has elapsed.
async fn session_archiver(coordinator: Arc<Coordinator>) {
    let mut interval =
        tokio::time::interval(Duration::from_secs(coordinator.config.session.archive_interval_secs));
    loop {
        interval.tick().await;
        let grace = ChronoDuration::seconds(coordinator.config.session.archive_grace_secs as i64);
        let now = Utc::now();

        let entries: Vec<_> = coordinator
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        for (session_id, session) in entries {
            let archivable = {
                let s = session.lock().await;
                s.phase == SessionPhase::Ended
                    && (s.departed.len() >= 2
                        || s.ended_at.is_some_and(|ended_at| ended_at + grace < now))
            };
            if archivable {
                // Ended is terminal, so the check cannot go stale.
                coordinator.sessions.remove(&session_id);
                debug!(session_id = %session_id, "archived session");
            }
        }
    }
}
