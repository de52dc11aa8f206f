//! Central shared state and notification fan-out.
//!
//! The [`Coordinator`] holds all presences, pending requests, and active
//! sessions in concurrent maps accessible from any task, plus one outbound
//! event channel per connected user. Inbound operations live in the `ops`
//! module; background sweeps in `maintenance`.

use crate::config::Config;
use crate::metrics;
use crate::persist::PersistenceSink;
use crate::state::ledger::Ledger;
use crate::state::presence::UserPresence;
use crate::state::sessions::PracticeSession;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tandem_proto::{PresenceInfo, ServerEvent, SessionId, UserId};
use tokio::sync::{Mutex, RwLock, mpsc};

/// Central state container for the matchmaking coordinator.
///
/// Locking discipline: each presence, request, and session has its own
/// guard, so unrelated operations never serialize. Compound transitions
/// take locks in a fixed order (request status, then the two presence
/// write locks in sorted user-id order, then the session map) and buffer
/// their events in an [`Outbox`], flushed only after every lock is
/// released.
pub struct Coordinator {
    /// Handle to self for spawning per-session timer tasks.
    pub(crate) self_ref: Weak<Coordinator>,

    /// Coordinator configuration.
    pub config: Config,

    /// All known users, indexed by user id.
    pub(crate) presences: DashMap<UserId, Arc<RwLock<UserPresence>>>,

    /// Active (pending) match requests.
    pub(crate) ledger: Ledger,

    /// Sessions that have not been archived, indexed by session id.
    pub(crate) sessions: DashMap<SessionId, Arc<Mutex<PracticeSession>>>,

    /// Per-user outbound event channels, registered at connect time.
    pub(crate) senders: DashMap<UserId, mpsc::Sender<ServerEvent>>,

    /// Write-through persistence for finished sessions.
    pub(crate) sink: Arc<dyn PersistenceSink>,
}

impl Coordinator {
    /// Create a coordinator with the given configuration and persistence
    /// sink.
    pub fn new(config: Config, sink: Arc<dyn PersistenceSink>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            config,
            presences: DashMap::new(),
            ledger: Ledger::new(),
            sessions: DashMap::new(),
            senders: DashMap::new(),
            sink,
        })
    }

    /// Look up a user's presence entry.
    pub(crate) fn presence(&self, user_id: &str) -> Option<Arc<RwLock<UserPresence>>> {
        self.presences.get(user_id).map(|entry| entry.value().clone())
    }

    /// Look up an unarchived session.
    pub(crate) fn session(&self, session_id: &SessionId) -> Option<Arc<Mutex<PracticeSession>>> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    /// Deliver an event to one user's connection.
    ///
    /// Delivery is best-effort: a missing or saturated channel drops the
    /// event rather than stalling the coordinator. Clients resynchronize
    /// from the snapshot on reconnect.
    pub fn send_to(&self, user_id: &str, event: ServerEvent) {
        let Some(sender) = self.senders.get(user_id) else {
            return;
        };
        if let Err(e) = sender.try_send(event) {
            metrics::record_event_dropped();
            tracing::debug!(user_id = %user_id, error = %e, "dropping outbound event");
        }
    }

    /// Deliver an event to every connected user except `exclude`.
    pub fn broadcast(&self, event: ServerEvent, exclude: Option<&str>) {
        for entry in self.senders.iter() {
            if exclude.is_some_and(|e| e == entry.key().as_str()) {
                continue;
            }
            if entry.value().try_send(event.clone()).is_err() {
                metrics::record_event_dropped();
            }
        }
    }

    /// Whether the user is currently available for matching.
    pub async fn is_available(&self, user_id: &str) -> bool {
        match self.presence(user_id) {
            Some(presence) => presence.read().await.is_available,
            None => false,
        }
    }

    /// Snapshot of currently available users, excluding one.
    ///
    /// Iteration does not stop writers, so the snapshot may be slightly
    /// stale; match commitment re-validates under lock.
    pub async fn snapshot_available(&self, excluding: Option<&str>) -> Vec<PresenceInfo> {
        let entries: Vec<Arc<RwLock<UserPresence>>> = self
            .presences
            .iter()
            .filter(|entry| excluding != Some(entry.key().as_str()))
            .map(|entry| entry.value().clone())
            .collect();

        let mut available = Vec::new();
        for entry in entries {
            let presence = entry.read().await;
            if presence.is_available {
                available.push(presence.info());
            }
        }
        available
    }

    /// Number of active (unended) sessions. Test and diagnostics surface.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of pending match requests. Test and diagnostics surface.
    pub fn pending_request_count(&self) -> usize {
        self.ledger.len()
    }

    /// Number of tracked presences, connected or not. Test and diagnostics
    /// surface.
    pub fn known_user_count(&self) -> usize {
        self.presences.len()
    }
}

/// Events buffered during a critical section, flushed after every lock is
/// released.
///
/// This is what keeps compound transitions observable as atomic: nobody
/// sees an availability delta without the paired session-started event,
/// because neither leaves the outbox until the whole transition committed.
#[derive(Default)]
pub(crate) struct Outbox {
    queued: Vec<Dispatch>,
}

enum Dispatch {
    To(UserId, ServerEvent),
    Broadcast(ServerEvent, Option<UserId>),
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for one user.
    pub fn to(&mut self, user_id: impl Into<UserId>, event: ServerEvent) {
        self.queued.push(Dispatch::To(user_id.into(), event));
    }

    /// Queue a broadcast to everyone but `exclude`.
    pub fn broadcast(&mut self, event: ServerEvent, exclude: Option<UserId>) {
        self.queued.push(Dispatch::Broadcast(event, exclude));
    }

    /// Deliver everything in queue order.
    pub fn flush(self, coordinator: &Coordinator) {
        for dispatch in self.queued {
            match dispatch {
                Dispatch::To(user_id, event) => coordinator.send_to(&user_id, event),
                Dispatch::Broadcast(event, exclude) => {
                    coordinator.broadcast(event, exclude.as_deref());
                }
            }
        }
    }
}
