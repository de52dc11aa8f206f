//! Presence operations: connect, availability toggles, disconnect.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::metrics;
use crate::state::Coordinator;
use crate::state::coordinator::Outbox;
use crate::state::presence::UserPresence;
use std::sync::Arc;
use tandem_proto::{ConnectionId, Feedback, RequestStatus, ServerEvent, UserId};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

impl Coordinator {
    /// Register a user's connection.
    ///
    /// Called by the connection layer once the identity provider has
    /// verified the user. Returns the connection id (the layer must hand it
    /// back on [`disconnect`](Self::disconnect)) and the receiving end of
    /// the user's event channel.
    ///
    /// The joiner gets a `PresenceSnapshot` of currently available users;
    /// everyone else gets a `PresenceDelta` introducing them. A reconnect
    /// replaces the previous connection; the stale connection's eventual
    /// disconnect callback is ignored.
    pub async fn connect(
        &self,
        user_id: UserId,
        display_name: String,
    ) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let connection_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.config.coordinator.event_buffer.max(1));

        let entry = self
            .presences
            .entry(user_id.clone())
            .or_insert_with(|| {
                Arc::new(RwLock::new(UserPresence::new(
                    user_id.clone(),
                    display_name.clone(),
                    connection_id,
                )))
            })
            .value()
            .clone();

        let (was_connected, delta) = {
            let mut presence = entry.write().await;
            let was_connected = presence.is_connected();
            presence.connection = Some(connection_id);
            presence.display_name = display_name;
            // Availability never survives a (re)connect; the client
            // re-declares it.
            if presence.is_available {
                metrics::add_available(-1);
            }
            presence.is_available = false;
            presence.touch();
            (was_connected, presence.info())
        };

        // Replace any previous channel so events follow the live connection.
        self.senders.insert(user_id.clone(), tx);
        if !was_connected {
            metrics::add_connected(1);
        }

        let snapshot = self.snapshot_available(Some(&user_id)).await;
        self.send_to(&user_id, ServerEvent::PresenceSnapshot { users: snapshot });
        self.broadcast(ServerEvent::PresenceDelta { user: delta }, Some(&user_id));

        info!(user_id = %user_id, connection_id = %connection_id, reconnect = was_connected, "user connected");
        (connection_id, rx)
    }

    /// Toggle a user's availability for matching.
    ///
    /// Turning availability on requires a live connection and no active
    /// session. Turning it off always succeeds for a known user. An
    /// effective change is broadcast to all other connected users.
    pub async fn set_availability(&self, user_id: &str, available: bool) -> CoordinatorResult<()> {
        let entry = self.presence(user_id).ok_or(CoordinatorError::NotConnected)?;

        let delta = {
            let mut presence = entry.write().await;
            if available && !presence.is_connected() {
                return Err(CoordinatorError::NotConnected);
            }
            if available && presence.in_session.is_some() {
                return Err(CoordinatorError::NotAvailable(user_id.to_string()));
            }
            presence.touch();
            if presence.is_available == available {
                return Ok(());
            }
            presence.is_available = available;
            presence.info()
        };

        metrics::add_available(if available { 1 } else { -1 });
        self.broadcast(ServerEvent::PresenceDelta { user: delta }, Some(user_id));
        debug!(user_id = %user_id, available, "availability changed");
        Ok(())
    }

    /// Handle a connection-layer disconnect callback.
    ///
    /// Ignored when `connection_id` is stale (the user already
    /// reconnected). Otherwise forces availability off, cancels every
    /// pending request involving the user, and ends their active session
    /// with a system feedback placeholder. Cleanup is best-effort and never
    /// raises an error to a peer beyond the informational events.
    pub async fn disconnect(&self, user_id: &str, connection_id: ConnectionId) {
        let Some(entry) = self.presence(user_id) else {
            return;
        };

        let (was_available, in_session, delta) = {
            let mut presence = entry.write().await;
            if presence.connection != Some(connection_id) {
                debug!(user_id = %user_id, connection_id = %connection_id, "ignoring stale disconnect");
                return;
            }
            presence.connection = None;
            let was_available = presence.is_available;
            presence.is_available = false;
            presence.touch();
            (was_available, presence.in_session, presence.info())
        };

        self.senders.remove(user_id);
        metrics::add_connected(-1);
        if was_available {
            metrics::add_available(-1);
        }

        if was_available {
            self.broadcast(ServerEvent::PresenceDelta { user: delta }, Some(user_id));
        }

        // Cascading cancel: every pending request the user is party to.
        let mut outbox = Outbox::new();
        for request in self.ledger.pending_involving(user_id) {
            if request.resolve(RequestStatus::Cancelled).await.is_err() {
                continue;
            }
            self.ledger.remove(&request.id);
            metrics::add_requests(-1);
            if let Some(counterpart) = request.counterpart(user_id) {
                outbox.to(counterpart, ServerEvent::RequestResolved {
                    request_id: request.id,
                    status: RequestStatus::Cancelled,
                });
            }
        }
        outbox.flush(self);

        // End their session on their behalf; the placeholder feedback
        // carries no rating.
        if let Some(session_id) = in_session {
            let _ = self
                .end_session_disconnected(&session_id, user_id, Feedback::default())
                .await;
        }

        info!(user_id = %user_id, had_session = in_session.is_some(), "user disconnected");
    }
}
