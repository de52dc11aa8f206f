//! Per-user presence: live connection and availability for matching.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tandem_proto::{ConnectionId, PresenceInfo, SessionId, UserId};

/// A known user's connection and matching state.
///
/// Invariants: `is_available` implies a live connection; entering a session
/// clears availability; disconnecting forces availability false. The
/// presence reaper removes entries whose connection has been gone past the
/// configured window.
#[derive(Debug)]
pub struct UserPresence {
    pub user_id: UserId,
    pub display_name: String,
    /// Open to matching. Never true without a live connection.
    pub is_available: bool,
    /// Current live connection, if any. Refreshed on reconnect, so a late
    /// disconnect callback for a replaced connection is recognizably stale.
    pub connection: Option<ConnectionId>,
    pub last_active: DateTime<Utc>,
    /// The session this user is in, if any.
    pub in_session: Option<SessionId>,
    /// Most recent random-match partners, newest first. Bounded; feeds the
    /// repeat-avoidance rule in pairing.
    pub recent_partners: VecDeque<UserId>,
}

impl UserPresence {
    /// Create a presence entry for a user connecting for the first time.
    ///
    /// New connections start unavailable; the client declares availability
    /// explicitly.
    pub fn new(user_id: UserId, display_name: String, connection: ConnectionId) -> Self {
        Self {
            user_id,
            display_name,
            is_available: false,
            connection: Some(connection),
            last_active: Utc::now(),
            in_session: None,
            recent_partners: VecDeque::new(),
        }
    }

    /// Whether the user has a live connection.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Whether the user can be committed into a match right now.
    pub fn can_match(&self) -> bool {
        self.is_connected() && self.is_available && self.in_session.is_none()
    }

    /// Refresh the activity timestamp.
    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// Remember a partner for repeat avoidance, keeping at most `cap`.
    pub fn remember_partner(&mut self, partner: UserId, cap: usize) {
        self.recent_partners.retain(|p| p != &partner);
        self.recent_partners.push_front(partner);
        while self.recent_partners.len() > cap.max(1) {
            self.recent_partners.pop_back();
        }
    }

    /// The outbound view of this presence.
    pub fn info(&self) -> PresenceInfo {
        PresenceInfo {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            is_available: self.is_available,
            last_active: self.last_active,
        }
    }
}
