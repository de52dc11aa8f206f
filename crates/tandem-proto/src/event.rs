//! Outbound events delivered to client connections.
//!
//! These are the read side of the protocol: views over coordinator state,
//! never the state itself. The connection layer forwards them verbatim.

use crate::types::{
    EndReason, Feedback, MatchPrefs, RequestId, RequestKind, RequestStatus, SessionId,
    SessionPhase, SkillLevel, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's presence as seen by other users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceInfo {
    /// The user.
    pub user_id: UserId,
    /// Display name from the identity provider.
    pub display_name: String,
    /// Whether the user is currently open to matching.
    pub is_available: bool,
    /// Last time the user did anything.
    pub last_active: DateTime<Utc>,
}

/// Client-facing view of a match request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequestInfo {
    /// Request id.
    pub id: RequestId,
    /// Random or direct.
    pub kind: RequestKind,
    /// Who asked.
    pub requester_id: UserId,
    /// Who was invited (direct requests only).
    pub target_id: Option<UserId>,
    /// Matching preferences.
    pub prefs: MatchPrefs,
    /// Current status.
    pub status: RequestStatus,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// When the request lapses if still pending.
    pub expires_at: DateTime<Utc>,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message id.
    pub id: Uuid,
    /// The participant who sent it.
    pub sender_id: UserId,
    /// Message body.
    pub content: String,
    /// Server-side receive time.
    pub sent_at: DateTime<Utc>,
}

/// Client-facing view of an active session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session id.
    pub id: SessionId,
    /// The participant whose request created the session.
    pub requester_id: UserId,
    /// The participant who accepted (or was matched).
    pub acceptor_id: UserId,
    /// Practice topic.
    pub topic: String,
    /// Skill level the session was created at.
    pub skill_level: SkillLevel,
    /// Planned length in minutes.
    pub duration_minutes: u32,
    /// When the session was created.
    pub started_at: DateTime<Utc>,
    /// Current phase.
    pub phase: SessionPhase,
    /// Seconds left on the practice countdown.
    pub time_remaining_secs: u32,
}

/// Terminal summary of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session id.
    pub id: SessionId,
    /// Practice topic.
    pub topic: String,
    /// When the session was created.
    pub started_at: DateTime<Utc>,
    /// When it ended.
    pub ended_at: DateTime<Utc>,
    /// Wall-clock length in seconds.
    pub duration_secs: u64,
    /// Transcript length.
    pub message_count: usize,
    /// Who triggered the end.
    pub ended_by: UserId,
    /// Why it ended.
    pub reason: EndReason,
    /// Feedback from the participant who ended it, if any.
    pub feedback: Option<Feedback>,
}

/// An event from the coordinator to one user's connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Sent once on connect: every currently-available user.
    PresenceSnapshot {
        /// Available users, excluding the recipient.
        users: Vec<PresenceInfo>,
    },
    /// A user's availability changed.
    PresenceDelta {
        /// The changed presence.
        user: PresenceInfo,
    },
    /// The recipient was invited to a session.
    RequestReceived {
        /// The invitation.
        request: MatchRequestInfo,
    },
    /// A request involving the recipient reached a terminal status.
    RequestResolved {
        /// The request.
        request_id: RequestId,
        /// The terminal status it reached.
        status: RequestStatus,
    },
    /// A session the recipient participates in was created.
    SessionStarted {
        /// The new session.
        session: SessionInfo,
    },
    /// Chat relay from the other participant.
    SessionMessage {
        /// The session.
        session_id: SessionId,
        /// The message.
        message: ChatMessage,
    },
    /// The session moved to a new phase.
    SessionPhaseChanged {
        /// The session.
        session_id: SessionId,
        /// The phase entered.
        phase: SessionPhase,
        /// Countdown seconds remaining at the transition.
        time_remaining_secs: u32,
    },
    /// The session ended.
    SessionEnded {
        /// The session.
        session_id: SessionId,
        /// Terminal summary.
        summary: SessionSummary,
    },
    /// A command from the recipient was rejected.
    Rejected {
        /// Operation name the rejection applies to.
        context: String,
        /// Stable machine-readable code.
        code: String,
        /// Human-readable explanation.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_round_trip() {
        let event = ServerEvent::RequestResolved {
            request_id: Uuid::new_v4(),
            status: RequestStatus::Declined,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"request_resolved\""));
        assert!(json.contains("\"declined\""));
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn rejection_is_wire_ready() {
        let event = ServerEvent::Rejected {
            context: "invite_user".into(),
            code: "self_invite".into(),
            message: "cannot invite yourself".into(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"code\":\"self_invite\""));
    }
}
