//! Core data-model types shared by commands, events, and the coordinator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable user identifier, supplied verified by the identity provider.
pub type UserId = String;

/// Unique identifier for a match request.
pub type RequestId = Uuid;

/// Unique identifier for a practice session.
pub type SessionId = Uuid;

/// Identifier for a single live connection.
///
/// A user who reconnects gets a fresh connection id; disconnect callbacks
/// carrying a stale id are ignored by the coordinator.
pub type ConnectionId = Uuid;

/// Self-assessed skill level of a user for a given topic.
///
/// Ordered: `Beginner < Intermediate < Advanced`. The ordering matters for
/// the pairing policy, where an `Advanced` preference means "strictly
/// higher level than mine".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    /// Just starting out.
    Beginner,
    /// Comfortable with the basics.
    Intermediate,
    /// Experienced practitioner.
    Advanced,
}

/// What kind of partner a user wants to be paired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillPreference {
    /// Only partners at the same skill level.
    Similar,
    /// Only partners at a strictly higher skill level.
    Advanced,
    /// Anyone.
    Any,
}

/// Whether a match request was created by random matching or by a direct
/// invitation to a specific user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Matched against the pool of other random requesters.
    Random,
    /// Directed at a named target user.
    Direct,
}

/// Lifecycle status of a match request.
///
/// `Pending` is the only non-terminal status. Terminal transitions are
/// one-way; a request never leaves a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Waiting for a candidate, a response, expiry, or cancellation.
    Pending,
    /// Accepted; a session was created from this request.
    Accepted,
    /// Declined by the target.
    Declined,
    /// Expired without resolution.
    Expired,
    /// Cancelled by the requester or by disconnect cleanup.
    Cancelled,
}

impl RequestStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        self != RequestStatus::Pending
    }
}

/// Phase of a practice session.
///
/// Transitions are monotonic: `Introduction -> Practice -> Feedback ->
/// Ended`. `Practice` may move to `Feedback` either explicitly or when the
/// countdown reaches zero; `Ended` is reachable from any phase via an
/// explicit end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Participants introduce themselves; the countdown has not started.
    Introduction,
    /// Timed practice with chat relay.
    Practice,
    /// Countdown finished or practice ended; feedback is collected.
    Feedback,
    /// Terminal. The session is awaiting archival.
    Ended,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A participant ended the session explicitly.
    Ended,
    /// A participant disconnected and the coordinator ended it on their
    /// behalf.
    Disconnected,
}

/// Matching preferences supplied with a random-match request or invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPrefs {
    /// Free-form practice topic.
    pub topic: String,
    /// The requester's own skill level.
    pub skill_level: SkillLevel,
    /// What partner skill level the requester seeks.
    pub preferred_skill_level: SkillPreference,
    /// Requested session length in minutes.
    pub duration_minutes: u32,
}

/// Post-session feedback from one participant.
///
/// Both fields are optional: disconnect cleanup records a placeholder with
/// neither set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// Rating of the session, 1-5.
    pub rating: Option<u8>,
    /// Free-form notes.
    pub notes: Option<String>,
}
