//! Inbound commands from a connected client.

use crate::types::{Feedback, MatchPrefs, RequestId, SessionId, SessionPhase, UserId};
use serde::{Deserialize, Serialize};

/// A command from a connected user, forwarded verbatim by the connection
/// layer to [`Coordinator::dispatch`].
///
/// Joining and disconnecting are not commands: the connection layer calls
/// `connect`/`disconnect` directly because they carry the event channel and
/// the connection id, which never cross the wire.
///
/// [`Coordinator::dispatch`]: https://docs.rs/tandem-coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Toggle availability for matching.
    SetAvailability {
        /// Desired availability.
        available: bool,
    },
    /// Ask to be paired with any compatible available user.
    RequestRandomMatch {
        /// Matching preferences.
        prefs: MatchPrefs,
    },
    /// Invite a specific user to a session.
    InviteUser {
        /// The invited user.
        target_id: UserId,
        /// Matching preferences.
        prefs: MatchPrefs,
    },
    /// Accept or decline a direct invitation.
    RespondToRequest {
        /// The request being answered.
        request_id: RequestId,
        /// `true` to accept, `false` to decline.
        accept: bool,
    },
    /// Withdraw one of the caller's own pending requests.
    CancelRequest {
        /// The request being withdrawn.
        request_id: RequestId,
    },
    /// Send a chat message inside an active session.
    SendSessionMessage {
        /// The session.
        session_id: SessionId,
        /// Message body.
        content: String,
    },
    /// Move the session forward one phase.
    AdvancePhase {
        /// The session.
        session_id: SessionId,
        /// The phase to enter.
        to: SessionPhase,
    },
    /// End a session, optionally submitting feedback.
    EndSession {
        /// The session.
        session_id: SessionId,
        /// Feedback from the caller, if any.
        feedback: Option<Feedback>,
    },
}

impl ClientCommand {
    /// Short operation name, used for logging and metric labels.
    pub fn op(&self) -> &'static str {
        match self {
            ClientCommand::SetAvailability { .. } => "set_availability",
            ClientCommand::RequestRandomMatch { .. } => "request_random_match",
            ClientCommand::InviteUser { .. } => "invite_user",
            ClientCommand::RespondToRequest { .. } => "respond_to_request",
            ClientCommand::CancelRequest { .. } => "cancel_request",
            ClientCommand::SendSessionMessage { .. } => "send_session_message",
            ClientCommand::AdvancePhase { .. } => "advance_phase",
            ClientCommand::EndSession { .. } => "end_session",
        }
    }
}
