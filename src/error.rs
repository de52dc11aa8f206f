//! Unified error handling for the coordinator.
//!
//! Every inbound operation returns a typed rejection from this taxonomy and
//! leaves shared state untouched when it fails. Errors carry an `error_code`
//! label for metrics and for the wire-level `Rejected` event.

use tandem_proto::ServerEvent;
use thiserror::Error;

/// Errors returned by coordinator operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("no live connection for this user")]
    NotConnected,

    #[error("user is not available for matching: {0}")]
    NotAvailable(String),

    #[error("requester already has a pending match request")]
    AlreadyMatching,

    #[error("cannot invite yourself")]
    SelfInvite,

    #[error("a pending invitation already exists between these users")]
    DuplicatePending,

    #[error("no such request or session: {0}")]
    NotFound(String),

    #[error("only the requester may do that")]
    NotOwner,

    #[error("request was already resolved")]
    AlreadyResolved,

    #[error("operation not valid in the session's current phase")]
    WrongPhase,

    #[error("user is not a participant of this session")]
    NotParticipant,

    /// Internal-consistency fault: a participant of a new session is already
    /// in one. Should be unreachable; logged as an anomaly when hit.
    #[error("participant is already in a session: {0}")]
    ParticipantBusy(String),
}

impl CoordinatorError {
    /// Get a static error code string for metrics and wire labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::NotAvailable(_) => "not_available",
            Self::AlreadyMatching => "already_matching",
            Self::SelfInvite => "self_invite",
            Self::DuplicatePending => "duplicate_pending",
            Self::NotFound(_) => "not_found",
            Self::NotOwner => "not_owner",
            Self::AlreadyResolved => "already_resolved",
            Self::WrongPhase => "wrong_phase",
            Self::NotParticipant => "not_participant",
            Self::ParticipantBusy(_) => "participant_busy",
        }
    }

    /// Convert to the wire-level rejection event for the offending caller.
    pub fn to_rejection(&self, context: &str) -> ServerEvent {
        ServerEvent::Rejected {
            context: context.to_string(),
            code: self.error_code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CoordinatorError::NotConnected.error_code(), "not_connected");
        assert_eq!(CoordinatorError::AlreadyMatching.error_code(), "already_matching");
        assert_eq!(
            CoordinatorError::NotAvailable("u-1".into()).error_code(),
            "not_available"
        );
        assert_eq!(
            CoordinatorError::ParticipantBusy("u-1".into()).error_code(),
            "participant_busy"
        );
    }

    #[test]
    fn test_rejection_event() {
        let rejection = CoordinatorError::SelfInvite.to_rejection("invite_user");
        match rejection {
            ServerEvent::Rejected { context, code, .. } => {
                assert_eq!(context, "invite_user");
                assert_eq!(code, "self_invite");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }
}
