//! # tandem-proto
//!
//! Protocol types shared between the Tandem coordinator and the connection
//! layer that fronts it: inbound client commands, outbound server events,
//! and the data model both sides agree on (skill levels, session phases,
//! request status, presence and session views).
//!
//! Everything here is plain data. All types are serde-serializable so the
//! connection layer can move them over whatever transport it owns; the
//! coordinator never sees wire framing.
//!
//! ## Quick Start
//!
//! ```rust
//! use tandem_proto::{ClientCommand, MatchPrefs, SkillLevel, SkillPreference};
//!
//! let cmd = ClientCommand::RequestRandomMatch {
//!     prefs: MatchPrefs {
//!         topic: "job interviews".into(),
//!         skill_level: SkillLevel::Intermediate,
//!         preferred_skill_level: SkillPreference::Any,
//!         duration_minutes: 15,
//!     },
//! };
//!
//! let json = serde_json::to_string(&cmd).unwrap();
//! assert!(json.contains("request_random_match"));
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod command;
pub mod event;
pub mod types;

pub use self::command::ClientCommand;
pub use self::event::{
    ChatMessage, MatchRequestInfo, PresenceInfo, ServerEvent, SessionInfo, SessionSummary,
};
pub use self::types::{
    ConnectionId, EndReason, Feedback, MatchPrefs, RequestId, RequestKind, RequestStatus,
    SessionId, SessionPhase, SkillLevel, SkillPreference, UserId,
};
