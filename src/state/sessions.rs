//! Practice session state and its phase machine.
//!
//! The Session Manager (ops layer) is the sole mutator of an active
//! session; everything here runs under the session's mutex.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tandem_proto::{
    ChatMessage, EndReason, Feedback, MatchPrefs, SessionId, SessionInfo, SessionPhase,
    SessionSummary, SkillLevel, UserId,
};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A timed two-party practice session.
#[derive(Debug)]
pub struct PracticeSession {
    pub id: SessionId,
    /// Participant whose request created the session.
    pub requester_id: UserId,
    /// Participant who accepted or was matched.
    pub acceptor_id: UserId,
    pub topic: String,
    pub skill_level: SkillLevel,
    pub duration_minutes: u32,
    pub started_at: DateTime<Utc>,
    pub phase: SessionPhase,
    /// Practice countdown in whole seconds. Server-owned; client timers are
    /// display only.
    pub time_remaining_secs: u32,
    /// Append-only transcript.
    pub transcript: Vec<ChatMessage>,
    /// Feedback per participant, recorded as submitted.
    pub feedback: HashMap<UserId, Feedback>,
    /// Participants who have left the ended session.
    pub departed: HashSet<UserId>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
    pub ended_by: Option<UserId>,
    /// Countdown task while in Practice. Aborted synchronously on any
    /// transition out of Practice.
    pub(crate) timer: Option<JoinHandle<()>>,
}

impl PracticeSession {
    /// Create a session in the Introduction phase.
    ///
    /// `duration_minutes` is already clamped by the caller.
    pub fn new(
        requester_id: UserId,
        acceptor_id: UserId,
        prefs: &MatchPrefs,
        duration_minutes: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester_id,
            acceptor_id,
            topic: prefs.topic.clone(),
            skill_level: prefs.skill_level,
            duration_minutes,
            started_at: Utc::now(),
            phase: SessionPhase::Introduction,
            time_remaining_secs: duration_minutes * 60,
            transcript: Vec::new(),
            feedback: HashMap::new(),
            departed: HashSet::new(),
            ended_at: None,
            end_reason: None,
            ended_by: None,
            timer: None,
        }
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.requester_id == user_id || self.acceptor_id == user_id
    }

    /// The other participant, if `user_id` is one of the two.
    pub fn other_participant(&self, user_id: &str) -> Option<UserId> {
        if self.requester_id == user_id {
            Some(self.acceptor_id.clone())
        } else if self.acceptor_id == user_id {
            Some(self.requester_id.clone())
        } else {
            None
        }
    }

    pub fn participants(&self) -> [UserId; 2] {
        [self.requester_id.clone(), self.acceptor_id.clone()]
    }

    /// Whether an explicit advance to `to` is a legal single forward step.
    ///
    /// `Ended` is never reached through an advance; it goes through the end
    /// path so teardown runs exactly once.
    pub fn can_advance_to(&self, to: SessionPhase) -> bool {
        matches!(
            (self.phase, to),
            (SessionPhase::Introduction, SessionPhase::Practice)
                | (SessionPhase::Practice, SessionPhase::Feedback)
        )
    }

    /// Append a chat message to the transcript.
    pub fn append_message(&mut self, sender_id: UserId, content: String) -> ChatMessage {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            sender_id,
            content,
            sent_at: Utc::now(),
        };
        self.transcript.push(message.clone());
        message
    }

    /// Abort the countdown task, if one is running.
    pub fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// The outbound view of this session.
    pub fn view(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            requester_id: self.requester_id.clone(),
            acceptor_id: self.acceptor_id.clone(),
            topic: self.topic.clone(),
            skill_level: self.skill_level,
            duration_minutes: self.duration_minutes,
            started_at: self.started_at,
            phase: self.phase,
            time_remaining_secs: self.time_remaining_secs,
        }
    }

    /// Terminal summary. Only meaningful once the session has ended.
    pub fn summary(&self) -> SessionSummary {
        let ended_at = self.ended_at.unwrap_or_else(Utc::now);
        let ended_by = self.ended_by.clone().unwrap_or_else(|| self.requester_id.clone());
        SessionSummary {
            id: self.id,
            topic: self.topic.clone(),
            started_at: self.started_at,
            ended_at,
            duration_secs: (ended_at - self.started_at).num_seconds().max(0) as u64,
            message_count: self.transcript.len(),
            ended_by: ended_by.clone(),
            reason: self.end_reason.unwrap_or(EndReason::Ended),
            feedback: self.feedback.get(&ended_by).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_proto::SkillPreference;

    fn session() -> PracticeSession {
        let prefs = MatchPrefs {
            topic: "debating".into(),
            skill_level: SkillLevel::Advanced,
            preferred_skill_level: SkillPreference::Similar,
            duration_minutes: 20,
        };
        PracticeSession::new("u-1".into(), "u-2".into(), &prefs, 20)
    }

    #[test]
    fn test_new_session_shape() {
        let s = session();
        assert_eq!(s.phase, SessionPhase::Introduction);
        assert_eq!(s.time_remaining_secs, 20 * 60);
        assert!(s.transcript.is_empty());
        assert!(s.is_participant("u-1"));
        assert!(s.is_participant("u-2"));
        assert!(!s.is_participant("u-3"));
        assert_eq!(s.other_participant("u-1").as_deref(), Some("u-2"));
        assert_eq!(s.other_participant("u-3"), None);
    }

    #[test]
    fn test_phase_machine_is_monotonic() {
        let mut s = session();
        assert!(s.can_advance_to(SessionPhase::Practice));
        assert!(!s.can_advance_to(SessionPhase::Feedback));
        assert!(!s.can_advance_to(SessionPhase::Ended));
        assert!(!s.can_advance_to(SessionPhase::Introduction));

        s.phase = SessionPhase::Practice;
        assert!(!s.can_advance_to(SessionPhase::Practice));
        assert!(s.can_advance_to(SessionPhase::Feedback));

        s.phase = SessionPhase::Feedback;
        assert!(!s.can_advance_to(SessionPhase::Practice));
        assert!(!s.can_advance_to(SessionPhase::Ended));

        s.phase = SessionPhase::Ended;
        assert!(!s.can_advance_to(SessionPhase::Feedback));
    }

    #[test]
    fn test_transcript_appends_in_order() {
        let mut s = session();
        s.append_message("u-1".into(), "hello".into());
        s.append_message("u-2".into(), "hi".into());
        assert_eq!(s.transcript.len(), 2);
        assert_eq!(s.transcript[0].content, "hello");
        assert_eq!(s.transcript[1].sender_id, "u-2");
    }

    #[test]
    fn test_summary_reflects_end_state() {
        let mut s = session();
        s.append_message("u-1".into(), "hello".into());
        s.phase = SessionPhase::Ended;
        s.ended_at = Some(s.started_at + chrono::Duration::seconds(90));
        s.ended_by = Some("u-2".into());
        s.end_reason = Some(EndReason::Disconnected);
        s.feedback.insert("u-2".into(), Feedback::default());

        let summary = s.summary();
        assert_eq!(summary.duration_secs, 90);
        assert_eq!(summary.message_count, 1);
        assert_eq!(summary.ended_by, "u-2");
        assert_eq!(summary.reason, EndReason::Disconnected);
        assert_eq!(summary.feedback, Some(Feedback::default()));
    }
}
