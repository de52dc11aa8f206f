//! Session operations: chat relay, phase advancement, the countdown
//! timer, and the end-of-session path shared by explicit ends and
//! disconnects.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::metrics;
use crate::persist::SessionRecord;
use crate::state::Coordinator;
use crate::state::sessions::PracticeSession;
use chrono::Utc;
use std::time::Duration;
use tandem_proto::{ChatMessage, EndReason, Feedback, ServerEvent, SessionId, SessionPhase, UserId};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const PERSIST_ATTEMPTS: u32 = 3;

impl Coordinator {
    /// Relay a chat message to the other participant.
    ///
    /// Messages are accepted only during the practice phase and are
    /// appended to the transcript before relay, so the summary's message
    /// count always covers everything a participant saw.
    pub async fn send_session_message(
        &self,
        sender_id: &str,
        session_id: SessionId,
        content: String,
    ) -> CoordinatorResult<ChatMessage> {
        let session = self
            .session(&session_id)
            .ok_or_else(|| CoordinatorError::NotFound(session_id.to_string()))?;
        let (message, recipient) = {
            let mut s = session.lock().await;
            if !s.is_participant(sender_id) {
                return Err(CoordinatorError::NotParticipant);
            }
            if s.phase != SessionPhase::Practice {
                return Err(CoordinatorError::WrongPhase);
            }
            let recipient = s
                .other_participant(sender_id)
                .ok_or(CoordinatorError::NotParticipant)?;
            let message = s.append_message(sender_id.to_string(), content);
            (message, recipient)
        };

        if let Some(entry) = self.presence(sender_id) {
            entry.write().await.touch();
        }
        self.send_to(&recipient, ServerEvent::SessionMessage {
            session_id,
            message: message.clone(),
        });
        Ok(message)
    }

    /// Move a session forward one phase.
    ///
    /// Phases only move forward, one step at a time, and either
    /// participant may advance. Entering practice arms the countdown;
    /// leaving it early disarms the timer before it can fire.
    pub async fn advance_phase(
        &self,
        user_id: &str,
        session_id: SessionId,
        to: SessionPhase,
    ) -> CoordinatorResult<()> {
        let session = self
            .session(&session_id)
            .ok_or_else(|| CoordinatorError::NotFound(session_id.to_string()))?;
        let (event, participants) = {
            let mut s = session.lock().await;
            if !s.is_participant(user_id) {
                return Err(CoordinatorError::NotParticipant);
            }
            if !s.can_advance_to(to) {
                return Err(CoordinatorError::WrongPhase);
            }
            s.phase = to;
            match to {
                SessionPhase::Practice => {
                    s.timer = Some(self.spawn_session_timer(session_id));
                }
                SessionPhase::Feedback => s.stop_timer(),
                _ => {}
            }
            let event = ServerEvent::SessionPhaseChanged {
                session_id,
                phase: to,
                time_remaining_secs: s.time_remaining_secs,
            };
            (event, s.participants())
        };

        for participant in participants {
            self.send_to(&participant, event.clone());
        }
        debug!(session_id = %session_id, by = %user_id, phase = ?to, "session phase advanced");
        Ok(())
    }

    /// End a session explicitly, optionally attaching feedback.
    pub async fn end_session(
        &self,
        user_id: &str,
        session_id: SessionId,
        feedback: Option<Feedback>,
    ) -> CoordinatorResult<()> {
        self.end_session_inner(&session_id, user_id, feedback, EndReason::Ended).await
    }

    /// End a session because a participant's connection went away.
    pub(crate) async fn end_session_disconnected(
        &self,
        session_id: &SessionId,
        user_id: &str,
        placeholder: Feedback,
    ) -> CoordinatorResult<()> {
        self.end_session_inner(session_id, user_id, Some(placeholder), EndReason::Disconnected)
            .await
    }

    async fn end_session_inner(
        &self,
        session_id: &SessionId,
        by: &str,
        feedback: Option<Feedback>,
        reason: EndReason,
    ) -> CoordinatorResult<()> {
        let session = self
            .session(session_id)
            .ok_or_else(|| CoordinatorError::NotFound(session_id.to_string()))?;
        let mut s = session.lock().await;
        if !s.is_participant(by) {
            return Err(CoordinatorError::NotParticipant);
        }

        if s.phase == SessionPhase::Ended {
            // Second participant leaving an already-ended session: absorb
            // their feedback, no second terminal event.
            if let Some(fb) = feedback {
                s.feedback.insert(by.to_string(), fb);
            }
            s.departed.insert(by.to_string());
            let record = build_record(&s);
            let both_departed = s.departed.len() >= 2;
            drop(s);

            self.spawn_persistence(record, Vec::new());
            if both_departed {
                self.sessions.remove(session_id);
                debug!(session_id = %session_id, "session archived, both participants departed");
            }
            return Ok(());
        }

        s.stop_timer();
        s.phase = SessionPhase::Ended;
        s.ended_at = Some(Utc::now());
        s.ended_by = Some(by.to_string());
        s.end_reason = Some(reason);
        if let Some(fb) = feedback {
            s.feedback.insert(by.to_string(), fb);
        }
        s.departed.insert(by.to_string());

        let summary = s.summary();
        let participants = s.participants();
        let record = build_record(&s);
        let ender_rating = s.feedback.get(by).and_then(|fb| fb.rating);
        drop(s);

        metrics::add_sessions(-1);
        metrics::record_session_end(match reason {
            EndReason::Ended => "ended",
            EndReason::Disconnected => "disconnected",
        });

        // Participants come back connected but unavailable; re-entering the
        // pool is an explicit choice.
        for participant in &participants {
            if let Some(entry) = self.presence(participant) {
                let mut presence = entry.write().await;
                if presence.in_session == Some(*session_id) {
                    presence.in_session = None;
                }
                presence.touch();
            }
        }

        for participant in &participants {
            self.send_to(participant, ServerEvent::SessionEnded {
                session_id: *session_id,
                summary: summary.clone(),
            });
        }

        let stats: Vec<(UserId, u64, Option<u8>)> = participants
            .iter()
            .map(|participant| {
                let rating = if participant == by { ender_rating } else { None };
                (participant.clone(), summary.duration_secs, rating)
            })
            .collect();
        self.spawn_persistence(record, stats);

        info!(
            session_id = %session_id,
            ended_by = %by,
            reason = ?reason,
            duration_secs = summary.duration_secs,
            "session ended"
        );
        Ok(())
    }

    /// Arm the practice countdown. Must be called with the session lock
    /// held, from the transition into the practice phase.
    pub(crate) fn spawn_session_timer(&self, session_id: SessionId) -> JoinHandle<()> {
        let weak = self.self_ref.clone();
        let tick = self.config.session.tick_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            // The first tick completes immediately; consume it.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(coordinator) = weak.upgrade() else { return };
                let Some(session) = coordinator.session(&session_id) else { return };
                let mut s = session.lock().await;
                // A tick that lands after the phase moved on is a no-op.
                if s.phase != SessionPhase::Practice {
                    return;
                }
                s.time_remaining_secs = s.time_remaining_secs.saturating_sub(1);
                if s.time_remaining_secs > 0 {
                    continue;
                }
                s.phase = SessionPhase::Feedback;
                s.timer = None;
                let participants = s.participants();
                drop(s);

                for participant in participants {
                    coordinator.send_to(&participant, ServerEvent::SessionPhaseChanged {
                        session_id,
                        phase: SessionPhase::Feedback,
                        time_remaining_secs: 0,
                    });
                }
                debug!(session_id = %session_id, "practice countdown reached zero");
                return;
            }
        })
    }

    /// Write the session record off the hot path. Failures are retried a
    /// few times, then logged and counted; they never fail the operation
    /// that triggered them.
    fn spawn_persistence(&self, record: SessionRecord, stats: Vec<(UserId, u64, Option<u8>)>) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match sink.record_session(record.clone()).await {
                    Ok(()) => break,
                    Err(e) if attempt >= PERSIST_ATTEMPTS => {
                        metrics::record_persistence_failure();
                        error!(
                            session_id = %record.session_id,
                            error = %e,
                            "giving up on session record"
                        );
                        break;
                    }
                    Err(e) => {
                        warn!(
                            session_id = %record.session_id,
                            attempt,
                            error = %e,
                            "session record failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                    }
                }
            }
            for (user_id, delta_secs, rating) in stats {
                if let Err(e) = sink.increment_user_stats(&user_id, delta_secs, rating).await {
                    metrics::record_persistence_failure();
                    warn!(user_id = %user_id, error = %e, "user stats update failed");
                }
            }
        });
    }
}

fn build_record(session: &PracticeSession) -> SessionRecord {
    let ended_at = session.ended_at.unwrap_or_else(Utc::now);
    let actual_duration_secs =
        (ended_at - session.started_at).num_seconds().max(0) as u64;
    SessionRecord {
        session_id: session.id,
        participant_ids: session.participants(),
        topic: session.topic.clone(),
        skill_level: session.skill_level,
        duration_minutes: session.duration_minutes,
        actual_duration_secs,
        transcript_len: session.transcript.len(),
        feedback: session
            .feedback
            .iter()
            .map(|(user, fb)| (user.clone(), fb.clone()))
            .collect(),
        ended_at,
    }
}
