//! Persistence seam for session history and user stats.
//!
//! The coordinator writes through this trait fire-and-forget: a session is
//! `Ended` for protocol purposes before the sink confirms, and sink failure
//! is retried out-of-band, never reversed into coordinator state. Both
//! operations are idempotent under retry, keyed by session id.

mod memory;
mod noop;

pub use memory::MemorySink;
pub use noop::NoOpSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tandem_proto::{Feedback, SessionId, SkillLevel, UserId};
use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("persistence backend error: {0}")]
    Backend(String),
}

/// Everything recorded about a finished session.
///
/// Re-recorded (same key) when a participant submits feedback after the
/// session already ended; sinks must treat the write as an upsert.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub participant_ids: [UserId; 2],
    pub topic: String,
    pub skill_level: SkillLevel,
    pub duration_minutes: u32,
    pub actual_duration_secs: u64,
    pub transcript_len: usize,
    pub feedback: Vec<(UserId, Feedback)>,
    pub ended_at: DateTime<Utc>,
}

/// Write-through sink for session history and per-user stats.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Record a finished session, keyed by session id.
    async fn record_session(&self, record: SessionRecord) -> Result<(), PersistError>;

    /// Bump a user's practice-time counter and rating history.
    async fn increment_user_stats(
        &self,
        user_id: &str,
        session_delta_secs: u64,
        rating_given: Option<u8>,
    ) -> Result<(), PersistError>;
}
