//! In-memory persistence sink for tests and development.
//!
//! Keeps the last record per session id (upsert, so retries and feedback
//! re-records stay idempotent) and running per-user totals.

use super::{PersistError, PersistenceSink, SessionRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tandem_proto::{SessionId, UserId};

/// Accumulated per-user stats.
#[derive(Debug, Clone, Default)]
pub struct UserStats {
    pub total_practice_secs: u64,
    pub sessions_completed: u64,
    pub ratings_given: Vec<u8>,
}

#[derive(Default)]
pub struct MemorySink {
    sessions: Mutex<HashMap<SessionId, SessionRecord>>,
    stats: Mutex<HashMap<UserId, UserStats>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct sessions recorded.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// The stored record for a session, if any.
    pub fn session(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions.lock().get(id).cloned()
    }

    /// Accumulated stats for a user.
    pub fn stats(&self, user_id: &str) -> Option<UserStats> {
        self.stats.lock().get(user_id).cloned()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn record_session(&self, record: SessionRecord) -> Result<(), PersistError> {
        self.sessions.lock().insert(record.session_id, record);
        Ok(())
    }

    async fn increment_user_stats(
        &self,
        user_id: &str,
        session_delta_secs: u64,
        rating_given: Option<u8>,
    ) -> Result<(), PersistError> {
        let mut stats = self.stats.lock();
        let entry = stats.entry(user_id.to_string()).or_default();
        entry.total_practice_secs += session_delta_secs;
        entry.sessions_completed += 1;
        if let Some(rating) = rating_given {
            entry.ratings_given.push(rating);
        }
        Ok(())
    }
}
