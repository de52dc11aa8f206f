//! No-op persistence sink that discards all writes.
//!
//! Used when history recording is disabled or unavailable.
//! All operations succeed but store nothing.

use super::{PersistError, PersistenceSink, SessionRecord};
use async_trait::async_trait;

pub struct NoOpSink;

#[async_trait]
impl PersistenceSink for NoOpSink {
    async fn record_session(&self, _record: SessionRecord) -> Result<(), PersistError> {
        Ok(())
    }

    async fn increment_user_stats(
        &self,
        _user_id: &str,
        _session_delta_secs: u64,
        _rating_given: Option<u8>,
    ) -> Result<(), PersistError> {
        Ok(())
    }
}
