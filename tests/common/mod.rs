//! Shared harness for coordinator integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tandem_coordinator::proto::{
    ConnectionId, MatchPrefs, ServerEvent, SkillLevel, SkillPreference,
};
use tandem_coordinator::{Config, Coordinator, MemorySink};
use tokio::sync::mpsc;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration with fast timers so expiry and countdown tests finish
/// quickly.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.presence.reap_after_secs = 1;
    config.presence.reap_interval_secs = 1;
    config.matching.request_expiry_secs = 1;
    config.matching.sweep_interval_ms = 25;
    config.session.tick_interval_ms = 10;
    config.session.archive_grace_secs = 1;
    config.session.archive_interval_secs = 1;
    config
}

/// Opt-in tracing for test debugging, driven by `RUST_LOG`. `try_init`
/// makes repeated harness construction in one process a no-op.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub coordinator: Arc<Coordinator>,
    pub sink: Arc<MemorySink>,
}

pub fn harness() -> Harness {
    init_tracing();
    let sink = Arc::new(MemorySink::new());
    let coordinator = Coordinator::new(test_config(), sink.clone());
    Harness { coordinator, sink }
}

pub struct TestUser {
    pub id: String,
    pub connection_id: ConnectionId,
    pub events: mpsc::Receiver<ServerEvent>,
}

impl Harness {
    /// Connect a user. Display name mirrors the id; the snapshot event is
    /// left in the channel.
    pub async fn join(&self, id: &str) -> TestUser {
        let (connection_id, events) =
            self.coordinator.connect(id.to_string(), id.to_string()).await;
        TestUser { id: id.to_string(), connection_id, events }
    }

    /// Connect a user, flag them available, and drain the setup events.
    pub async fn join_available(&self, id: &str) -> TestUser {
        let mut user = self.join(id).await;
        self.coordinator
            .set_availability(id, true)
            .await
            .unwrap_or_else(|e| panic!("set_availability({id}): {e}"));
        user.drain();
        user
    }
}

impl TestUser {
    /// Next event, or panic after [`EVENT_TIMEOUT`].
    pub async fn recv(&mut self) -> ServerEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .unwrap_or_else(|_| panic!("{}: timed out waiting for event", self.id))
            .unwrap_or_else(|| panic!("{}: event channel closed", self.id))
    }

    /// Skip events until one matches the predicate.
    pub async fn recv_until(&mut self, pred: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
        loop {
            let event = self.recv().await;
            if pred(&event) {
                return event;
            }
        }
    }

    /// Discard everything currently buffered.
    pub fn drain(&mut self) {
        while self.events.try_recv().is_ok() {}
    }

    /// Assert that nothing arrives for a short window.
    pub async fn expect_silence(&mut self) {
        if let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(150), self.events.recv()).await
        {
            panic!("{}: unexpected event {event:?}", self.id);
        }
    }
}

/// Poll a condition until it holds, or panic after a couple of seconds.
pub async fn wait_or_panic(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

pub fn prefs(topic: &str, level: SkillLevel, preference: SkillPreference) -> MatchPrefs {
    MatchPrefs {
        topic: topic.to_string(),
        skill_level: level,
        preferred_skill_level: preference,
        duration_minutes: 15,
    }
}

pub fn default_prefs() -> MatchPrefs {
    prefs("conversation", SkillLevel::Intermediate, SkillPreference::Any)
}
