//! Matchmaking and session lifecycle coordinator for the Tandem
//! peer-practice platform.
//!
//! The coordinator tracks who is online and available, brokers match
//! requests (random pairing and direct invitations), and runs the timed
//! practice sessions a successful match creates: phases, chat relay, the
//! countdown, and termination with feedback. Every state change fans out
//! to the affected users over per-connection event channels.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tandem_coordinator::{Config, Coordinator, NoOpSink, spawn_maintenance};
//!
//! #[tokio::main]
//! async fn main() {
//!     let coordinator = Coordinator::new(Config::default(), Arc::new(NoOpSink));
//!     let _maintenance = spawn_maintenance(coordinator.clone());
//!
//!     let (_connection_id, mut events) =
//!         coordinator.connect("naoko".into(), "Naoko".into()).await;
//!     while let Some(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod maintenance;
pub mod metrics;
pub mod ops;
pub mod persist;
pub mod state;

pub use config::{Config, ConfigError};
pub use error::{CoordinatorError, CoordinatorResult};
pub use maintenance::{MaintenanceHandles, spawn_maintenance};
pub use ops::MatchOutcome;
pub use persist::{MemorySink, NoOpSink, PersistError, PersistenceSink, SessionRecord};
pub use state::Coordinator;

pub use tandem_proto as proto;
