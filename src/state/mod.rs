//! Shared coordinator state: presences, the request ledger, sessions, and
//! the notification fan-out.

pub mod coordinator;
pub mod ledger;
pub mod pairing;
pub mod presence;
pub mod sessions;

pub use coordinator::Coordinator;
pub use ledger::{Ledger, MatchRequest};
pub use presence::UserPresence;
pub use sessions::PracticeSession;
