//! Operations on coordinator state, grouped by concern. Each module adds
//! an `impl Coordinator` block; this one ties them to the wire commands.

mod matching;
mod presence;
mod session;

pub use matching::MatchOutcome;

use crate::error::CoordinatorResult;
use crate::metrics;
use crate::state::Coordinator;
use tandem_proto::ClientCommand;

impl Coordinator {
    /// Route one decoded command to its operation.
    ///
    /// Return values the operation produces for its caller (request info,
    /// chat echoes) are discarded here; connection-facing effects travel
    /// through the event channel.
    pub async fn dispatch(&self, user_id: &str, command: ClientCommand) -> CoordinatorResult<()> {
        match command {
            ClientCommand::SetAvailability { available } => {
                self.set_availability(user_id, available).await
            }
            ClientCommand::RequestRandomMatch { prefs } => {
                self.request_random_match(user_id, prefs).await.map(|_| ())
            }
            ClientCommand::InviteUser { target_id, prefs } => {
                self.invite_user(user_id, &target_id, prefs).await.map(|_| ())
            }
            ClientCommand::RespondToRequest { request_id, accept } => {
                self.respond_to_request(user_id, request_id, accept).await.map(|_| ())
            }
            ClientCommand::CancelRequest { request_id } => {
                self.cancel_request(user_id, request_id).await
            }
            ClientCommand::SendSessionMessage { session_id, content } => {
                self.send_session_message(user_id, session_id, content).await.map(|_| ())
            }
            ClientCommand::AdvancePhase { session_id, to } => {
                self.advance_phase(user_id, session_id, to).await
            }
            ClientCommand::EndSession { session_id, feedback } => {
                self.end_session(user_id, session_id, feedback).await
            }
        }
    }

    /// Dispatch a command, reporting failures back to the issuing user as
    /// a `Rejected` event instead of propagating them.
    pub async fn handle(&self, user_id: &str, command: ClientCommand) {
        let op = command.op();
        metrics::record_command(op);
        if let Err(error) = self.dispatch(user_id, command).await {
            metrics::record_rejection(op, error.error_code());
            tracing::debug!(
                user_id = %user_id,
                op,
                code = error.error_code(),
                "command rejected"
            );
            self.send_to(user_id, error.to_rejection(op));
        }
    }
}
