//! Matching operations: random requests, invitations, responses, and the
//! commit path that turns an accepted request into a session.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::metrics;
use crate::state::Coordinator;
use crate::state::coordinator::Outbox;
use crate::state::ledger::MatchRequest;
use crate::state::pairing::{self, PoolCandidate};
use crate::state::sessions::PracticeSession;
use std::sync::Arc;
use std::time::Duration;
use tandem_proto::{
    MatchPrefs, MatchRequestInfo, RequestId, RequestStatus, ServerEvent, SessionInfo, UserId,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of a random-match request.
///
/// Random matching never leaves a visible intermediate state: the request
/// either commits to a session before returning or is published pending.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// A compatible candidate was found; both users are in the session.
    Matched(SessionInfo),
    /// No candidate; the request waits for one until expiry.
    Pending(MatchRequestInfo),
}

impl Coordinator {
    /// Ask to be matched with any compatible available user.
    ///
    /// The pairing algorithm runs immediately against the current pool of
    /// pending random requesters. A found candidate is accepted
    /// synthetically on both sides; otherwise the request stays pending
    /// until expiry or cancellation.
    pub async fn request_random_match(
        &self,
        user_id: &str,
        prefs: MatchPrefs,
    ) -> CoordinatorResult<MatchOutcome> {
        let entry = self.presence(user_id).ok_or(CoordinatorError::NotConnected)?;
        let recent: Vec<UserId> = {
            let presence = entry.read().await;
            if !presence.is_connected() {
                return Err(CoordinatorError::NotConnected);
            }
            if !presence.can_match() {
                return Err(CoordinatorError::NotAvailable(user_id.to_string()));
            }
            presence.recent_partners.iter().cloned().collect()
        };
        if self.ledger.has_pending_from(user_id) {
            return Err(CoordinatorError::AlreadyMatching);
        }

        let ttl = Duration::from_secs(self.config.matching.request_expiry_secs);
        let request = Arc::new(MatchRequest::random(user_id.to_string(), prefs.clone(), ttl));

        // Snapshot the pool: other pending random requesters who still look
        // matchable. Staleness is fine; the commit re-validates under lock.
        let mut pool: Vec<(PoolCandidate, Arc<MatchRequest>)> = Vec::new();
        for peer_request in self.ledger.random_pool(user_id) {
            let Some(peer_entry) = self.presence(&peer_request.requester_id) else {
                continue;
            };
            let peer = peer_entry.read().await;
            if !peer.can_match() {
                continue;
            }
            pool.push((
                PoolCandidate {
                    user_id: peer_request.requester_id.clone(),
                    skill_level: peer_request.prefs.skill_level,
                    preference: peer_request.prefs.preferred_skill_level,
                    last_active: peer.last_active,
                },
                peer_request.clone(),
            ));
        }

        while !pool.is_empty() {
            let candidates: Vec<PoolCandidate> = pool.iter().map(|(c, _)| c.clone()).collect();
            let Some(idx) = pairing::select_candidate(
                prefs.skill_level,
                prefs.preferred_skill_level,
                &candidates,
                &recent,
            ) else {
                break;
            };
            let (candidate, peer_request) = pool.remove(idx);

            // Hold the candidate's status lock across the commit so a
            // concurrent cancel or expiry on their request cannot interleave.
            let mut peer_status = peer_request.lock_status().await;
            if peer_status.is_terminal() {
                continue;
            }

            // Resolutions precede the session start in delivery order; the
            // outbox only flushes if the commit succeeds.
            let mut outbox = Outbox::new();
            outbox.to(user_id, ServerEvent::RequestResolved {
                request_id: request.id,
                status: RequestStatus::Accepted,
            });
            outbox.to(candidate.user_id.clone(), ServerEvent::RequestResolved {
                request_id: peer_request.id,
                status: RequestStatus::Accepted,
            });
            match self.commit_match(user_id, &candidate.user_id, &prefs, true, &mut outbox).await {
                Ok(session) => {
                    *peer_status = RequestStatus::Accepted;
                    drop(peer_status);
                    self.ledger.remove(&peer_request.id);
                    metrics::add_requests(-1);
                    // Our own request was never published; resolve it for
                    // the returned view only.
                    request.resolve(RequestStatus::Accepted).await.ok();
                    outbox.flush(self);

                    self.cancel_outgoing_for(user_id).await;
                    self.cancel_outgoing_for(&candidate.user_id).await;

                    metrics::record_match("random");
                    info!(
                        requester = %user_id,
                        candidate = %candidate.user_id,
                        session_id = %session.id,
                        "random match committed"
                    );
                    return Ok(MatchOutcome::Matched(session));
                }
                Err(
                    CoordinatorError::NotAvailable(who) | CoordinatorError::ParticipantBusy(who),
                ) if who != user_id => {
                    // Candidate went stale between snapshot and commit; try
                    // the next one.
                    debug!(candidate = %who, "pool candidate no longer matchable");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        // The ledger reserves the requester slot atomically, so a request
        // racing in from another connection of the same user loses here
        // even though the scan above already passed.
        self.ledger.insert(request.clone())?;
        metrics::add_requests(1);
        debug!(requester = %user_id, request_id = %request.id, "no candidate, random request pending");
        Ok(MatchOutcome::Pending(request.info(RequestStatus::Pending)))
    }

    /// Invite a specific user to a session.
    pub async fn invite_user(
        &self,
        requester_id: &str,
        target_id: &str,
        prefs: MatchPrefs,
    ) -> CoordinatorResult<MatchRequestInfo> {
        if requester_id == target_id {
            return Err(CoordinatorError::SelfInvite);
        }

        let requester = self.presence(requester_id).ok_or(CoordinatorError::NotConnected)?;
        {
            let presence = requester.read().await;
            if !presence.is_connected() {
                return Err(CoordinatorError::NotConnected);
            }
            if !presence.can_match() {
                return Err(CoordinatorError::NotAvailable(requester_id.to_string()));
            }
        }
        let target = self
            .presence(target_id)
            .ok_or_else(|| CoordinatorError::NotAvailable(target_id.to_string()))?;
        if !target.read().await.can_match() {
            return Err(CoordinatorError::NotAvailable(target_id.to_string()));
        }

        if self.ledger.has_pending_between(requester_id, target_id) {
            return Err(CoordinatorError::DuplicatePending);
        }

        let ttl = Duration::from_secs(self.config.matching.request_expiry_secs);
        let request = Arc::new(MatchRequest::direct(
            requester_id.to_string(),
            target_id.to_string(),
            prefs,
            ttl,
        ));
        let info = request.info(RequestStatus::Pending);
        // Authoritative duplicate check: the ledger reserves the unordered
        // pair atomically, so reciprocal invites racing past the scan above
        // still produce exactly one pending request.
        self.ledger.insert(request)?;
        metrics::add_requests(1);

        self.send_to(target_id, ServerEvent::RequestReceived { request: info.clone() });
        debug!(requester = %requester_id, target = %target_id, request_id = %info.id, "invitation sent");
        Ok(info)
    }

    /// Accept or decline a direct invitation.
    ///
    /// Acceptance is atomic with respect to concurrent respond, cancel,
    /// and expiry on the same request: the status lock is the
    /// single-writer section, and whoever transitions first wins. Losers
    /// observe `AlreadyResolved`.
    pub async fn respond_to_request(
        &self,
        responder_id: &str,
        request_id: RequestId,
        accept: bool,
    ) -> CoordinatorResult<Option<SessionInfo>> {
        let request = self
            .ledger
            .get(&request_id)
            .ok_or_else(|| CoordinatorError::NotFound(request_id.to_string()))?;
        if request.target_id.as_deref() != Some(responder_id) {
            return Err(CoordinatorError::NotOwner);
        }

        if !accept {
            request.resolve(RequestStatus::Declined).await?;
            self.ledger.remove(&request_id);
            metrics::add_requests(-1);
            self.send_to(&request.requester_id, ServerEvent::RequestResolved {
                request_id,
                status: RequestStatus::Declined,
            });
            debug!(responder = %responder_id, request_id = %request_id, "invitation declined");
            return Ok(None);
        }

        let mut status = request.lock_status().await;
        if status.is_terminal() {
            return Err(CoordinatorError::AlreadyResolved);
        }

        // Presence pre-check under the status lock: a stale invite (the
        // acceptor or requester already in a session) gets a clean
        // rejection, and a concurrent accept on the same request observes
        // `AlreadyResolved` rather than a presence error. Lock order stays
        // status before presence.
        for user_id in [request.requester_id.as_str(), responder_id] {
            let entry = self
                .presence(user_id)
                .ok_or_else(|| CoordinatorError::NotAvailable(user_id.to_string()))?;
            let presence = entry.read().await;
            if !presence.is_connected() || presence.in_session.is_some() {
                return Err(CoordinatorError::NotAvailable(user_id.to_string()));
            }
        }

        // Resolutions precede the session start in delivery order; the
        // outbox only flushes if the commit succeeds.
        let mut outbox = Outbox::new();
        outbox.to(request.requester_id.clone(), ServerEvent::RequestResolved {
            request_id,
            status: RequestStatus::Accepted,
        });
        outbox.to(responder_id, ServerEvent::RequestResolved {
            request_id,
            status: RequestStatus::Accepted,
        });
        let session = self
            .commit_match(&request.requester_id, responder_id, &request.prefs, false, &mut outbox)
            .await?;
        *status = RequestStatus::Accepted;
        drop(status);
        self.ledger.remove(&request_id);
        metrics::add_requests(-1);
        outbox.flush(self);

        // Sibling cleanup: the participants' other outgoing requests are
        // withdrawn. Invitations targeting them stay in the ledger;
        // declining remains explicit against those.
        self.cancel_outgoing_for(&request.requester_id).await;
        self.cancel_outgoing_for(responder_id).await;

        metrics::record_match("direct");
        info!(
            requester = %request.requester_id,
            acceptor = %responder_id,
            session_id = %session.id,
            "invitation accepted"
        );
        Ok(Some(session))
    }

    /// Withdraw a pending request. Only the requester may cancel.
    pub async fn cancel_request(&self, user_id: &str, request_id: RequestId) -> CoordinatorResult<()> {
        let request = self
            .ledger
            .get(&request_id)
            .ok_or_else(|| CoordinatorError::NotFound(request_id.to_string()))?;
        if request.requester_id != user_id {
            return Err(CoordinatorError::NotOwner);
        }

        request.resolve(RequestStatus::Cancelled).await?;
        self.ledger.remove(&request_id);
        metrics::add_requests(-1);

        if let Some(target) = &request.target_id {
            self.send_to(target, ServerEvent::RequestResolved {
                request_id,
                status: RequestStatus::Cancelled,
            });
        }
        debug!(requester = %user_id, request_id = %request_id, "request cancelled");
        Ok(())
    }

    /// Withdraw every pending request the user created. Side effect of
    /// session entry; losers of the status CAS are skipped silently.
    pub(crate) async fn cancel_outgoing_for(&self, user_id: &str) {
        for request in self.ledger.pending_from(user_id) {
            if request.resolve(RequestStatus::Cancelled).await.is_err() {
                continue;
            }
            self.ledger.remove(&request.id);
            metrics::add_requests(-1);
            let resolved = ServerEvent::RequestResolved {
                request_id: request.id,
                status: RequestStatus::Cancelled,
            };
            self.send_to(user_id, resolved.clone());
            if let Some(target) = &request.target_id {
                self.send_to(target, resolved);
            }
        }
    }

    /// Commit two users into a session.
    ///
    /// Takes both presence write locks in sorted user-id order (after the
    /// caller's request status lock, before the session-map insert),
    /// re-validates, and applies the whole transition before anything is
    /// observable: availability off, in-session markers set, session
    /// inserted, events queued in the caller's outbox.
    ///
    /// `require_available` is set on the random path, which re-validates
    /// the candidate's availability at acceptance time rather than trust
    /// the pool snapshot.
    pub(crate) async fn commit_match(
        &self,
        requester_id: &str,
        acceptor_id: &str,
        prefs: &MatchPrefs,
        require_available: bool,
        outbox: &mut Outbox,
    ) -> CoordinatorResult<SessionInfo> {
        let requester = self
            .presence(requester_id)
            .ok_or_else(|| CoordinatorError::NotAvailable(requester_id.to_string()))?;
        let acceptor = self
            .presence(acceptor_id)
            .ok_or_else(|| CoordinatorError::NotAvailable(acceptor_id.to_string()))?;

        let (mut requester_guard, mut acceptor_guard) = if requester_id <= acceptor_id {
            let r = requester.write().await;
            let a = acceptor.write().await;
            (r, a)
        } else {
            let a = acceptor.write().await;
            let r = requester.write().await;
            (r, a)
        };

        for guard in [&requester_guard, &acceptor_guard] {
            if !guard.is_connected() || (require_available && !guard.is_available) {
                return Err(CoordinatorError::NotAvailable(guard.user_id.clone()));
            }
            if guard.in_session.is_some() {
                // Should be unreachable: presence invariants keep busy users
                // out of every accept path. Fail the operation, keep state.
                warn!(user_id = %guard.user_id, "participant already in a session at commit");
                return Err(CoordinatorError::ParticipantBusy(guard.user_id.clone()));
            }
        }

        let duration =
            prefs.duration_minutes.clamp(1, self.config.session.max_duration_minutes.max(1));
        let session =
            PracticeSession::new(requester_id.to_string(), acceptor_id.to_string(), prefs, duration);
        let info = session.view();

        let cap = self.config.presence.recent_partner_memory;
        let mut deltas = Vec::new();
        for (guard, partner) in [
            (&mut requester_guard, acceptor_id),
            (&mut acceptor_guard, requester_id),
        ] {
            if guard.is_available {
                metrics::add_available(-1);
                guard.is_available = false;
                deltas.push((guard.user_id.clone(), guard.info()));
            }
            guard.in_session = Some(info.id);
            guard.remember_partner(partner.to_string(), cap);
            guard.touch();
        }

        self.sessions.insert(info.id, Arc::new(Mutex::new(session)));
        metrics::add_sessions(1);

        outbox.to(requester_id, ServerEvent::SessionStarted { session: info.clone() });
        outbox.to(acceptor_id, ServerEvent::SessionStarted { session: info.clone() });
        for (user_id, delta) in deltas {
            outbox.broadcast(ServerEvent::PresenceDelta { user: delta }, Some(user_id));
        }

        Ok(info)
    }
}
