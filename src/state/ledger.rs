//! Match Request Ledger: in-flight random and direct requests.
//!
//! The ledger's map only holds active (pending) requests. A terminal
//! transition goes through [`MatchRequest::resolve`] (or an accept path
//! holding the status lock) and the entry is removed immediately after, so
//! scans over the map approximate "all pending requests" without taking any
//! status lock.

use crate::error::{CoordinatorError, CoordinatorResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use tandem_proto::{MatchPrefs, MatchRequestInfo, RequestId, RequestKind, RequestStatus, UserId};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// An in-flight match request.
///
/// Everything except `status` is immutable after creation, so scans can
/// read request metadata without locking. All status transitions are
/// serialized through the status mutex: whichever writer locks first and
/// finds `Pending` wins; everyone after observes a terminal status.
#[derive(Debug)]
pub struct MatchRequest {
    pub id: RequestId,
    pub kind: RequestKind,
    pub requester_id: UserId,
    /// Present iff `kind == Direct`.
    pub target_id: Option<UserId>,
    pub prefs: MatchPrefs,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    status: Mutex<RequestStatus>,
}

impl MatchRequest {
    /// Create a random-match request.
    pub fn random(requester_id: UserId, prefs: MatchPrefs, ttl: Duration) -> Self {
        Self::build(RequestKind::Random, requester_id, None, prefs, ttl)
    }

    /// Create a direct invitation.
    pub fn direct(requester_id: UserId, target_id: UserId, prefs: MatchPrefs, ttl: Duration) -> Self {
        Self::build(RequestKind::Direct, requester_id, Some(target_id), prefs, ttl)
    }

    fn build(
        kind: RequestKind,
        requester_id: UserId,
        target_id: Option<UserId>,
        prefs: MatchPrefs,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(60));
        Self {
            id: Uuid::new_v4(),
            kind,
            requester_id,
            target_id,
            prefs,
            created_at: now,
            expires_at: now + ttl,
            status: Mutex::new(RequestStatus::Pending),
        }
    }

    /// Current status.
    pub async fn status(&self) -> RequestStatus {
        *self.status.lock().await
    }

    /// Take the status lock for a compound transition (the accept path
    /// holds it across session creation).
    pub(crate) async fn lock_status(&self) -> MutexGuard<'_, RequestStatus> {
        self.status.lock().await
    }

    /// One-way transition to a terminal status.
    ///
    /// This is the compare-and-set every resolution path funnels through:
    /// the first caller to find `Pending` wins, later callers get
    /// `AlreadyResolved`.
    pub async fn resolve(&self, to: RequestStatus) -> CoordinatorResult<()> {
        debug_assert!(to.is_terminal());
        let mut status = self.status.lock().await;
        if status.is_terminal() {
            return Err(CoordinatorError::AlreadyResolved);
        }
        *status = to;
        Ok(())
    }

    /// Whether the user is this request's requester or target.
    pub fn involves(&self, user_id: &str) -> bool {
        self.requester_id == user_id || self.target_id.as_deref() == Some(user_id)
    }

    /// Whether this is a direct request between the given unordered pair.
    pub fn pairs(&self, a: &str, b: &str) -> bool {
        match &self.target_id {
            Some(target) => {
                (self.requester_id == a && target == b) || (self.requester_id == b && target == a)
            }
            None => false,
        }
    }

    /// The other party of this request relative to `user_id`, if any.
    pub fn counterpart(&self, user_id: &str) -> Option<UserId> {
        if self.requester_id == user_id {
            self.target_id.clone()
        } else if self.target_id.as_deref() == Some(user_id) {
            Some(self.requester_id.clone())
        } else {
            None
        }
    }

    /// Outbound view with the status the caller just observed.
    pub fn info(&self, status: RequestStatus) -> MatchRequestInfo {
        MatchRequestInfo {
            id: self.id,
            kind: self.kind,
            requester_id: self.requester_id.clone(),
            target_id: self.target_id.clone(),
            prefs: self.prefs.clone(),
            status,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// Normalized key for an unordered user pair.
fn pair_key(a: &str, b: &str) -> (UserId, UserId) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Active index of pending match requests.
#[derive(Debug, Default)]
pub struct Ledger {
    requests: DashMap<RequestId, Arc<MatchRequest>>,
    /// Pending direct request per unordered pair.
    direct_pairs: DashMap<(UserId, UserId), RequestId>,
    /// Pending random request per requester.
    random_owners: DashMap<UserId, RequestId>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a pending request.
    ///
    /// Uniqueness is enforced here: a direct request reserves its
    /// unordered pair, a random request reserves its requester. The
    /// reservation happens under the index entry's shard lock, so two
    /// concurrent inserts colliding on the same key cannot both pass.
    pub fn insert(&self, request: Arc<MatchRequest>) -> CoordinatorResult<()> {
        match &request.target_id {
            Some(target) => {
                match self.direct_pairs.entry(pair_key(&request.requester_id, target)) {
                    Entry::Occupied(_) => return Err(CoordinatorError::DuplicatePending),
                    Entry::Vacant(slot) => {
                        slot.insert(request.id);
                    }
                }
            }
            None => match self.random_owners.entry(request.requester_id.clone()) {
                Entry::Occupied(_) => return Err(CoordinatorError::AlreadyMatching),
                Entry::Vacant(slot) => {
                    slot.insert(request.id);
                }
            },
        }
        self.requests.insert(request.id, request);
        Ok(())
    }

    /// Look up an active request.
    pub fn get(&self, id: &RequestId) -> Option<Arc<MatchRequest>> {
        self.requests.get(id).map(|entry| entry.value().clone())
    }

    /// Drop a request from the active index after its terminal transition.
    pub fn remove(&self, id: &RequestId) -> Option<Arc<MatchRequest>> {
        let (_, request) = self.requests.remove(id)?;
        match &request.target_id {
            Some(target) => {
                self.direct_pairs
                    .remove_if(&pair_key(&request.requester_id, target), |_, held| held == id);
            }
            None => {
                self.random_owners.remove_if(&request.requester_id, |_, held| held == id);
            }
        }
        Some(request)
    }

    /// Number of active requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Whether the user already has a pending request as requester.
    pub fn has_pending_from(&self, user_id: &str) -> bool {
        self.requests.iter().any(|entry| entry.value().requester_id == user_id)
    }

    /// Whether a pending direct request already exists between the
    /// unordered pair.
    pub fn has_pending_between(&self, a: &str, b: &str) -> bool {
        self.requests.iter().any(|entry| entry.value().pairs(a, b))
    }

    /// Pending requests where the user is the requester.
    pub fn pending_from(&self, user_id: &str) -> Vec<Arc<MatchRequest>> {
        self.requests
            .iter()
            .filter(|entry| entry.value().requester_id == user_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Pending requests where the user is requester or target.
    pub fn pending_involving(&self, user_id: &str) -> Vec<Arc<MatchRequest>> {
        self.requests
            .iter()
            .filter(|entry| entry.value().involves(user_id))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Pending random requests from other users: the random-match pool.
    pub fn random_pool(&self, excluding: &str) -> Vec<Arc<MatchRequest>> {
        self.requests
            .iter()
            .filter(|entry| {
                let req = entry.value();
                req.kind == RequestKind::Random && req.requester_id != excluding
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Requests whose expiry has passed.
    pub fn expired_by(&self, now: DateTime<Utc>) -> Vec<Arc<MatchRequest>> {
        self.requests
            .iter()
            .filter(|entry| entry.value().expires_at <= now)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_proto::{SkillLevel, SkillPreference};

    fn prefs() -> MatchPrefs {
        MatchPrefs {
            topic: "presentations".into(),
            skill_level: SkillLevel::Intermediate,
            preferred_skill_level: SkillPreference::Any,
            duration_minutes: 15,
        }
    }

    #[tokio::test]
    async fn test_resolve_is_one_way() {
        let request = MatchRequest::random("u-1".into(), prefs(), Duration::from_secs(60));
        assert_eq!(request.status().await, RequestStatus::Pending);

        request.resolve(RequestStatus::Cancelled).await.unwrap();
        assert_eq!(request.status().await, RequestStatus::Cancelled);

        // Second resolution loses the CAS
        let err = request.resolve(RequestStatus::Expired).await.unwrap_err();
        assert_eq!(err, CoordinatorError::AlreadyResolved);
        assert_eq!(request.status().await, RequestStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_concurrent_resolution_has_one_winner() {
        let request = Arc::new(MatchRequest::direct(
            "u-1".into(),
            "u-2".into(),
            prefs(),
            Duration::from_secs(60),
        ));

        let mut handles = Vec::new();
        for status in [RequestStatus::Accepted, RequestStatus::Declined, RequestStatus::Cancelled] {
            let req = request.clone();
            handles.push(tokio::spawn(async move { req.resolve(status).await }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_pair_matching_is_unordered() {
        let request =
            MatchRequest::direct("u-1".into(), "u-2".into(), prefs(), Duration::from_secs(60));
        assert!(request.pairs("u-1", "u-2"));
        assert!(request.pairs("u-2", "u-1"));
        assert!(!request.pairs("u-1", "u-3"));

        let random = MatchRequest::random("u-1".into(), prefs(), Duration::from_secs(60));
        assert!(!random.pairs("u-1", "u-2"));
    }

    #[test]
    fn test_ledger_scans() {
        let ledger = Ledger::new();
        let direct = Arc::new(MatchRequest::direct(
            "u-1".into(),
            "u-2".into(),
            prefs(),
            Duration::from_secs(60),
        ));
        let random = Arc::new(MatchRequest::random("u-3".into(), prefs(), Duration::from_secs(60)));
        ledger.insert(direct.clone()).unwrap();
        ledger.insert(random.clone()).unwrap();

        assert!(ledger.has_pending_from("u-1"));
        assert!(!ledger.has_pending_from("u-2"));
        assert!(ledger.has_pending_between("u-2", "u-1"));
        assert_eq!(ledger.pending_involving("u-2").len(), 1);
        assert_eq!(ledger.random_pool("u-1").len(), 1);
        assert_eq!(ledger.random_pool("u-3").len(), 0);

        ledger.remove(&direct.id);
        assert!(!ledger.has_pending_between("u-1", "u-2"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_insert_reserves_pair_and_requester() {
        let ledger = Ledger::new();
        let first = Arc::new(MatchRequest::direct(
            "u-1".into(),
            "u-2".into(),
            prefs(),
            Duration::from_secs(60),
        ));
        ledger.insert(first.clone()).unwrap();

        // Reverse direction collides on the same unordered pair.
        let reverse = Arc::new(MatchRequest::direct(
            "u-2".into(),
            "u-1".into(),
            prefs(),
            Duration::from_secs(60),
        ));
        let err = ledger.insert(reverse).unwrap_err();
        assert_eq!(err, CoordinatorError::DuplicatePending);

        let random = Arc::new(MatchRequest::random("u-1".into(), prefs(), Duration::from_secs(60)));
        ledger.insert(random.clone()).unwrap();
        let again = Arc::new(MatchRequest::random("u-1".into(), prefs(), Duration::from_secs(60)));
        let err = ledger.insert(again).unwrap_err();
        assert_eq!(err, CoordinatorError::AlreadyMatching);

        // Removal releases both reservations.
        ledger.remove(&first.id);
        ledger.remove(&random.id);
        let retry = Arc::new(MatchRequest::direct(
            "u-2".into(),
            "u-1".into(),
            prefs(),
            Duration::from_secs(60),
        ));
        ledger.insert(retry).unwrap();
        let retry_random =
            Arc::new(MatchRequest::random("u-1".into(), prefs(), Duration::from_secs(60)));
        ledger.insert(retry_random).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reciprocal_inserts_have_one_winner() {
        let ledger = Arc::new(Ledger::new());

        for _ in 0..200 {
            let forward = Arc::new(MatchRequest::direct(
                "u-1".into(),
                "u-2".into(),
                prefs(),
                Duration::from_secs(60),
            ));
            let reverse = Arc::new(MatchRequest::direct(
                "u-2".into(),
                "u-1".into(),
                prefs(),
                Duration::from_secs(60),
            ));

            let a = {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.insert(forward) })
            };
            let b = {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.insert(reverse) })
            };
            let results = [a.await.unwrap(), b.await.unwrap()];

            let wins = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(wins, 1, "exactly one side of the pair may publish");
            assert_eq!(ledger.len(), 1);

            let survivor = ledger.pending_involving("u-1").pop().unwrap();
            ledger.remove(&survivor.id);
            assert!(ledger.is_empty());
        }
    }

    #[test]
    fn test_expiry_scan_uses_deadline() {
        let ledger = Ledger::new();
        let request = Arc::new(MatchRequest::random("u-1".into(), prefs(), Duration::from_secs(60)));
        ledger.insert(request.clone()).unwrap();

        assert!(ledger.expired_by(Utc::now()).is_empty());
        let later = Utc::now() + chrono::Duration::seconds(61);
        assert_eq!(ledger.expired_by(later).len(), 1);
    }
}
