//! Random matching: pool behavior, mutual skill compatibility, recent
//! partner avoidance, and request expiry.

mod common;

use common::{default_prefs, harness, prefs};
use tandem_coordinator::proto::{RequestStatus, ServerEvent, SkillLevel, SkillPreference};
use tandem_coordinator::{CoordinatorError, MatchOutcome, spawn_maintenance};

#[tokio::test]
async fn test_request_without_candidates_goes_pending() {
    let h = harness();
    let _a = h.join_available("alice").await;

    let outcome = h.coordinator.request_random_match("alice", default_prefs()).await.unwrap();
    match outcome {
        MatchOutcome::Pending(request) => {
            assert_eq!(request.requester_id, "alice");
            assert_eq!(request.target_id, None);
            assert_eq!(request.status, RequestStatus::Pending);
        }
        MatchOutcome::Matched(session) => panic!("unexpected match: {session:?}"),
    }
    assert_eq!(h.coordinator.pending_request_count(), 1);

    // One pending request per user.
    let err = h.coordinator.request_random_match("alice", default_prefs()).await.unwrap_err();
    assert_eq!(err, CoordinatorError::AlreadyMatching);
}

#[tokio::test]
async fn test_compatible_candidate_matches_immediately() {
    let h = harness();
    let mut a = h.join_available("alice").await;
    let mut b = h.join_available("bob").await;
    a.drain();

    let MatchOutcome::Pending(bob_request) =
        h.coordinator.request_random_match("bob", default_prefs()).await.unwrap()
    else {
        panic!("bob should go pending");
    };

    let MatchOutcome::Matched(session) =
        h.coordinator.request_random_match("alice", default_prefs()).await.unwrap()
    else {
        panic!("alice should match bob");
    };
    assert_eq!(session.requester_id, "alice");
    assert_eq!(session.acceptor_id, "bob");
    assert_eq!(h.coordinator.pending_request_count(), 0);
    assert_eq!(h.coordinator.session_count(), 1);

    // Bob sees his request resolve before the session start.
    match b.recv_until(|e| matches!(e, ServerEvent::RequestResolved { .. })).await {
        ServerEvent::RequestResolved { request_id, status } => {
            assert_eq!(request_id, bob_request.id);
            assert_eq!(status, RequestStatus::Accepted);
        }
        other => panic!("expected resolution, got {other:?}"),
    }
    match b.recv().await {
        ServerEvent::SessionStarted { session: info } => assert_eq!(info.id, session.id),
        other => panic!("expected session start, got {other:?}"),
    }
    a.recv_until(|e| matches!(e, ServerEvent::SessionStarted { .. })).await;

    // Both participants are out of the availability pool.
    let err = h.coordinator.set_availability("alice", true).await.unwrap_err();
    assert_eq!(err, CoordinatorError::NotAvailable("alice".into()));
}

#[tokio::test]
async fn test_incompatible_preferences_leave_both_pending() {
    let h = harness();
    let _a = h.join_available("alice").await;
    let _b = h.join_available("bob").await;

    // Alice takes anyone, but bob only wants his own level; compatibility
    // has to hold from both sides.
    let alice_prefs = prefs("debating", SkillLevel::Intermediate, SkillPreference::Any);
    let bob_prefs = prefs("debating", SkillLevel::Advanced, SkillPreference::Similar);

    assert!(matches!(
        h.coordinator.request_random_match("alice", alice_prefs).await.unwrap(),
        MatchOutcome::Pending(_)
    ));
    assert!(matches!(
        h.coordinator.request_random_match("bob", bob_prefs).await.unwrap(),
        MatchOutcome::Pending(_)
    ));
    assert_eq!(h.coordinator.pending_request_count(), 2);
    assert_eq!(h.coordinator.session_count(), 0);
}

#[tokio::test]
async fn test_recent_partner_is_avoided_when_another_candidate_exists() {
    let h = harness();
    let _a = h.join_available("alice").await;
    let mut b = h.join_available("bob").await;
    let _c = h.join_available("carol").await;

    // First pairing: alice and bob practice together, then finish.
    let invite = h
        .coordinator
        .invite_user("alice", "bob", prefs("conversation", SkillLevel::Intermediate, SkillPreference::Any))
        .await
        .unwrap();
    let session = h
        .coordinator
        .respond_to_request("bob", invite.id, true)
        .await
        .unwrap()
        .unwrap();
    h.coordinator.end_session("alice", session.id, None).await.unwrap();

    h.coordinator.set_availability("alice", true).await.unwrap();
    h.coordinator.set_availability("bob", true).await.unwrap();
    b.drain();

    // Bob and carol both wait in the pool. Carol's advanced/any request is
    // incompatible with bob's similar-only preference, so they stay apart.
    assert!(matches!(
        h.coordinator
            .request_random_match("bob", prefs("conversation", SkillLevel::Intermediate, SkillPreference::Similar))
            .await
            .unwrap(),
        MatchOutcome::Pending(_)
    ));
    assert!(matches!(
        h.coordinator
            .request_random_match("carol", prefs("conversation", SkillLevel::Advanced, SkillPreference::Any))
            .await
            .unwrap(),
        MatchOutcome::Pending(_)
    ));

    // Both bob and carol accept alice, but bob is a recent partner.
    let MatchOutcome::Matched(session) = h
        .coordinator
        .request_random_match("alice", prefs("conversation", SkillLevel::Intermediate, SkillPreference::Any))
        .await
        .unwrap()
    else {
        panic!("alice should match someone");
    };
    assert_eq!(session.acceptor_id, "carol");

    // Bob keeps waiting; only presence deltas reach him.
    assert_eq!(h.coordinator.pending_request_count(), 1);
    while let Ok(event) = b.events.try_recv() {
        assert!(matches!(event, ServerEvent::PresenceDelta { .. }), "unexpected {event:?}");
    }
}

#[tokio::test]
async fn test_pending_requests_expire_and_notify() {
    let h = harness();
    let _maintenance = spawn_maintenance(h.coordinator.clone());
    let mut a = h.join_available("alice").await;
    let mut b = h.join("bob").await;
    b.drain();

    let MatchOutcome::Pending(request) =
        h.coordinator.request_random_match("alice", default_prefs()).await.unwrap()
    else {
        panic!("alice should go pending");
    };

    match a.recv_until(|e| matches!(e, ServerEvent::RequestResolved { .. })).await {
        ServerEvent::RequestResolved { request_id, status } => {
            assert_eq!(request_id, request.id);
            assert_eq!(status, RequestStatus::Expired);
        }
        other => panic!("expected expiry, got {other:?}"),
    }
    assert_eq!(h.coordinator.pending_request_count(), 0);

    // A direct invitation expires toward both parties.
    h.coordinator.set_availability("bob", true).await.unwrap();
    a.drain();
    b.drain();
    let invite = h.coordinator.invite_user("alice", "bob", default_prefs()).await.unwrap();
    for user in [&mut a, &mut b] {
        match user.recv_until(|e| matches!(e, ServerEvent::RequestResolved { .. })).await {
            ServerEvent::RequestResolved { request_id, status } => {
                assert_eq!(request_id, invite.id);
                assert_eq!(status, RequestStatus::Expired);
            }
            other => panic!("expected expiry, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_unavailable_requester_is_rejected() {
    let h = harness();
    let _a = h.join("alice").await; // never flagged available

    let err = h.coordinator.request_random_match("alice", default_prefs()).await.unwrap_err();
    assert_eq!(err, CoordinatorError::NotAvailable("alice".into()));

    let err = h.coordinator.request_random_match("ghost", default_prefs()).await.unwrap_err();
    assert_eq!(err, CoordinatorError::NotConnected);
}
