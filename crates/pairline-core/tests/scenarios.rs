//! End-to-end pairing scenarios driven through `MatchService`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use pairline_core::{MatchService, PairingConfig};
use pairline_shared::protocol::{CancelOutcome, LeaveOutcome, Notification, ParticipantStatus};
use pairline_shared::{CloseReason, ParticipantId, SessionId};

fn service() -> MatchService {
    MatchService::new(PairingConfig::default())
}

async fn join_all(svc: &MatchService, names: &[&str]) -> Vec<ParticipantId> {
    let mut ids = Vec::new();
    for name in names {
        ids.push(svc.join(name).await.unwrap().participant_id);
    }
    ids
}

#[tokio::test]
async fn test_three_joiners_pair_oldest_two() {
    let svc = service();
    let ids = join_all(&svc, &["A", "B", "C"]).await;

    let report = svc.run_pairing_sweep().await;
    assert_eq!(report.pairs_formed, 1);

    match svc.poll_status(&ids[0]).await.unwrap() {
        ParticipantStatus::Matched {
            session_id,
            peer_display_name,
            ..
        } => {
            assert_eq!(session_id, report.sessions[0]);
            assert_eq!(peer_display_name, "B");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        svc.poll_status(&ids[2]).await.unwrap(),
        ParticipantStatus::Waiting { position: 1, .. }
    ));
}

#[tokio::test]
async fn test_burst_drains_in_join_order() {
    let svc = service();
    let names: Vec<String> = (0..21).map(|i| format!("p{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let ids = join_all(&svc, &refs).await;

    let report = svc.run_pairing_sweep().await;
    assert_eq!(report.pairs_formed, 10);

    for (i, pair) in ids.chunks(2).take(10).enumerate() {
        let status = svc.poll_status(&pair[0]).await.unwrap();
        let ParticipantStatus::Matched { session_id, .. } = status else {
            panic!("{} not matched", pair[0]);
        };
        assert_eq!(session_id, report.sessions[i]);
        assert!(matches!(
            svc.poll_status(&pair[1]).await.unwrap(),
            ParticipantStatus::Matched { session_id: s, .. } if s == report.sessions[i]
        ));
    }
    assert!(matches!(
        svc.poll_status(&ids[20]).await.unwrap(),
        ParticipantStatus::Waiting { position: 1, .. }
    ));
}

#[tokio::test]
async fn test_cancel_after_match_is_noop() {
    let svc = service();
    let ids = join_all(&svc, &["A", "B"]).await;
    svc.run_pairing_sweep().await;

    assert_eq!(svc.cancel(&ids[0]).await.unwrap(), CancelOutcome::AlreadyMatched);
    assert!(matches!(
        svc.poll_status(&ids[0]).await.unwrap(),
        ParticipantStatus::Matched { .. }
    ));
    assert_eq!(svc.system_status().await.active_sessions, 1);
}

#[tokio::test]
async fn test_cancelled_participant_is_never_paired() {
    let svc = service();
    let ids = join_all(&svc, &["A", "B", "C"]).await;
    assert_eq!(svc.cancel(&ids[1]).await.unwrap(), CancelOutcome::Cancelled);

    svc.run_pairing_sweep().await;
    assert!(svc.poll_status(&ids[1]).await.is_err());
    match svc.poll_status(&ids[0]).await.unwrap() {
        ParticipantStatus::Matched {
            peer_display_name, ..
        } => assert_eq!(peer_display_name, "C"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_leave_closes_session_for_peer() {
    let svc = service();
    let ids = join_all(&svc, &["A", "B"]).await;
    let mut b_events = svc.subscribe(&ids[1]).await.unwrap();
    let session = svc.run_pairing_sweep().await.sessions[0].clone();
    assert!(matches!(b_events.recv().await, Some(Notification::Matched(_))));

    assert_eq!(svc.leave(&ids[0]).await.unwrap(), LeaveOutcome::Closed);

    assert_eq!(
        svc.poll_status(&ids[1]).await.unwrap(),
        ParticipantStatus::Left {
            session_id: session.clone(),
            reason: CloseReason::Left,
        }
    );
    match b_events.recv().await {
        Some(Notification::PeerLeft(notice)) => assert_eq!(notice.session_id, session),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(svc.system_status().await.active_sessions, 0);
    assert_eq!(svc.leave(&ids[1]).await.unwrap(), LeaveOutcome::AlreadyClosed);
}

#[tokio::test(start_paused = true)]
async fn test_silent_participant_times_out() {
    let svc = service();
    let ids = join_all(&svc, &["A", "B"]).await;
    let mut a_events = svc.subscribe(&ids[0]).await.unwrap();
    let session = svc.run_pairing_sweep().await.sessions[0].clone();
    a_events.recv().await.unwrap();

    // A keeps heartbeating, B goes quiet.
    for _ in 0..11 {
        tokio::time::advance(Duration::from_secs(1)).await;
        svc.heartbeat(&ids[0]).await.unwrap();
    }

    let report = svc.run_liveness_sweep().await;
    assert_eq!(report.closed, vec![session.clone()]);

    match a_events.recv().await {
        Some(Notification::PeerLeft(notice)) => {
            assert_eq!(notice.session_id, session);
            assert_eq!(notice.reason, CloseReason::TimedOut);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        svc.poll_status(&ids[0]).await.unwrap(),
        ParticipantStatus::Left {
            reason: CloseReason::TimedOut,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_rejoin_after_close_gets_new_session() {
    let svc = service();
    let ids = join_all(&svc, &["A", "B"]).await;
    let first = svc.run_pairing_sweep().await.sessions[0].clone();
    svc.leave(&ids[0]).await.unwrap();

    join_all(&svc, &["A", "B"]).await;
    let second = svc.run_pairing_sweep().await.sessions[0].clone();
    assert_ne!(first, second);

    // Purged after retention; the old participants disappear.
    tokio::time::advance(Duration::from_secs(61)).await;
    let report = svc.run_liveness_sweep().await;
    assert_eq!(report.purged, 1);
    assert!(svc.poll_status(&ids[1]).await.is_err());
}

#[tokio::test]
async fn test_concurrent_joins_and_sweeps_never_double_pair() {
    let svc = Arc::new(service());

    let mut joins = Vec::new();
    for i in 0..64 {
        let svc = svc.clone();
        joins.push(tokio::spawn(async move {
            svc.join(&format!("p{i}")).await.unwrap().participant_id
        }));
    }
    let mut sweeps = Vec::new();
    for _ in 0..4 {
        let svc = svc.clone();
        sweeps.push(tokio::spawn(async move { svc.run_pairing_sweep().await }));
    }

    let mut ids = Vec::new();
    for join in joins {
        ids.push(join.await.unwrap());
    }
    for sweep in sweeps {
        sweep.await.unwrap();
    }
    svc.run_pairing_sweep().await;

    let mut seen = HashSet::new();
    for session in svc.active_sessions().await {
        assert!(seen.insert(session.session_id));
    }
    assert_eq!(seen.len(), 32);

    let mut members: HashMap<SessionId, usize> = HashMap::new();
    for id in &ids {
        let ParticipantStatus::Matched { session_id, .. } = svc.poll_status(id).await.unwrap()
        else {
            panic!("{id} not matched");
        };
        *members.entry(session_id).or_default() += 1;
    }
    assert_eq!(members.len(), 32);
    assert!(members.values().all(|&n| n == 2));
}
