// Integration tests for Zufen

use std::collections::HashMap;
use std::sync::Arc;

use zufen::core::MatchingEngine;
use zufen::models::{
    Kind, MatchOutcome, MatchState, Mode, NewParticipant, Participant, ParticipantId, StatusReport,
};
use zufen::services::runtime_config::keys;
use zufen::services::{ConfigProvider, InMemoryConfig, InMemoryStore, ParticipantStore};

struct Harness {
    store: Arc<InMemoryStore>,
    config: Arc<InMemoryConfig>,
    engine: MatchingEngine<InMemoryStore>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let config = Arc::new(InMemoryConfig::new());
    let provider: Arc<dyn ConfigProvider> = config.clone();
    let engine = MatchingEngine::new(store.clone(), provider);
    Harness { store, config, engine }
}

async fn register(store: &InMemoryStore, kind: Kind, mode: Mode, score: i32) -> Participant {
    store
        .create_participant(NewParticipant {
            kind,
            score,
            mode,
            content_key: format!("https://u.alipay.cn/{}", uuid::Uuid::new_v4()),
            origin: "192.0.2.1".to_string(),
        })
        .await
        .unwrap()
}

/// Every matched participant must point at a matched partner that points back
fn assert_pairs_consistent(all: &[Participant]) -> usize {
    let by_id: HashMap<&ParticipantId, &Participant> = all.iter().map(|p| (&p.id, p)).collect();
    let mut matched = 0;

    for p in all {
        if let Some(partner) = p.state.partner() {
            matched += 1;
            assert_ne!(partner, &p.id, "participant {} matched itself", p.id);
            let other = by_id.get(partner).expect("partner exists");
            assert_eq!(other.state, MatchState::Matched { partner: p.id.clone() });
            assert_ne!(other.kind, p.kind);
            assert_eq!(other.mode, p.mode);
        }
    }
    matched
}

#[tokio::test]
async fn test_exact_pair_binds_both_sides() {
    let h = harness();
    let team = register(&h.store, Kind::Team, Mode::Exact, 1500).await;
    let person = register(&h.store, Kind::Person, Mode::Exact, 526).await;

    let outcome = h.engine.attempt(&person.id).await.unwrap();
    match outcome {
        MatchOutcome::NewlyMatched(info) => {
            assert_eq!(info.partner_id, Some(team.id.clone()));
            assert_eq!(info.score, 1500);
        }
        other => panic!("expected NewlyMatched, got {:?}", other),
    }

    // The other side sees the same pairing as already made
    match h.engine.attempt(&team.id).await.unwrap() {
        MatchOutcome::AlreadyMatched(info) => assert_eq!(info.partner_id, Some(person.id.clone())),
        other => panic!("expected AlreadyMatched, got {:?}", other),
    }

    assert_eq!(assert_pairs_consistent(&h.store.all().await), 2);
}

#[tokio::test]
async fn test_no_candidate_then_later_success() {
    let h = harness();
    let team = register(&h.store, Kind::Team, Mode::Fuzzy, 1000).await;

    assert_eq!(h.engine.attempt(&team.id).await.unwrap(), MatchOutcome::NoCandidate);
    assert_eq!(h.engine.status(&team.id).await.unwrap(), StatusReport::Pending);

    let person = register(&h.store, Kind::Person, Mode::Fuzzy, 1027).await;

    // A poll from the earlier registrant completes the match
    match h.engine.attempt(&team.id).await.unwrap() {
        MatchOutcome::NewlyMatched(info) => assert_eq!(info.partner_id, Some(person.id.clone())),
        other => panic!("expected NewlyMatched, got {:?}", other),
    }
    match h.engine.status(&person.id).await.unwrap() {
        StatusReport::Matched(info) => assert_eq!(info.partner_id, Some(team.id.clone())),
        other => panic!("expected Matched, got {:?}", other),
    }
}

#[tokio::test]
async fn test_oldest_candidate_wins() {
    let h = harness();
    let first = register(&h.store, Kind::Person, Mode::Exact, 1000).await;
    let second = register(&h.store, Kind::Person, Mode::Exact, 1000).await;
    let team_a = register(&h.store, Kind::Team, Mode::Exact, 1026).await;
    let team_b = register(&h.store, Kind::Team, Mode::Exact, 1026).await;

    let a = h.engine.attempt(&team_a.id).await.unwrap();
    assert_eq!(a.match_info().and_then(|i| i.partner_id.clone()), Some(first.id.clone()));

    let b = h.engine.attempt(&team_b.id).await.unwrap();
    assert_eq!(b.match_info().and_then(|i| i.partner_id.clone()), Some(second.id.clone()));
}

#[tokio::test]
async fn test_runtime_target_change_applies_to_next_attempt() {
    let h = harness();
    let team = register(&h.store, Kind::Team, Mode::Exact, 50).await;
    let person = register(&h.store, Kind::Person, Mode::Exact, 50).await;

    assert_eq!(h.engine.attempt(&person.id).await.unwrap(), MatchOutcome::NoCandidate);

    h.config.set_value(keys::TARGET_SCORE, "100").await.unwrap();
    let outcome = h.engine.attempt(&person.id).await.unwrap();
    assert_eq!(outcome.match_info().and_then(|i| i.partner_id.clone()), Some(team.id));
}

#[tokio::test]
async fn test_inverted_fuzzy_band_matches_nothing() {
    let h = harness();
    h.config.set_value(keys::FUZZY_MIN, "2030").await.unwrap();
    h.config.set_value(keys::FUZZY_MAX, "2020").await.unwrap();

    register(&h.store, Kind::Team, Mode::Fuzzy, 1000).await;
    let person = register(&h.store, Kind::Person, Mode::Fuzzy, 1025).await;

    assert_eq!(h.engine.attempt(&person.id).await.unwrap(), MatchOutcome::NoCandidate);
    assert_eq!(assert_pairs_consistent(&h.store.all().await), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_attempts_never_double_bind() {
    let h = harness();

    // One team, many people competing for it
    let team = register(&h.store, Kind::Team, Mode::Exact, 1000).await;
    let mut people = Vec::new();
    for _ in 0..16 {
        people.push(register(&h.store, Kind::Person, Mode::Exact, 1026).await);
    }

    let mut handles = Vec::new();
    for person in &people {
        let engine = h.engine.clone();
        let id = person.id.clone();
        handles.push(tokio::spawn(async move { engine.attempt(&id).await }));
    }

    let mut newly = 0;
    for handle in handles {
        if let MatchOutcome::NewlyMatched(info) = handle.await.unwrap().unwrap() {
            assert_eq!(info.partner_id, Some(team.id.clone()));
            newly += 1;
        }
    }

    assert_eq!(newly, 1);
    assert_eq!(assert_pairs_consistent(&h.store.all().await), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mixed_pool_stays_consistent() {
    let h = harness();
    let mut ids = Vec::new();
    for i in 0..20 {
        let kind = if i % 2 == 0 { Kind::Team } else { Kind::Person };
        let mode = if i % 3 == 0 { Mode::Fuzzy } else { Mode::Exact };
        let score = if kind == Kind::Team { 1000 } else { 1026 };
        ids.push(register(&h.store, kind, mode, score).await.id);
    }

    let mut handles = Vec::new();
    for id in ids.iter().chain(ids.iter()) {
        let engine = h.engine.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move { engine.attempt(&id).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let all = h.store.all().await;
    let matched = assert_pairs_consistent(&all);
    assert_eq!(matched % 2, 0);
    assert!(matched <= all.len());
}

#[tokio::test]
async fn test_failed_commit_leaves_no_partial_pair() {
    let h = harness();
    let team = register(&h.store, Kind::Team, Mode::Exact, 2000).await;
    let person = register(&h.store, Kind::Person, Mode::Exact, 26).await;

    h.store.fail_next_commit();
    assert!(h.engine.attempt(&person.id).await.is_err());
    assert!(h.store.all().await.iter().all(|p| p.is_pending()));

    let outcome = h.engine.attempt(&person.id).await.unwrap();
    assert_eq!(outcome.match_info().and_then(|i| i.partner_id.clone()), Some(team.id));
}
