// Criterion benchmarks for Zufen

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::sync::Arc;

use zufen::core::{CandidateFilter, MatchingEngine};
use zufen::models::{Kind, MatchSettings, MatchState, Mode, NewParticipant, Participant, ParticipantId};
use zufen::services::{ConfigProvider, InMemoryConfig, InMemoryStore, ParticipantStore};

fn create_participant(i: usize, kind: Kind) -> Participant {
    Participant {
        id: ParticipantId::generate(),
        kind,
        score: 1000 + (i % 40) as i32,
        mode: if i % 2 == 0 { Mode::Exact } else { Mode::Fuzzy },
        content_key: format!("https://u.alipay.cn/{}", i),
        artifact_path: None,
        origin: "127.0.0.1".to_string(),
        state: MatchState::Pending,
        created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(i as i64),
    }
}

fn bench_candidate_filter(c: &mut Criterion) {
    let settings = MatchSettings::default();
    let initiator = create_participant(0, Kind::Team);
    let filter = CandidateFilter::for_initiator(&initiator, &settings);

    let mut group = c.benchmark_group("select_oldest");

    for pool_size in [10, 100, 1000, 10000].iter() {
        let pool: Vec<Participant> = (0..*pool_size)
            .map(|i| create_participant(i, Kind::Person))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(pool_size), pool_size, |b, _| {
            b.iter(|| black_box(filter.select_oldest(black_box(&pool))));
        });
    }

    group.finish();
}

fn bench_attempt(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("attempt_in_memory");

    for pool_size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(pool_size), pool_size, |b, &size| {
            b.iter_batched(
                || {
                    rt.block_on(async {
                        let store = Arc::new(InMemoryStore::new());
                        for i in 0..size {
                            store
                                .create_participant(NewParticipant {
                                    kind: Kind::Person,
                                    score: 1000 + (i % 40) as i32,
                                    mode: Mode::Exact,
                                    content_key: format!("https://u.alipay.cn/p{}", i),
                                    origin: "127.0.0.1".to_string(),
                                })
                                .await
                                .unwrap();
                        }
                        let team = store
                            .create_participant(NewParticipant {
                                kind: Kind::Team,
                                score: 1000,
                                mode: Mode::Exact,
                                content_key: "https://u.alipay.cn/team".to_string(),
                                origin: "127.0.0.1".to_string(),
                            })
                            .await
                            .unwrap();
                        let config: Arc<dyn ConfigProvider> = Arc::new(InMemoryConfig::new());
                        (MatchingEngine::new(store, config), team.id)
                    })
                },
                |(engine, id)| rt.block_on(async { black_box(engine.attempt(&id).await.unwrap()) }),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_candidate_filter, bench_attempt);

criterion_main!(benches);
