use chrono::{Duration, Utc};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use tandem_coordinator::state::pairing::{PoolCandidate, select_candidate};
use tandem_proto::{SkillLevel, SkillPreference};

fn pool(size: usize) -> Vec<PoolCandidate> {
    let base = Utc::now();
    (0..size)
        .map(|i| PoolCandidate {
            user_id: format!("user-{i}"),
            skill_level: match i % 3 {
                0 => SkillLevel::Beginner,
                1 => SkillLevel::Intermediate,
                _ => SkillLevel::Advanced,
            },
            preference: match i % 3 {
                0 => SkillPreference::Any,
                1 => SkillPreference::Similar,
                _ => SkillPreference::Advanced,
            },
            last_active: base - Duration::seconds((i % 600) as i64),
        })
        .collect()
}

fn selection_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_candidate");

    for size in [10usize, 100, 1_000, 10_000] {
        let candidates = pool(size);
        let recent: Vec<String> = (0..5).map(|i| format!("user-{i}")).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("pool_{size}"), |b| {
            b.iter(|| {
                select_candidate(
                    SkillLevel::Intermediate,
                    SkillPreference::Any,
                    &candidates,
                    &recent,
                )
            })
        });
    }

    group.finish();
}

fn no_candidate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_candidate_miss");

    // Advanced seekers wanting strictly more advanced partners never match;
    // this is the full-scan worst case.
    let candidates = pool(1_000);
    group.throughput(Throughput::Elements(1_000));
    group.bench_function("incompatible_pool_1000", |b| {
        b.iter(|| {
            select_candidate(SkillLevel::Advanced, SkillPreference::Advanced, &candidates, &[])
        })
    });

    group.finish();
}

criterion_group!(benches, selection_benchmark, no_candidate_benchmark);
criterion_main!(benches);
