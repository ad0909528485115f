use std::collections::HashMap;
use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use sqlx::SqlitePool;

use sumcache::application::repos::CachedSumsRepo;
use sumcache::application::sums::{
    METRIC_SUM_CACHE_HIT, METRIC_SUM_CACHE_MISS, METRIC_SUM_RESOLVE_MS, SumService,
};
use sumcache::infra::db::SqliteRepositories;
use sumcache::infra::telemetry;

#[sqlx::test(migrations = "./migrations")]
async fn resolution_emits_hit_miss_and_latency_metrics(pool: SqlitePool) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let repositories = Arc::new(SqliteRepositories::new(pool));
    let repo: Arc<dyn CachedSumsRepo> = repositories;
    let sums = SumService::new(repo);

    sums.resolve(&[1.0, 2.0]).await.unwrap();
    sums.resolve(&[2.0, 1.0]).await.unwrap();
    sums.resolve(&[2.0, 1.0]).await.unwrap();

    let snapshot: HashMap<String, DebugValue> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| (composite_key.key().name().to_string(), value))
        .collect();

    assert!(matches!(
        snapshot.get(METRIC_SUM_CACHE_MISS),
        Some(DebugValue::Counter(1))
    ));
    assert!(matches!(
        snapshot.get(METRIC_SUM_CACHE_HIT),
        Some(DebugValue::Counter(2))
    ));
    match snapshot.get(METRIC_SUM_RESOLVE_MS) {
        Some(DebugValue::Histogram(samples)) => assert_eq!(samples.len(), 3),
        other => panic!("missing resolve histogram: {other:?}"),
    }
}
