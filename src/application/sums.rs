//! Find-or-create protocol for memoized sums.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::repos::{CachedSumsRepo, RepoError};
use crate::domain::entities::CachedSumRecord;
use crate::domain::error::DomainError;
use crate::domain::numbers::{CanonicalNumbers, NumbersKey};

const SOURCE: &str = "sumcache::sums";
const MAX_RESOLVE_ATTEMPTS: u32 = 3;

pub const METRIC_SUM_CACHE_HIT: &str = "sumcache_sum_cache_hit_total";
pub const METRIC_SUM_CACHE_MISS: &str = "sumcache_sum_cache_miss_total";
pub const METRIC_SUM_INSERT_RACE: &str = "sumcache_sum_insert_race_total";
pub const METRIC_SUM_RESOLVE_MS: &str = "sumcache_sum_resolve_ms";

#[derive(Debug, Error)]
pub enum SumError {
    #[error(transparent)]
    InvalidInput(#[from] DomainError),
    #[error("cached sum not found")]
    NotFound,
    #[error("could not settle a record for `{key}` after {attempts} attempts")]
    Contended { key: String, attempts: u32 },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Result of a single resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SumOutcome {
    pub sum: f64,
    pub cached: bool,
    pub id: Uuid,
}

#[derive(Clone)]
pub struct SumService {
    repo: Arc<dyn CachedSumsRepo>,
}

impl SumService {
    pub fn new(repo: Arc<dyn CachedSumsRepo>) -> Self {
        Self { repo }
    }

    /// Return the memoized sum for `numbers`, computing and storing it on a miss.
    ///
    /// A lost insert race (the store reports a duplicate key) and a record
    /// deleted between lookup and touch both restart the lookup.
    pub async fn resolve(&self, numbers: &[f64]) -> Result<SumOutcome, SumError> {
        let started_at = Instant::now();
        let canonical = CanonicalNumbers::new(numbers)?;
        let key = canonical.key();

        debug!(target: SOURCE, count = numbers.len(), key = %key, "resolving sum");

        for attempt in 1..=MAX_RESOLVE_ATTEMPTS {
            if let Some(outcome) = self.read_cached(key, attempt, started_at).await? {
                return Ok(outcome);
            }

            let sum = canonical.sum();
            let id = Uuid::new_v4();
            match self.repo.insert(id, key, sum).await {
                Ok(record) => {
                    counter!(METRIC_SUM_CACHE_MISS).increment(1);
                    histogram!(METRIC_SUM_RESOLVE_MS)
                        .record(started_at.elapsed().as_secs_f64() * 1000.0);
                    info!(target: SOURCE, id = %record.id, sum, "computed new sum");
                    return Ok(SumOutcome {
                        sum: record.sum,
                        cached: false,
                        id: record.id,
                    });
                }
                Err(RepoError::Duplicate { constraint }) => {
                    counter!(METRIC_SUM_INSERT_RACE).increment(1);
                    debug!(
                        target: SOURCE,
                        constraint = %constraint,
                        attempt,
                        "lost insert race; re-reading winner"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        // Every attempt ended in a lost race; the last winner is committed.
        if let Some(outcome) = self
            .read_cached(key, MAX_RESOLVE_ATTEMPTS + 1, started_at)
            .await?
        {
            return Ok(outcome);
        }

        Err(SumError::Contended {
            key: key.to_string(),
            attempts: MAX_RESOLVE_ATTEMPTS,
        })
    }

    /// Looks the key up and touches the hit. `None` covers both a miss and a
    /// record deleted before it could be touched.
    async fn read_cached(
        &self,
        key: &NumbersKey,
        attempt: u32,
        started_at: Instant,
    ) -> Result<Option<SumOutcome>, SumError> {
        let Some(record) = self.repo.lookup(key).await? else {
            return Ok(None);
        };
        match self.repo.touch(record.id).await {
            Ok(()) => {
                counter!(METRIC_SUM_CACHE_HIT).increment(1);
                histogram!(METRIC_SUM_RESOLVE_MS)
                    .record(started_at.elapsed().as_secs_f64() * 1000.0);
                info!(target: SOURCE, id = %record.id, "returning cached sum");
                Ok(Some(SumOutcome {
                    sum: record.sum,
                    cached: true,
                    id: record.id,
                }))
            }
            Err(RepoError::NotFound) => {
                warn!(
                    target: SOURCE,
                    id = %record.id,
                    attempt,
                    "cached sum vanished before touch; retrying"
                );
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn list_cached(&self) -> Result<Vec<CachedSumRecord>, SumError> {
        let records = self.repo.list_all().await?;
        debug!(target: SOURCE, count = records.len(), "listed cached sums");
        Ok(records)
    }

    pub async fn get_cached(&self, id: Uuid) -> Result<CachedSumRecord, SumError> {
        self.repo.get_by_id(id).await?.ok_or(SumError::NotFound)
    }

    pub async fn delete_cached(&self, id: Uuid) -> Result<(), SumError> {
        match self.repo.delete_by_id(id).await {
            Ok(()) => {
                info!(target: SOURCE, id = %id, "deleted cached sum");
                Ok(())
            }
            Err(RepoError::NotFound) => Err(SumError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn clear_cached(&self) -> Result<u64, SumError> {
        let deleted = self.repo.delete_all().await?;
        info!(target: SOURCE, deleted, "cleared cached sums");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::*;

    /// In-memory store with hooks for replaying the interleavings that
    /// concurrent requests produce against a real database.
    #[derive(Default)]
    struct MemoryRepo {
        records: Mutex<HashMap<Uuid, CachedSumRecord>>,
        stale_lookups: AtomicUsize,
        vanish_on_touch: AtomicUsize,
        inserts: AtomicUsize,
        touches: AtomicUsize,
    }

    impl MemoryRepo {
        fn seed(&self, key: NumbersKey, sum: f64) -> Uuid {
            let id = Uuid::new_v4();
            let now = OffsetDateTime::now_utc();
            self.records.lock().unwrap().insert(
                id,
                CachedSumRecord {
                    id,
                    numbers_key: key,
                    sum,
                    created_at: now,
                    updated_at: now,
                },
            );
            id
        }

        fn len(&self) -> usize {
            self.records.lock().unwrap().len()
        }
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[async_trait]
    impl CachedSumsRepo for MemoryRepo {
        async fn lookup(&self, key: &NumbersKey) -> Result<Option<CachedSumRecord>, RepoError> {
            let found = if take_one(&self.stale_lookups) {
                None
            } else {
                self.records
                    .lock()
                    .unwrap()
                    .values()
                    .find(|record| &record.numbers_key == key)
                    .cloned()
            };
            // Let a concurrent resolve observe the same miss.
            tokio::task::yield_now().await;
            Ok(found)
        }

        async fn insert(
            &self,
            id: Uuid,
            key: &NumbersKey,
            sum: f64,
        ) -> Result<CachedSumRecord, RepoError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            let mut records = self.records.lock().unwrap();
            if records.values().any(|record| &record.numbers_key == key) {
                return Err(RepoError::Duplicate {
                    constraint: "cached_sums.numbers_key".to_string(),
                });
            }
            let now = OffsetDateTime::now_utc();
            let record = CachedSumRecord {
                id,
                numbers_key: key.clone(),
                sum,
                created_at: now,
                updated_at: now,
            };
            records.insert(id, record.clone());
            Ok(record)
        }

        async fn touch(&self, id: Uuid) -> Result<(), RepoError> {
            self.touches.fetch_add(1, Ordering::SeqCst);
            let mut records = self.records.lock().unwrap();
            if take_one(&self.vanish_on_touch) {
                records.remove(&id);
            }
            match records.get_mut(&id) {
                Some(record) => {
                    record.updated_at = OffsetDateTime::now_utc();
                    Ok(())
                }
                None => Err(RepoError::NotFound),
            }
        }

        async fn list_all(&self) -> Result<Vec<CachedSumRecord>, RepoError> {
            let mut records: Vec<_> = self.records.lock().unwrap().values().cloned().collect();
            records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(records)
        }

        async fn get_by_id(&self, id: Uuid) -> Result<Option<CachedSumRecord>, RepoError> {
            Ok(self.records.lock().unwrap().get(&id).cloned())
        }

        async fn delete_by_id(&self, id: Uuid) -> Result<(), RepoError> {
            self.records
                .lock()
                .unwrap()
                .remove(&id)
                .map(|_| ())
                .ok_or(RepoError::NotFound)
        }

        async fn delete_all(&self) -> Result<u64, RepoError> {
            let mut records = self.records.lock().unwrap();
            let count = records.len() as u64;
            records.clear();
            Ok(count)
        }
    }

    /// Store whose every call fails, standing in for a lost database.
    struct BrokenRepo;

    #[async_trait]
    impl CachedSumsRepo for BrokenRepo {
        async fn lookup(&self, _key: &NumbersKey) -> Result<Option<CachedSumRecord>, RepoError> {
            Err(RepoError::from_persistence("disk I/O error"))
        }

        async fn insert(
            &self,
            _id: Uuid,
            _key: &NumbersKey,
            _sum: f64,
        ) -> Result<CachedSumRecord, RepoError> {
            Err(RepoError::from_persistence("disk I/O error"))
        }

        async fn touch(&self, _id: Uuid) -> Result<(), RepoError> {
            Err(RepoError::from_persistence("disk I/O error"))
        }

        async fn list_all(&self) -> Result<Vec<CachedSumRecord>, RepoError> {
            Err(RepoError::from_persistence("disk I/O error"))
        }

        async fn get_by_id(&self, _id: Uuid) -> Result<Option<CachedSumRecord>, RepoError> {
            Err(RepoError::from_persistence("disk I/O error"))
        }

        async fn delete_by_id(&self, _id: Uuid) -> Result<(), RepoError> {
            Err(RepoError::from_persistence("disk I/O error"))
        }

        async fn delete_all(&self) -> Result<u64, RepoError> {
            Err(RepoError::from_persistence("disk I/O error"))
        }
    }

    fn service() -> (SumService, Arc<MemoryRepo>) {
        let repo = Arc::new(MemoryRepo::default());
        (SumService::new(repo.clone()), repo)
    }

    #[tokio::test]
    async fn first_call_misses_then_permutation_hits() {
        let (service, repo) = service();

        let first = service.resolve(&[1.0, 2.0, 3.0, 4.0, 5.0]).await.unwrap();
        assert_eq!(first.sum, 15.0);
        assert!(!first.cached);

        let second = service.resolve(&[5.0, 4.0, 3.0, 2.0, 1.0]).await.unwrap();
        assert_eq!(second.sum, 15.0);
        assert!(second.cached);
        assert_eq!(second.id, first.id);

        assert_eq!(repo.len(), 1);
        assert_eq!(repo.touches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_reads_keep_the_original_record() {
        let (service, repo) = service();
        let first = service.resolve(&[1.5, 2.5, 3.0]).await.unwrap();
        assert_eq!(first.sum, 7.0);

        for _ in 0..5 {
            let again = service.resolve(&[3.0, 1.5, 2.5]).await.unwrap();
            assert!(again.cached);
            assert_eq!(again.id, first.id);
            assert_eq!(again.sum, first.sum);
        }
        assert_eq!(repo.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_multisets_get_independent_records() {
        let (service, repo) = service();
        let a = service.resolve(&[-1.0, -2.0, -3.0, 4.0, 5.0]).await.unwrap();
        let b = service.resolve(&[1.0, 2.0, 2.0]).await.unwrap();

        assert_eq!(a.sum, 3.0);
        assert_eq!(b.sum, 5.0);
        assert!(!a.cached && !b.cached);
        assert_ne!(a.id, b.id);
        assert_eq!(repo.len(), 2);
    }

    #[tokio::test]
    async fn lost_insert_race_is_served_from_the_winner() {
        let (service, repo) = service();
        let key = CanonicalNumbers::new(&[10.0, 20.0]).unwrap().into_key();
        let winner = repo.seed(key, 30.0);
        // The first lookup observes the pre-insert state, as a racing
        // request would.
        repo.stale_lookups.store(1, Ordering::SeqCst);

        let outcome = service.resolve(&[20.0, 10.0]).await.unwrap();

        assert_eq!(outcome.sum, 30.0);
        assert!(outcome.cached);
        assert_eq!(outcome.id, winner);
        assert_eq!(repo.inserts.load(Ordering::SeqCst), 1);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn record_deleted_before_touch_is_recomputed() {
        let (service, repo) = service();
        let first = service.resolve(&[4.0, 6.0]).await.unwrap();
        repo.vanish_on_touch.store(1, Ordering::SeqCst);

        let outcome = service.resolve(&[6.0, 4.0]).await.unwrap();

        assert_eq!(outcome.sum, 10.0);
        assert!(!outcome.cached);
        assert_ne!(outcome.id, first.id);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn persistent_staleness_gives_up() {
        let (service, repo) = service();
        let key = CanonicalNumbers::new(&[1.0]).unwrap().into_key();
        repo.seed(key, 1.0);
        repo.stale_lookups.store(usize::MAX, Ordering::SeqCst);

        let err = service.resolve(&[1.0]).await.unwrap_err();
        assert!(matches!(
            err,
            SumError::Contended {
                attempts: MAX_RESOLVE_ATTEMPTS,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn race_lost_on_the_last_attempt_rereads_the_winner() {
        let (service, repo) = service();
        let key = CanonicalNumbers::new(&[1.0, 2.0]).unwrap().into_key();
        let winner = repo.seed(key, 3.0);
        repo.stale_lookups
            .store(MAX_RESOLVE_ATTEMPTS as usize, Ordering::SeqCst);

        let outcome = service.resolve(&[2.0, 1.0]).await.unwrap();

        assert!(outcome.cached);
        assert_eq!(outcome.id, winner);
        assert_eq!(outcome.sum, 3.0);
        assert_eq!(
            repo.inserts.load(Ordering::SeqCst),
            MAX_RESOLVE_ATTEMPTS as usize
        );
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_requests_store_one_record() {
        let (service, repo) = service();

        let (left, right) = tokio::join!(
            service.resolve(&[10.0, 20.0]),
            service.resolve(&[20.0, 10.0])
        );
        let (left, right) = (left.unwrap(), right.unwrap());

        assert_eq!(left.sum, 30.0);
        assert_eq!(right.sum, 30.0);
        assert_eq!(left.id, right.id);
        assert!(left.cached != right.cached);
        assert_eq!(repo.len(), 1);
        // Both missed, so the loser reached the duplicate branch.
        assert_eq!(repo.inserts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn storage_failures_propagate() {
        let service = SumService::new(Arc::new(BrokenRepo));

        assert!(matches!(
            service.resolve(&[1.0]).await,
            Err(SumError::Repo(RepoError::Persistence(_)))
        ));
        assert!(matches!(
            service.list_cached().await,
            Err(SumError::Repo(RepoError::Persistence(_)))
        ));
        assert!(matches!(
            service.clear_cached().await,
            Err(SumError::Repo(RepoError::Persistence(_)))
        ));
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_store() {
        let service = SumService::new(Arc::new(BrokenRepo));
        assert!(matches!(
            service.resolve(&[]).await,
            Err(SumError::InvalidInput(DomainError::Validation { .. }))
        ));
    }

    #[tokio::test]
    async fn admin_operations_report_missing_ids() {
        let (service, _repo) = service();
        let outcome = service.resolve(&[2.0, 2.0]).await.unwrap();

        let record = service.get_cached(outcome.id).await.unwrap();
        assert_eq!(record.sum, 4.0);

        service.delete_cached(outcome.id).await.unwrap();
        assert!(matches!(
            service.get_cached(outcome.id).await,
            Err(SumError::NotFound)
        ));
        assert!(matches!(
            service.delete_cached(outcome.id).await,
            Err(SumError::NotFound)
        ));
        assert_eq!(service.clear_cached().await.unwrap(), 0);
        assert!(service.list_cached().await.unwrap().is_empty());
    }
}
