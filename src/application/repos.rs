//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::CachedSumRecord;
use crate::domain::numbers::NumbersKey;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Durable storage for memoized sums.
///
/// Implementations enforce uniqueness of `numbers_key`: of two concurrent
/// inserts for the same key exactly one succeeds and the other returns
/// [`RepoError::Duplicate`]. A successful insert is visible to every
/// subsequent `lookup`.
#[async_trait]
pub trait CachedSumsRepo: Send + Sync {
    /// A miss is `Ok(None)`, never an error.
    async fn lookup(&self, key: &NumbersKey) -> Result<Option<CachedSumRecord>, RepoError>;

    async fn insert(
        &self,
        id: Uuid,
        key: &NumbersKey,
        sum: f64,
    ) -> Result<CachedSumRecord, RepoError>;

    /// Refresh `updated_at` only.
    async fn touch(&self, id: Uuid) -> Result<(), RepoError>;

    /// Most recently touched first.
    async fn list_all(&self) -> Result<Vec<CachedSumRecord>, RepoError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<CachedSumRecord>, RepoError>;

    async fn delete_by_id(&self, id: Uuid) -> Result<(), RepoError>;

    /// Returns the number of removed records; succeeds on an empty store.
    async fn delete_all(&self) -> Result<u64, RepoError>;
}
