//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::numbers::NumbersKey;

/// A memoized sum for one distinct multiset of numbers.
///
/// `numbers_key` is write-once; only `updated_at` moves after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSumRecord {
    pub id: Uuid,
    pub numbers_key: NumbersKey,
    pub sum: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
