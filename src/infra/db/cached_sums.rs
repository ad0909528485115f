use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CachedSumsRepo, RepoError},
    domain::{entities::CachedSumRecord, numbers::NumbersKey},
};

use super::{
    SqliteRepositories,
    util::{decode_timestamp, encode_timestamp, map_sqlx_error},
};

#[derive(sqlx::FromRow)]
struct CachedSumRow {
    id: String,
    numbers_key: String,
    sum: f64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<CachedSumRow> for CachedSumRecord {
    type Error = RepoError;

    fn try_from(row: CachedSumRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id).map_err(|err| {
            RepoError::from_persistence(format!("invalid cached sum id `{}`: {err}", row.id))
        })?;

        Ok(Self {
            id,
            numbers_key: NumbersKey::from_stored(row.numbers_key),
            sum: row.sum,
            created_at: decode_timestamp(&row.created_at)?,
            updated_at: decode_timestamp(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl CachedSumsRepo for SqliteRepositories {
    async fn lookup(&self, key: &NumbersKey) -> Result<Option<CachedSumRecord>, RepoError> {
        let row = sqlx::query_as::<_, CachedSumRow>(
            r#"
            SELECT id, numbers_key, sum, created_at, updated_at
            FROM cached_sums
            WHERE numbers_key = ?1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(CachedSumRecord::try_from).transpose()
    }

    async fn insert(
        &self,
        id: Uuid,
        key: &NumbersKey,
        sum: f64,
    ) -> Result<CachedSumRecord, RepoError> {
        let now = encode_timestamp(OffsetDateTime::now_utc())?;

        let row = sqlx::query_as::<_, CachedSumRow>(
            r#"
            INSERT INTO cached_sums (id, numbers_key, sum, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            RETURNING id, numbers_key, sum, created_at, updated_at
            "#,
        )
        .bind(id.to_string())
        .bind(key.as_str())
        .bind(sum)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        CachedSumRecord::try_from(row)
    }

    async fn touch(&self, id: Uuid) -> Result<(), RepoError> {
        let now = encode_timestamp(OffsetDateTime::now_utc())?;

        let result = sqlx::query(
            r#"
            UPDATE cached_sums
            SET updated_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<CachedSumRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CachedSumRow>(
            r#"
            SELECT id, numbers_key, sum, created_at, updated_at
            FROM cached_sums
            ORDER BY updated_at DESC, created_at DESC, id
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(CachedSumRecord::try_from).collect()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<CachedSumRecord>, RepoError> {
        let row = sqlx::query_as::<_, CachedSumRow>(
            r#"
            SELECT id, numbers_key, sum, created_at, updated_at
            FROM cached_sums
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(CachedSumRecord::try_from).transpose()
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            DELETE FROM cached_sums
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM cached_sums")
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
