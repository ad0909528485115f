use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset, macros::format_description};

use crate::application::repos::RepoError;

const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Duplicate {
            constraint: db
                .constraint()
                .map(str::to_string)
                .or_else(|| {
                    db.message()
                        .split_once(": ")
                        .map(|(_, columns)| columns.to_string())
                })
                .unwrap_or_else(|| "unknown".to_string()),
        },
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some(SQLITE_BUSY | SQLITE_LOCKED)) =>
        {
            RepoError::Timeout
        }
        other => RepoError::from_persistence(other),
    }
}

/// Fixed-width UTC text, so lexical order in SQL equals chronological order.
pub(super) fn encode_timestamp(value: OffsetDateTime) -> Result<String, RepoError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
        ))
        .map_err(RepoError::from_persistence)
}

pub(super) fn decode_timestamp(raw: &str) -> Result<OffsetDateTime, RepoError> {
    PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"),
    )
    .map(PrimitiveDateTime::assume_utc)
    .map_err(|err| RepoError::from_persistence(format!("invalid timestamp `{raw}`: {err}")))
}
