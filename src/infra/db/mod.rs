//! SQLite-backed repository implementations.

mod cached_sums;
mod util;

pub use util::map_sqlx_error;

use std::{str::FromStr, sync::Arc, time::Duration};

use sqlx::{
    query,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};

use crate::config::DatabaseSettings;
use crate::infra::error::InfraError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct SqliteRepositories {
    pool: Arc<SqlitePool>,
}

impl SqliteRepositories {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a pool for the configured database, creating the file (and its
    /// parent directory) when it does not exist yet.
    pub async fn connect(settings: &DatabaseSettings) -> Result<SqlitePool, InfraError> {
        let options = match settings.url.as_deref() {
            Some(url) => SqliteConnectOptions::from_str(url)?,
            None => {
                if let Some(parent) = settings
                    .filename
                    .parent()
                    .filter(|parent| !parent.as_os_str().is_empty())
                {
                    tokio::fs::create_dir_all(parent).await?;
                }
                SqliteConnectOptions::new()
                    .filename(&settings.filename)
                    .create_if_missing(true)
            }
        }
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

        SqlitePoolOptions::new()
            .max_connections(settings.max_connections.get())
            .connect_with(options)
            .await
            .map_err(InfraError::from)
    }

    pub async fn run_migrations(pool: &SqlitePool) -> Result<(), InfraError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
