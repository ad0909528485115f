use std::sync::Arc;

use crate::application::sums::SumService;
use crate::infra::db::SqliteRepositories;

use super::rate_limit::ApiRateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub sums: Arc<SumService>,
    pub db: Arc<SqliteRepositories>,
    pub rate_limiter: Arc<ApiRateLimiter>,
    /// Largest `numbers` array accepted by `POST /api/sum`.
    pub max_numbers: usize,
}
