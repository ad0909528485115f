use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::Response;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::application::sums::SumError;
use crate::application::validation::{FieldError, validate_sum_request};
use crate::domain::entities::CachedSumRecord;
use crate::domain::error::DomainError;
use crate::infra::http::db_health_response;

use super::error::{ApiError, codes};
use super::models::*;
use super::state::ApiState;

const CACHED_SUM_NOT_FOUND: &str = "Cached sum not found";

pub async fn compute_sum(
    State(state): State<ApiState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SumResponse>, ApiError> {
    let Json(body) = payload.map_err(rejection_to_api)?;
    let numbers = validate_sum_request(&body, state.max_numbers).map_err(ApiError::validation)?;

    let outcome = state.sums.resolve(&numbers).await.map_err(sum_to_api)?;

    Ok(Json(SumResponse {
        sum: outcome.sum,
        cached: outcome.cached,
        timestamp: OffsetDateTime::now_utc(),
        request_id: outcome.id,
    }))
}

pub async fn list_cached(
    State(state): State<ApiState>,
) -> Result<Json<Vec<CachedSumRecord>>, ApiError> {
    let records = state.sums.list_cached().await.map_err(sum_to_api)?;
    Ok(Json(records))
}

pub async fn get_cached(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<CachedSumRecord>, ApiError> {
    let id = parse_record_id(&id)?;
    let record = state.sums.get_cached(id).await.map_err(sum_to_api)?;
    Ok(Json(record))
}

pub async fn delete_cached(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let id = parse_record_id(&id)?;
    state.sums.delete_cached(id).await.map_err(sum_to_api)?;
    Ok(Json(DeletedResponse {
        message: "Cached sum deleted successfully",
        id,
    }))
}

pub async fn clear_cached(
    State(state): State<ApiState>,
) -> Result<Json<ClearedResponse>, ApiError> {
    let deleted = state.sums.clear_cached().await.map_err(sum_to_api)?;
    Ok(Json(ClearedResponse {
        message: "All cached sums cleared successfully",
        deleted,
    }))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: OffsetDateTime::now_utc(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn health_db(State(state): State<ApiState>) -> Response {
    db_health_response(state.db.health_check().await)
}

pub async fn fallback(method: Method, uri: Uri) -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        codes::NOT_FOUND,
        "Route not found",
        Some(format!("Route {method} {} not found", uri.path())),
    )
}

/// Ids that are not UUIDs can never name a stored record.
fn parse_record_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|err| {
        debug!(target: "sumcache::http::api", id = raw, error = %err, "rejecting malformed id");
        ApiError::not_found(CACHED_SUM_NOT_FOUND)
    })
}

fn rejection_to_api(rejection: JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            codes::PAYLOAD_TOO_LARGE,
            "Request body too large",
            Some(rejection.body_text()),
        );
    }
    ApiError::validation(vec![FieldError::new("body", rejection.body_text())])
}

pub(crate) fn sum_to_api(err: SumError) -> ApiError {
    match err {
        SumError::InvalidInput(DomainError::Validation { message }) => {
            ApiError::validation(vec![FieldError::new("numbers", message)])
        }
        SumError::InvalidInput(other) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL,
            "Unexpected domain error",
            Some(other.to_string()),
        ),
        SumError::NotFound => ApiError::not_found(CACHED_SUM_NOT_FOUND),
        contended @ SumError::Contended { .. } => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::CONTENDED,
            "Sum could not be settled, retry the request",
            Some(contended.to_string()),
        ),
        SumError::Repo(err) => repo_to_api(err),
    }
}

pub(crate) fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::Duplicate { constraint } => ApiError::new(
            StatusCode::CONFLICT,
            codes::DUPLICATE,
            "Duplicate record",
            Some(constraint),
        ),
        RepoError::NotFound => ApiError::not_found(CACHED_SUM_NOT_FOUND),
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
            None,
        ),
        RepoError::Persistence(message) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            Some(message),
        ),
    }
}
