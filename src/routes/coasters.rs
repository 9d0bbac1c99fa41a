use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::Value;

use crate::catalog;
use crate::error::{CatalogError, CatalogResult};
use crate::models::{Coaster, MarkRiddenResponse};
use crate::state::AppState;
use crate::validation::{parse_coaster_id, Validator};

use super::json_body;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/coasters", get(list_coasters))
        .route("/coasters/{id}", get(get_coaster))
}

/// Routes that require the bearer token.
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/coasters/add", post(add_coaster))
        .route("/coasters/{id}/update", post(update_coaster))
        .route("/coasters/markRidden", post(mark_ridden))
}

fn coaster_id(raw: &str) -> CatalogResult<i64> {
    parse_coaster_id(raw).ok_or_else(|| CatalogError::InvalidId(raw.to_string()))
}

/// GET /coasters - All coasters.
async fn list_coasters(State(state): State<AppState>) -> CatalogResult<Json<Vec<Coaster>>> {
    Ok(Json(catalog::list_coasters(&state.pool).await?))
}

/// GET /coasters/{id} - One coaster.
async fn get_coaster(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> CatalogResult<Json<Coaster>> {
    let id = coaster_id(&id)?;
    Ok(Json(catalog::get_coaster(&state.pool, id).await?))
}

/// POST /coasters/add - Create a coaster in an existing park.
async fn add_coaster(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> CatalogResult<(StatusCode, Json<Coaster>)> {
    let input = Validator::create_coaster(&json_body(payload)?)?;
    let coaster = catalog::create_coaster(&state.pool, input).await?;

    tracing::info!("Added coaster {} to park {}", coaster.id, coaster.park_id);
    Ok((StatusCode::CREATED, Json(coaster)))
}

/// POST /coasters/{id}/update - Partial update of one coaster.
async fn update_coaster(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> CatalogResult<Json<Coaster>> {
    let id = coaster_id(&id)?;
    let patch = Validator::update_coaster(&json_body(payload)?)?;
    let coaster = catalog::update_coaster(&state.pool, id, patch).await?;

    tracing::info!("Updated coaster {}", coaster.id);
    Ok(Json(coaster))
}

/// POST /coasters/markRidden - Mark a batch of coasters as ridden.
async fn mark_ridden(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> CatalogResult<Json<MarkRiddenResponse>> {
    let input = Validator::mark_ridden(&json_body(payload)?)?;
    let today = Utc::now().date_naive();
    let result = catalog::mark_ridden(&state.pool, input, today).await?;

    tracing::info!("Marked {} coasters as ridden", result.count);
    Ok(Json(result))
}
