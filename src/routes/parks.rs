use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

use crate::catalog;
use crate::error::CatalogResult;
use crate::models::Park;
use crate::state::AppState;
use crate::validation::Validator;

use super::json_body;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/parks", get(list_parks))
        .route("/parks/{id}", get(get_park))
}

/// Routes that require the bearer token.
pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/parks/add", post(add_park))
}

/// GET /parks - All parks with their coasters.
async fn list_parks(State(state): State<AppState>) -> CatalogResult<Json<Vec<Park>>> {
    Ok(Json(catalog::list_parks(&state.pool).await?))
}

/// GET /parks/{id} - One park with its coasters.
async fn get_park(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> CatalogResult<Json<Park>> {
    Ok(Json(catalog::get_park(&state.pool, &id).await?))
}

/// POST /parks/add - Create a park, optionally with initial coasters.
async fn add_park(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> CatalogResult<(StatusCode, Json<Park>)> {
    let input = Validator::create_park(&json_body(payload)?)?;
    let park = catalog::create_park(&state.pool, input).await?;

    tracing::info!("Added park {} with {} coasters", park.id, park.coasters.len());
    Ok((StatusCode::CREATED, Json(park)))
}
