pub mod coasters;
pub mod health;
pub mod parks;

use axum::{extract::rejection::JsonRejection, Json, Router};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::error::{CatalogError, CatalogResult};
use crate::middleware::require_bearer;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(parks::protected_routes())
        .merge(coasters::protected_routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ));

    Router::new()
        .merge(health::routes())
        .merge(parks::routes())
        .merge(coasters::routes())
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Unwrap a JSON body, turning extractor rejections into a 400.
fn json_body(payload: Result<Json<Value>, JsonRejection>) -> CatalogResult<Value> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| CatalogError::InvalidBody(rejection.body_text()))
}
