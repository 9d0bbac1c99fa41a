use sqlx::SqlitePool;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub api_key: Arc<str>,
}

impl AppState {
    pub fn new(pool: SqlitePool, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            pool,
            api_key: api_key.into(),
        }
    }
}
