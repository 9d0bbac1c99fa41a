//! Catalog service for amusement parks and their roller coasters.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod validation;

pub use config::Config;
pub use db::{init_pool, run_migrations};
pub use error::{CatalogError, CatalogResult};
pub use models::{Coaster, CoasterPatch, CreateCoaster, MarkRidden, NewCoaster, NewPark, Park};
pub use routes::create_router;
pub use state::AppState;
pub use validation::{FieldViolation, Rule, ValidationErrors, Validator};
