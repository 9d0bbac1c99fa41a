use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::validation::{FieldViolation, ValidationErrors};

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Malformed request body: {0}")]
    InvalidBody(String),

    #[error("Invalid coaster id: {0}")]
    InvalidId(String),

    #[error("Park already exists: {0}")]
    ParkExists(String),

    #[error("Coaster ids already exist: {0:?}")]
    CoastersExist(Vec<i64>),

    #[error("Park not found: {0}")]
    ParkNotFound(String),

    #[error("Coaster not found: {0}")]
    CoasterNotFound(i64),

    #[error("Coasters not found: {0:?}")]
    CoastersNotFound(Vec<i64>),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ValidationErrors> for CatalogError {
    fn from(errors: ValidationErrors) -> Self {
        CatalogError::Validation(errors)
    }
}

impl CatalogError {
    pub fn status(&self) -> StatusCode {
        match self {
            CatalogError::Validation(_)
            | CatalogError::InvalidBody(_)
            | CatalogError::InvalidId(_) => StatusCode::BAD_REQUEST,
            CatalogError::ParkExists(_) | CatalogError::CoastersExist(_) => StatusCode::CONFLICT,
            CatalogError::ParkNotFound(_)
            | CatalogError::CoasterNotFound(_)
            | CatalogError::CoastersNotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the error body.
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::Validation(_) => "validation_failed",
            CatalogError::InvalidBody(_) => "invalid_body",
            CatalogError::InvalidId(_) => "invalid_id",
            CatalogError::ParkExists(_) | CatalogError::CoastersExist(_) => "conflict",
            CatalogError::ParkNotFound(_)
            | CatalogError::CoasterNotFound(_)
            | CatalogError::CoastersNotFound(_) => "not_found",
            CatalogError::Database(_) => "internal",
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violations: Option<&'a [FieldViolation]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<&'a [i64]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing: Option<&'a [i64]>,
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let message = match &self {
            CatalogError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Database error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.code(),
            message,
            violations: match &self {
                CatalogError::Validation(errors) => Some(errors.violations()),
                _ => None,
            },
            missing: match &self {
                CatalogError::CoastersNotFound(ids) => Some(ids.as_slice()),
                _ => None,
            },
            existing: match &self {
                CatalogError::CoastersExist(ids) => Some(ids.as_slice()),
                _ => None,
            },
        };

        (self.status(), Json(body)).into_response()
    }
}

/// True if the database rejected a write because of a UNIQUE or PRIMARY KEY constraint.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// True if the database rejected a write because of a FOREIGN KEY constraint.
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}
