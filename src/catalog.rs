//! Catalog operations.
//!
//! Each mutating operation opens one transaction, runs its existence checks,
//! and only then issues the write. A uniqueness or foreign-key violation
//! raised by the store at write time is classified the same way as the
//! matching pre-check.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::db;
use crate::error::{is_foreign_key_violation, is_unique_violation, CatalogError, CatalogResult};
use crate::models::{
    Coaster, CoasterPatch, CreateCoaster, MarkRidden, MarkRiddenResponse, NewCoaster, NewPark,
    Park,
};
use crate::validation::{Rule, ValidationErrors};

/// Open a transaction that holds the write lock from its first statement,
/// so existence checks and the write see the same snapshot.
async fn begin_write(pool: &SqlitePool) -> CatalogResult<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// Classify a failed coaster insert. A unique violation on a store-assigned
/// id is not a client conflict and stays a database error.
fn insert_coaster_error(err: sqlx::Error, park_id: &str, coaster: &NewCoaster) -> CatalogError {
    match coaster.id {
        Some(id) if is_unique_violation(&err) => CatalogError::CoastersExist(vec![id]),
        _ if is_foreign_key_violation(&err) => CatalogError::ParkNotFound(park_id.to_string()),
        _ => err.into(),
    }
}

/// All parks in insertion order, each with its coasters.
pub async fn list_parks(pool: &SqlitePool) -> CatalogResult<Vec<Park>> {
    let mut conn = pool.acquire().await?;
    let mut parks = db::list_parks(&mut conn).await?;
    let coasters = db::list_coasters(&mut conn).await?;

    let mut by_park: HashMap<String, Vec<Coaster>> = HashMap::new();
    for coaster in coasters {
        by_park
            .entry(coaster.park_id.clone())
            .or_default()
            .push(coaster);
    }
    for park in &mut parks {
        park.coasters = by_park.remove(&park.id).unwrap_or_default();
    }

    Ok(parks)
}

/// One park with its coasters.
pub async fn get_park(pool: &SqlitePool, id: &str) -> CatalogResult<Park> {
    let mut conn = pool.acquire().await?;
    let mut park = db::find_park(&mut conn, id)
        .await?
        .ok_or_else(|| CatalogError::ParkNotFound(id.to_string()))?;
    park.coasters = db::coasters_for_park(&mut conn, id).await?;
    Ok(park)
}

pub async fn list_coasters(pool: &SqlitePool) -> CatalogResult<Vec<Coaster>> {
    let mut conn = pool.acquire().await?;
    Ok(db::list_coasters(&mut conn).await?)
}

pub async fn get_coaster(pool: &SqlitePool, id: i64) -> CatalogResult<Coaster> {
    let mut conn = pool.acquire().await?;
    db::find_coaster(&mut conn, id)
        .await?
        .ok_or(CatalogError::CoasterNotFound(id))
}

/// Create a park and its initial coasters atomically.
pub async fn create_park(pool: &SqlitePool, input: NewPark) -> CatalogResult<Park> {
    let mut tx = begin_write(pool).await?;

    if db::find_park(&mut tx, &input.id).await?.is_some() {
        return Err(CatalogError::ParkExists(input.id));
    }

    let explicit_ids: Vec<i64> = input.coasters.iter().filter_map(|c| c.id).collect();
    let mut taken = db::existing_coaster_ids(&mut tx, &explicit_ids).await?;
    if !taken.is_empty() {
        taken.sort_unstable();
        return Err(CatalogError::CoastersExist(taken));
    }

    db::insert_park(&mut tx, &input.id, &input.name, &input.country)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CatalogError::ParkExists(input.id.clone())
            } else {
                e.into()
            }
        })?;

    for coaster in &input.coasters {
        db::insert_coaster(&mut tx, &input.id, coaster)
            .await
            .map_err(|e| insert_coaster_error(e, &input.id, coaster))?;
    }

    let mut park = db::find_park(&mut tx, &input.id)
        .await?
        .ok_or_else(|| CatalogError::ParkNotFound(input.id.clone()))?;
    park.coasters = db::coasters_for_park(&mut tx, &input.id).await?;

    tx.commit().await?;

    tracing::debug!(
        "Created park {} with {} coasters",
        park.id,
        park.coasters.len()
    );
    Ok(park)
}

/// Create a coaster in an existing park.
pub async fn create_coaster(pool: &SqlitePool, input: CreateCoaster) -> CatalogResult<Coaster> {
    let mut tx = begin_write(pool).await?;

    if db::find_park(&mut tx, &input.park_id).await?.is_none() {
        return Err(CatalogError::ParkNotFound(input.park_id));
    }
    if let Some(id) = input.coaster.id {
        if db::find_coaster(&mut tx, id).await?.is_some() {
            return Err(CatalogError::CoastersExist(vec![id]));
        }
    }

    let id = db::insert_coaster(&mut tx, &input.park_id, &input.coaster)
        .await
        .map_err(|e| insert_coaster_error(e, &input.park_id, &input.coaster))?;

    let coaster = db::find_coaster(&mut tx, id)
        .await?
        .ok_or(CatalogError::CoasterNotFound(id))?;

    tx.commit().await?;

    tracing::debug!("Created coaster {} in park {}", coaster.id, coaster.park_id);
    Ok(coaster)
}

/// Apply a partial update. Fields absent from `patch` keep their stored value.
pub async fn update_coaster(
    pool: &SqlitePool,
    id: i64,
    patch: CoasterPatch,
) -> CatalogResult<Coaster> {
    let mut tx = begin_write(pool).await?;

    let existing = db::find_coaster(&mut tx, id)
        .await?
        .ok_or(CatalogError::CoasterNotFound(id))?;

    if patch.is_empty() {
        return Ok(existing);
    }

    if patch.opened.is_some() || patch.closed.is_some() {
        let merged = patch.apply_to(&existing);
        if let Some(closed) = merged.closed {
            if closed < merged.opened {
                return Err(CatalogError::Validation(ValidationErrors::single(
                    "closed",
                    Rule::DateOrder,
                    format!("closed must not be before opened ({})", merged.opened),
                    Value::from(closed.to_string()),
                )));
            }
        }
    }

    db::update_coaster(&mut tx, id, &patch).await?;
    let coaster = db::find_coaster(&mut tx, id)
        .await?
        .ok_or(CatalogError::CoasterNotFound(id))?;

    tx.commit().await?;

    tracing::debug!("Updated coaster {}", id);
    Ok(coaster)
}

/// Mark every listed coaster as ridden, all or nothing.
///
/// `today` becomes the ridden date when the input asks for it.
pub async fn mark_ridden(
    pool: &SqlitePool,
    input: MarkRidden,
    today: NaiveDate,
) -> CatalogResult<MarkRiddenResponse> {
    let mut tx = begin_write(pool).await?;

    let existing: HashSet<i64> = db::existing_coaster_ids(&mut tx, &input.coasters)
        .await?
        .into_iter()
        .collect();
    let mut missing: Vec<i64> = input
        .coasters
        .iter()
        .copied()
        .filter(|id| !existing.contains(id))
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        missing.dedup();
        return Err(CatalogError::CoastersNotFound(missing));
    }

    let ridden_date = input.include_date.then_some(today);
    let count = db::mark_ridden(&mut tx, &input.coasters, ridden_date).await?;
    let coasters = db::find_coasters(&mut tx, &input.coasters).await?;

    tx.commit().await?;

    tracing::debug!("Marked {} coasters as ridden", count);
    Ok(MarkRiddenResponse { count, coasters })
}
