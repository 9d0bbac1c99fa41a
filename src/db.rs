use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

use crate::models::{Coaster, CoasterPatch, NewCoaster, Park};

const MIGRATIONS: [&str; 3] = [
    include_str!("../migrations/001_create_parks.sql"),
    include_str!("../migrations/002_create_coasters.sql"),
    include_str!("../migrations/003_index_coasters_park_id.sql"),
];

const PARK_COLUMNS: &str = "id, name, country";

const COASTER_COLUMNS: &str =
    "id, park_id, name, ridden, ridden_date, opened, closed, latitude, longitude, rcdb";

/// Initialize database connection pool with recommended pragmas.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .synchronous(SqliteSynchronous::Normal);

    // Each connection to an in-memory URL gets its own empty database.
    let pool_options = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(10)
    };

    pool_options.connect_with(options).await
}

/// Run database migrations. Every statement is idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for migration in MIGRATIONS {
        sqlx::query(migration).execute(pool).await?;
    }
    Ok(())
}

/// Get a park row by id. `coasters` is left empty.
pub async fn find_park(conn: &mut SqliteConnection, id: &str) -> Result<Option<Park>, sqlx::Error> {
    let sql = format!("SELECT {PARK_COLUMNS} FROM parks WHERE id = ?");
    sqlx::query_as::<_, Park>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

/// All park rows in insertion order. `coasters` is left empty.
pub async fn list_parks(conn: &mut SqliteConnection) -> Result<Vec<Park>, sqlx::Error> {
    let sql = format!("SELECT {PARK_COLUMNS} FROM parks ORDER BY rowid ASC");
    sqlx::query_as::<_, Park>(&sql).fetch_all(&mut *conn).await
}

pub async fn insert_park(
    conn: &mut SqliteConnection,
    id: &str,
    name: &str,
    country: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO parks (id, name, country) VALUES (?, ?, ?)")
        .bind(id)
        .bind(name)
        .bind(country)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn find_coaster(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Coaster>, sqlx::Error> {
    let sql = format!("SELECT {COASTER_COLUMNS} FROM coasters WHERE id = ?");
    sqlx::query_as::<_, Coaster>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

/// All coasters in insertion order.
pub async fn list_coasters(conn: &mut SqliteConnection) -> Result<Vec<Coaster>, sqlx::Error> {
    let sql = format!("SELECT {COASTER_COLUMNS} FROM coasters ORDER BY rowid ASC");
    sqlx::query_as::<_, Coaster>(&sql).fetch_all(&mut *conn).await
}

/// Coasters of one park in insertion order.
pub async fn coasters_for_park(
    conn: &mut SqliteConnection,
    park_id: &str,
) -> Result<Vec<Coaster>, sqlx::Error> {
    let sql = format!("SELECT {COASTER_COLUMNS} FROM coasters WHERE park_id = ? ORDER BY rowid ASC");
    sqlx::query_as::<_, Coaster>(&sql)
        .bind(park_id)
        .fetch_all(&mut *conn)
        .await
}

/// Coasters whose id is in `ids`, in insertion order. Unknown ids are skipped.
pub async fn find_coasters(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<Vec<Coaster>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {COASTER_COLUMNS} FROM coasters WHERE id IN ("
    ));
    let mut list = builder.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    builder.push(") ORDER BY rowid ASC");

    builder
        .build_query_as::<Coaster>()
        .fetch_all(&mut *conn)
        .await
}

/// The subset of `ids` that exist in the coasters table.
pub async fn existing_coaster_ids(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<Vec<i64>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new("SELECT id FROM coasters WHERE id IN (");
    let mut list = builder.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    builder.push(")");

    builder
        .build_query_scalar::<i64>()
        .fetch_all(&mut *conn)
        .await
}

/// Insert a coaster into `park_id`. Returns the stored id, which is
/// `max(id) + 1` when the input carries none.
pub async fn insert_coaster(
    conn: &mut SqliteConnection,
    park_id: &str,
    coaster: &NewCoaster,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO coasters
            (id, park_id, name, ridden, ridden_date, opened, closed, latitude, longitude, rcdb)
        VALUES
            (COALESCE(?, (SELECT COALESCE(MAX(id), 0) + 1 FROM coasters)), ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(coaster.id)
    .bind(park_id)
    .bind(&coaster.name)
    .bind(coaster.ridden)
    .bind(coaster.ridden_date)
    .bind(coaster.opened)
    .bind(coaster.closed)
    .bind(coaster.latitude)
    .bind(coaster.longitude)
    .bind(&coaster.rcdb)
    .fetch_one(&mut *conn)
    .await
}

/// Write only the columns present in `patch`. Returns rows affected.
pub async fn update_coaster(
    conn: &mut SqliteConnection,
    id: i64,
    patch: &CoasterPatch,
) -> Result<u64, sqlx::Error> {
    if patch.is_empty() {
        return Ok(0);
    }

    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE coasters SET ");
    let mut set = builder.separated(", ");
    if let Some(name) = &patch.name {
        set.push("name = ").push_bind_unseparated(name.as_str());
    }
    if let Some(ridden) = patch.ridden {
        set.push("ridden = ").push_bind_unseparated(ridden);
    }
    if let Some(ridden_date) = patch.ridden_date {
        set.push("ridden_date = ").push_bind_unseparated(ridden_date);
    }
    if let Some(opened) = patch.opened {
        set.push("opened = ").push_bind_unseparated(opened);
    }
    if let Some(closed) = patch.closed {
        set.push("closed = ").push_bind_unseparated(closed);
    }
    if let Some(latitude) = patch.latitude {
        set.push("latitude = ").push_bind_unseparated(latitude);
    }
    if let Some(longitude) = patch.longitude {
        set.push("longitude = ").push_bind_unseparated(longitude);
    }
    if let Some(rcdb) = &patch.rcdb {
        set.push("rcdb = ").push_bind_unseparated(rcdb.as_str());
    }
    builder.push(" WHERE id = ").push_bind(id);

    let result = builder.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Set `ridden` on every coaster in `ids`, and `ridden_date` when given.
/// Returns rows affected.
pub async fn mark_ridden(
    conn: &mut SqliteConnection,
    ids: &[i64],
    ridden_date: Option<NaiveDate>,
) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut builder =
        QueryBuilder::<Sqlite>::new("UPDATE coasters SET ridden = 1, ridden_date = COALESCE(");
    builder.push_bind(ridden_date);
    builder.push(", ridden_date) WHERE id IN (");
    let mut list = builder.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    builder.push(")");

    let result = builder.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{is_foreign_key_violation, is_unique_violation};
    use sqlx::pool::PoolConnection;

    /// Create a test database with in-memory SQLite.
    async fn setup_test_db() -> PoolConnection<Sqlite> {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool.acquire().await.unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_coaster(id: Option<i64>, name: &str) -> NewCoaster {
        NewCoaster {
            id,
            name: name.to_string(),
            ridden: false,
            ridden_date: None,
            opened: date(2002, 3, 23),
            closed: None,
            latitude: 48.26,
            longitude: 7.72,
            rcdb: "https://rcdb.com/2832.htm".to_string(),
        }
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_and_find_park() {
        let mut conn = setup_test_db().await;

        insert_park(&mut conn, "europa-park", "Europa-Park", "Germany")
            .await
            .unwrap();

        let park = find_park(&mut conn, "europa-park").await.unwrap().unwrap();
        assert_eq!(park.name, "Europa-Park");
        assert_eq!(park.country, "Germany");
        assert!(park.coasters.is_empty());

        assert!(find_park(&mut conn, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_park_is_unique_violation() {
        let mut conn = setup_test_db().await;

        insert_park(&mut conn, "europa-park", "Europa-Park", "Germany")
            .await
            .unwrap();
        let err = insert_park(&mut conn, "europa-park", "Other", "France")
            .await
            .unwrap_err();

        assert!(is_unique_violation(&err));
        let park = find_park(&mut conn, "europa-park").await.unwrap().unwrap();
        assert_eq!(park.name, "Europa-Park");
    }

    #[tokio::test]
    async fn test_insert_coaster_assigns_ids() {
        let mut conn = setup_test_db().await;
        insert_park(&mut conn, "europa-park", "Europa-Park", "Germany")
            .await
            .unwrap();

        let first = insert_coaster(&mut conn, "europa-park", &new_coaster(None, "Silver Star"))
            .await
            .unwrap();
        let explicit = insert_coaster(&mut conn, "europa-park", &new_coaster(Some(40), "Blue Fire"))
            .await
            .unwrap();
        let next = insert_coaster(&mut conn, "europa-park", &new_coaster(None, "Wodan"))
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(explicit, 40);
        assert_eq!(next, 41);

        let coaster = find_coaster(&mut conn, 40).await.unwrap().unwrap();
        assert_eq!(coaster.name, "Blue Fire");
        assert_eq!(coaster.park_id, "europa-park");
        assert_eq!(coaster.opened, date(2002, 3, 23));
        assert!(!coaster.ridden);
    }

    #[tokio::test]
    async fn test_coasters_keep_insertion_order() {
        let mut conn = setup_test_db().await;
        insert_park(&mut conn, "europa-park", "Europa-Park", "Germany")
            .await
            .unwrap();

        for (id, name) in [(30, "C"), (10, "A"), (20, "B")] {
            insert_coaster(&mut conn, "europa-park", &new_coaster(Some(id), name))
                .await
                .unwrap();
        }

        let names: Vec<String> = coasters_for_park(&mut conn, "europa-park")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn test_insert_coaster_constraint_violations() {
        let mut conn = setup_test_db().await;
        insert_park(&mut conn, "europa-park", "Europa-Park", "Germany")
            .await
            .unwrap();

        let err = insert_coaster(&mut conn, "missing-park", &new_coaster(Some(1), "Ghost"))
            .await
            .unwrap_err();
        assert!(is_foreign_key_violation(&err));

        insert_coaster(&mut conn, "europa-park", &new_coaster(Some(1), "Silver Star"))
            .await
            .unwrap();
        let err = insert_coaster(&mut conn, "europa-park", &new_coaster(Some(1), "Copy"))
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_db_check_constraints() {
        let mut conn = setup_test_db().await;

        // Uppercase park id should fail
        let result = insert_park(&mut conn, "Six-Flags", "Six Flags", "USA").await;
        assert!(result.is_err());

        // Empty name should fail
        let result = insert_park(&mut conn, "six-flags", "", "USA").await;
        assert!(result.is_err());

        insert_park(&mut conn, "six-flags", "Six Flags", "USA")
            .await
            .unwrap();

        // Invalid latitude should fail
        let mut coaster = new_coaster(Some(1), "Kingda Ka");
        coaster.latitude = 91.0;
        assert!(insert_coaster(&mut conn, "six-flags", &coaster).await.is_err());

        // Invalid longitude should fail
        let mut coaster = new_coaster(Some(1), "Kingda Ka");
        coaster.longitude = -181.0;
        assert!(insert_coaster(&mut conn, "six-flags", &coaster).await.is_err());
    }

    #[tokio::test]
    async fn test_update_coaster_writes_only_patched_columns() {
        let mut conn = setup_test_db().await;
        insert_park(&mut conn, "europa-park", "Europa-Park", "Germany")
            .await
            .unwrap();
        insert_coaster(&mut conn, "europa-park", &new_coaster(Some(1), "Silver Star"))
            .await
            .unwrap();
        let before = find_coaster(&mut conn, 1).await.unwrap().unwrap();

        let patch = CoasterPatch {
            name: Some("Silver Star II".to_string()),
            closed: Some(Some(date(2030, 1, 1))),
            ..Default::default()
        };
        assert_eq!(update_coaster(&mut conn, 1, &patch).await.unwrap(), 1);

        let after = find_coaster(&mut conn, 1).await.unwrap().unwrap();
        assert_eq!(after.name, "Silver Star II");
        assert_eq!(after.closed, Some(date(2030, 1, 1)));
        assert_eq!(after.opened, before.opened);
        assert_eq!(after.latitude, before.latitude);
        assert_eq!(after.rcdb, before.rcdb);

        // Clearing a nullable column
        let patch = CoasterPatch {
            closed: Some(None),
            ..Default::default()
        };
        update_coaster(&mut conn, 1, &patch).await.unwrap();
        assert_eq!(find_coaster(&mut conn, 1).await.unwrap().unwrap().closed, None);
    }

    #[tokio::test]
    async fn test_update_coaster_empty_patch_and_missing_row() {
        let mut conn = setup_test_db().await;

        let empty = CoasterPatch::default();
        assert_eq!(update_coaster(&mut conn, 1, &empty).await.unwrap(), 0);

        let patch = CoasterPatch {
            ridden: Some(true),
            ..Default::default()
        };
        assert_eq!(update_coaster(&mut conn, 99, &patch).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_ridden_keeps_date_when_none() {
        let mut conn = setup_test_db().await;
        insert_park(&mut conn, "europa-park", "Europa-Park", "Germany")
            .await
            .unwrap();
        let mut dated = new_coaster(Some(1), "Silver Star");
        dated.ridden_date = Some(date(2019, 8, 1));
        insert_coaster(&mut conn, "europa-park", &dated).await.unwrap();
        insert_coaster(&mut conn, "europa-park", &new_coaster(Some(2), "Blue Fire"))
            .await
            .unwrap();

        let affected = mark_ridden(&mut conn, &[1, 2], None).await.unwrap();
        assert_eq!(affected, 2);

        let coasters = find_coasters(&mut conn, &[1, 2]).await.unwrap();
        assert!(coasters.iter().all(|c| c.ridden));
        assert_eq!(coasters[0].ridden_date, Some(date(2019, 8, 1)));
        assert_eq!(coasters[1].ridden_date, None);

        mark_ridden(&mut conn, &[1, 2], Some(date(2024, 7, 1)))
            .await
            .unwrap();
        let coasters = find_coasters(&mut conn, &[1, 2]).await.unwrap();
        assert!(coasters
            .iter()
            .all(|c| c.ridden_date == Some(date(2024, 7, 1))));
    }

    #[tokio::test]
    async fn test_existing_coaster_ids() {
        let mut conn = setup_test_db().await;
        insert_park(&mut conn, "europa-park", "Europa-Park", "Germany")
            .await
            .unwrap();
        insert_coaster(&mut conn, "europa-park", &new_coaster(Some(1), "Silver Star"))
            .await
            .unwrap();
        insert_coaster(&mut conn, "europa-park", &new_coaster(Some(2), "Blue Fire"))
            .await
            .unwrap();

        let mut found = existing_coaster_ids(&mut conn, &[1, 2, 3]).await.unwrap();
        found.sort_unstable();
        assert_eq!(found, vec![1, 2]);
        assert!(existing_coaster_ids(&mut conn, &[]).await.unwrap().is_empty());
    }
}
