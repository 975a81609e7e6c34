//! Cache database setup.
//!
//! The database only holds data that can be fetched again, so a file written
//! by a different schema version is wiped instead of migrated.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info, warn};

/// Stored in `PRAGMA user_version`. Bump when `schema.sql` changes shape.
pub const SCHEMA_VERSION: i64 = 1;

const CACHE_TABLES: [&str; 2] = ["price_cache", "receipt_cache"];

/// Open (creating if needed) the cache database at `db_path` and bring its
/// schema to [`SCHEMA_VERSION`].
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .after_connect(|conn, _meta| Box::pin(async move { apply_pragmas(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    prepare_schema(&pool).await?;

    info!("Cache database ready at {}", db_path);
    Ok(pool)
}

async fn prepare_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let version: i64 = sqlx::query("PRAGMA user_version")
        .fetch_one(pool)
        .await?
        .get(0);

    if version != 0 && version != SCHEMA_VERSION {
        warn!(
            "Cache schema version {} does not match {}; discarding cached data",
            version, SCHEMA_VERSION
        );
        for table in CACHE_TABLES {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(pool)
                .await?;
        }
    }

    for statement in include_str!("schema.sql").split(';') {
        let statement = statement.trim();
        if !statement.is_empty() {
            sqlx::query(statement).execute(pool).await?;
        }
    }

    // PRAGMA arguments cannot be bound.
    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(pool)
        .await?;
    debug!("Cache schema at version {}", SCHEMA_VERSION);
    Ok(())
}

async fn apply_pragmas(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    // WAL can be refused (e.g. some network filesystems); SQLite reports the
    // mode it actually chose.
    let mode: String = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?
        .get(0);
    debug!("SQLite journal_mode: {}", mode);

    for pragma in ["PRAGMA busy_timeout = 5000", "PRAGMA synchronous = NORMAL"] {
        sqlx::query(pragma).execute(&mut *conn).await?;
    }
    Ok(())
}
