//! Repository layer for cache operations.

use crate::domain::{Decimal, PricePoint, Resolution, UnixSecs};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("invalid cached price: {0}")]
    InvalidPrice(String),
}

/// A cached price series and the window it was fetched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSeries {
    pub start: UnixSecs,
    pub end: UnixSecs,
    pub cached_at: UnixSecs,
    pub points: Vec<PricePoint>,
}

/// Repository for cache operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cached series for `(symbol, resolution)` stored at or after
    /// `fresh_since`.
    ///
    /// # Errors
    /// Returns an error if the query fails or the stored payload is corrupt.
    pub async fn get_price_cache(
        &self,
        symbol: &str,
        resolution: Resolution,
        fresh_since: UnixSecs,
    ) -> Result<Option<CachedSeries>, CacheError> {
        let row = sqlx::query(
            r#"
            SELECT start_ts, end_ts, cached_at, points_json
            FROM price_cache
            WHERE symbol = ? AND resolution = ? AND cached_at >= ?
            "#,
        )
        .bind(symbol)
        .bind(resolution.as_str())
        .bind(fresh_since.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let points_json: String = row.get("points_json");
        Ok(Some(CachedSeries {
            start: UnixSecs::new(row.get("start_ts")),
            end: UnixSecs::new(row.get("end_ts")),
            cached_at: UnixSecs::new(row.get("cached_at")),
            points: decode_points(&points_json)?,
        }))
    }

    /// Replace the cached series for `(symbol, resolution)`.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn put_price_cache(
        &self,
        symbol: &str,
        resolution: Resolution,
        start: UnixSecs,
        end: UnixSecs,
        cached_at: UnixSecs,
        points: &[PricePoint],
    ) -> Result<(), CacheError> {
        let points_json = encode_points(points)?;
        sqlx::query(
            r#"
            INSERT INTO price_cache (symbol, resolution, start_ts, end_ts, cached_at, points_json)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol, resolution) DO UPDATE SET
                start_ts = excluded.start_ts,
                end_ts = excluded.end_ts,
                cached_at = excluded.cached_at,
                points_json = excluded.points_json
            "#,
        )
        .bind(symbol)
        .bind(resolution.as_str())
        .bind(start.as_i64())
        .bind(end.as_i64())
        .bind(cached_at.as_i64())
        .bind(points_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the query fails or the stored JSON is corrupt.
    pub async fn get_receipt(&self, tx_hash: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let row = sqlx::query("SELECT receipt_json FROM receipt_cache WHERE tx_hash = ?")
            .bind(tx_hash)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.get("receipt_json");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    /// Store a receipt. Receipts never change, so an existing row is kept.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn put_receipt(
        &self,
        tx_hash: &str,
        receipt: &serde_json::Value,
        cached_at: UnixSecs,
    ) -> Result<bool, CacheError> {
        let result = sqlx::query(
            r#"
            INSERT INTO receipt_cache (tx_hash, receipt_json, cached_at)
            VALUES (?, ?, ?)
            ON CONFLICT(tx_hash) DO NOTHING
            "#,
        )
        .bind(tx_hash)
        .bind(serde_json::to_string(receipt)?)
        .bind(cached_at.as_i64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Prices are stored as decimal strings so the cache is lossless.
fn encode_points(points: &[PricePoint]) -> Result<String, CacheError> {
    let rows: Vec<(i64, String)> = points
        .iter()
        .map(|p| (p.timestamp.as_i64(), p.price.to_canonical_string()))
        .collect();
    Ok(serde_json::to_string(&rows)?)
}

fn decode_points(json: &str) -> Result<Vec<PricePoint>, CacheError> {
    let rows: Vec<(i64, String)> = serde_json::from_str(json)?;
    rows.into_iter()
        .map(|(ts, price)| {
            Decimal::from_str_canonical(&price)
                .map(|price| PricePoint::new(UnixSecs::new(ts), price))
                .map_err(|_| CacheError::InvalidPrice(price))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn points() -> Vec<PricePoint> {
        vec![
            PricePoint::new(UnixSecs::new(100), Decimal::from_str_canonical("851.123456789").unwrap()),
            PricePoint::new(UnixSecs::new(160), Decimal::from_str_canonical("852").unwrap()),
        ]
    }

    #[tokio::test]
    async fn test_price_cache_round_trip_is_lossless() {
        let (repo, _temp) = setup_test_db().await;
        repo.put_price_cache(
            "BNBUSDT",
            Resolution::OneMinute,
            UnixSecs::new(100),
            UnixSecs::new(200),
            UnixSecs::new(1_000),
            &points(),
        )
        .await
        .expect("put failed");

        let cached = repo
            .get_price_cache("BNBUSDT", Resolution::OneMinute, UnixSecs::new(0))
            .await
            .expect("get failed")
            .expect("missing entry");
        assert_eq!(cached.start, UnixSecs::new(100));
        assert_eq!(cached.end, UnixSecs::new(200));
        assert_eq!(cached.points, points());
    }

    #[tokio::test]
    async fn test_price_cache_respects_freshness_and_key() {
        let (repo, _temp) = setup_test_db().await;
        repo.put_price_cache(
            "BNBUSDT",
            Resolution::OneMinute,
            UnixSecs::new(100),
            UnixSecs::new(200),
            UnixSecs::new(1_000),
            &points(),
        )
        .await
        .expect("put failed");

        let stale = repo
            .get_price_cache("BNBUSDT", Resolution::OneMinute, UnixSecs::new(1_001))
            .await
            .expect("get failed");
        assert!(stale.is_none());

        let other = repo
            .get_price_cache("BNBUSDT", Resolution::OneHour, UnixSecs::new(0))
            .await
            .expect("get failed");
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_receipt_insert_is_idempotent() {
        let (repo, _temp) = setup_test_db().await;
        let receipt = serde_json::json!({"logs": [], "status": "0x1"});

        assert!(repo.put_receipt("0xabc", &receipt, UnixSecs::new(1)).await.unwrap());
        assert!(!repo
            .put_receipt("0xabc", &serde_json::json!({}), UnixSecs::new(2))
            .await
            .unwrap());

        let stored = repo.get_receipt("0xabc").await.unwrap();
        assert_eq!(stored, Some(receipt));
        assert_eq!(repo.get_receipt("0xdef").await.unwrap(), None);
    }
}
