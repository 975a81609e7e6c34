//! Kline close prices from a Binance-compatible market data API.

use super::http::JsonClient;
use super::{DataSourceError, PriceSource};
use crate::domain::{Decimal, PricePoint, Resolution, UnixSecs};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_KLINES_URL: &str = "https://api.binance.com/api/v3/klines";

/// Maximum klines per request.
const BATCH_LIMIT: usize = 1000;

/// Index of the close price within a kline array.
const CLOSE_INDEX: usize = 4;

#[derive(Debug, Clone)]
pub struct BinancePriceSource {
    http: JsonClient,
    url: String,
    batch_delay: Duration,
}

impl BinancePriceSource {
    pub fn new(http: JsonClient, url: String, batch_delay: Duration) -> Self {
        Self {
            http,
            url,
            batch_delay,
        }
    }

    async fn fetch_batch(
        &self,
        symbol: &str,
        resolution: Resolution,
        start: UnixSecs,
        end: UnixSecs,
    ) -> Result<Vec<serde_json::Value>, DataSourceError> {
        let query = [
            ("symbol", symbol.to_string()),
            ("interval", resolution.as_str().to_string()),
            ("startTime", start.as_millis().to_string()),
            ("endTime", end.as_millis().to_string()),
            ("limit", BATCH_LIMIT.to_string()),
        ];
        let response = self.http.get_json(&self.url, &query).await?;
        response
            .as_array()
            .cloned()
            .ok_or_else(|| DataSourceError::ParseError("Expected array response".to_string()))
    }
}

#[async_trait]
impl PriceSource for BinancePriceSource {
    async fn fetch_price_series(
        &self,
        symbol: &str,
        start: UnixSecs,
        end: UnixSecs,
        resolution: Resolution,
    ) -> Result<Vec<PricePoint>, DataSourceError> {
        debug!(
            "Fetching {} {} klines from {} to {}",
            symbol, resolution, start, end
        );

        let mut points: Vec<PricePoint> = Vec::new();
        let mut cursor = start;
        loop {
            let batch = self.fetch_batch(symbol, resolution, cursor, end).await?;
            let batch_len = batch.len();
            for kline in &batch {
                match parse_kline(kline) {
                    Ok(point) => points.push(point),
                    Err(e) => warn!("Failed to parse kline: {}", e),
                }
            }

            let next = match points.last() {
                Some(last) => UnixSecs::new(last.timestamp.as_i64() + resolution.seconds()),
                None => break,
            };
            if batch_len < BATCH_LIMIT || next > end || next <= cursor {
                break;
            }
            cursor = next;
            tokio::time::sleep(self.batch_delay).await;
        }

        debug!("Fetched {} price points for {}", points.len(), symbol);
        Ok(points)
    }
}

/// `[openTime(ms), open, high, low, close, ...]` -> point at open time.
fn parse_kline(kline: &serde_json::Value) -> Result<PricePoint, DataSourceError> {
    let fields = kline
        .as_array()
        .ok_or_else(|| DataSourceError::ParseError("Expected kline array".to_string()))?;
    let open_ms = fields
        .first()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| DataSourceError::ParseError("Missing open time".to_string()))?;
    let close = fields
        .get(CLOSE_INDEX)
        .and_then(|v| v.as_str())
        .ok_or_else(|| DataSourceError::ParseError("Missing close price".to_string()))?;
    let price = Decimal::from_str_canonical(close)
        .map_err(|e| DataSourceError::ParseError(format!("Invalid close price: {}", e)))?;

    Ok(PricePoint::new(UnixSecs::new(open_ms.div_euclid(1000)), price))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kline_uses_close_price() {
        let kline = serde_json::json!([
            1757030400000i64,
            "850.10",
            "852.00",
            "849.50",
            "851.25",
            "1234.5",
            1757030459999i64
        ]);
        let point = parse_kline(&kline).unwrap();
        assert_eq!(point.timestamp, UnixSecs::new(1_757_030_400));
        assert_eq!(point.price, Decimal::from_str_canonical("851.25").unwrap());
    }

    #[test]
    fn test_parse_kline_rejects_short_rows() {
        let kline = serde_json::json!([1757030400000i64, "850.10"]);
        assert!(parse_kline(&kline).is_err());
    }
}
