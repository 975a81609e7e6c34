//! Positions from a Uniswap-v3 style positions subgraph.

use super::http::JsonClient;
use super::{skipped, DataSourceError, PositionBatch, PositionSource};
use crate::domain::{Address, Position, RawAmount, RecordSource, TokenInfo, UnixSecs};
use async_trait::async_trait;
use tracing::debug;

/// Page size for `positions(first: ..., skip: ...)`.
const PAGE_SIZE: usize = 1000;

const POSITIONS_QUERY: &str = r#"
query Positions($owner: String!, $first: Int!, $skip: Int!) {
  positions(
    first: $first
    skip: $skip
    orderBy: id
    orderDirection: asc
    where: { owner: $owner }
  ) {
    id
    owner
    pool { id }
    token0 { id symbol decimals }
    token1 { id symbol decimals }
    tickLower { tickIdx }
    tickUpper { tickIdx }
    liquidity
    depositedToken0
    depositedToken1
    withdrawnToken0
    withdrawnToken1
    collectedFeesToken0
    collectedFeesToken1
    transaction { id timestamp }
  }
}
"#;

#[derive(Debug, Clone)]
pub struct SubgraphPositionSource {
    http: JsonClient,
    url: String,
}

impl SubgraphPositionSource {
    pub fn new(http: JsonClient, url: String) -> Self {
        Self { http, url }
    }

    async fn fetch_page(
        &self,
        owner: &Address,
        skip: usize,
    ) -> Result<Vec<serde_json::Value>, DataSourceError> {
        let payload = serde_json::json!({
            "query": POSITIONS_QUERY,
            "variables": {
                "owner": owner.as_str(),
                "first": PAGE_SIZE,
                "skip": skip,
            }
        });
        let response = self.http.post_json(&self.url, &payload).await?;

        if let Some(errors) = response.get("errors").and_then(|v| v.as_array()) {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(DataSourceError::Other(format!("subgraph error: {}", message)));
            }
        }

        response
            .get("data")
            .and_then(|d| d.get("positions"))
            .and_then(|p| p.as_array())
            .cloned()
            .ok_or_else(|| DataSourceError::ParseError("Missing data.positions".to_string()))
    }
}

#[async_trait]
impl PositionSource for SubgraphPositionSource {
    async fn fetch_position_batch(&self, owner: &Address) -> Result<PositionBatch, DataSourceError> {
        debug!("Fetching positions for owner={}", owner);

        let mut batch = PositionBatch::default();
        let mut skip = 0;
        loop {
            let page = self.fetch_page(owner, skip).await?;
            let page_len = page.len();
            parse_positions_page(&page, skip, &mut batch);
            if page_len < PAGE_SIZE {
                break;
            }
            skip += page_len;
        }

        debug!(
            "Fetched {} positions for owner={} ({} skipped)",
            batch.positions.len(),
            owner,
            batch.skipped.len()
        );
        Ok(batch)
    }
}

/// `offset` is the number of entries on earlier pages; it identifies
/// entries that have no usable id.
fn parse_positions_page(page: &[serde_json::Value], offset: usize, batch: &mut PositionBatch) {
    for (i, position_json) in page.iter().enumerate() {
        match parse_position(position_json) {
            Ok(position) => batch.positions.push(position),
            Err(e) => {
                let id = position_json
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("positions:{}", offset + i));
                batch.skipped.push(skipped(RecordSource::Position, id, &e));
            }
        }
    }
}

fn str_field<'a>(json: &'a serde_json::Value, field: &str) -> Result<&'a str, DataSourceError> {
    json.get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| DataSourceError::ParseError(format!("Missing {} field", field)))
}

/// Subgraph numbers are strings; some deployments emit plain JSON numbers.
fn int_field(json: &serde_json::Value, field: &str) -> Result<i64, DataSourceError> {
    let value = json
        .get(field)
        .ok_or_else(|| DataSourceError::ParseError(format!("Missing {} field", field)))?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| DataSourceError::ParseError(format!("Invalid {}: {}", field, value)))
}

fn parse_token(json: &serde_json::Value, field: &str) -> Result<TokenInfo, DataSourceError> {
    let token = json
        .get(field)
        .ok_or_else(|| DataSourceError::ParseError(format!("Missing {} field", field)))?;
    let address = Address::parse(str_field(token, "id")?)
        .map_err(|e| DataSourceError::ParseError(format!("Invalid {} address: {}", field, e)))?;
    let decimals = int_field(token, "decimals")?;
    let decimals = u8::try_from(decimals)
        .map_err(|_| DataSourceError::ParseError(format!("Invalid {} decimals", field)))?;
    let symbol = token
        .get("symbol")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    Ok(TokenInfo::new(address, symbol, decimals))
}

/// Subgraph amounts are display decimals; the ledger wants raw integers.
/// Unconvertible values pass through unchanged so the normalizer rejects the
/// position with a visible reason.
fn raw_amount(json: &serde_json::Value, field: &str, decimals: u8) -> Result<String, DataSourceError> {
    let display = str_field(json, field)?;
    Ok(RawAmount::from_display(display, decimals)
        .map(|raw| raw.to_string())
        .unwrap_or_else(|_| display.to_string()))
}

fn parse_position(json: &serde_json::Value) -> Result<Position, DataSourceError> {
    let id = str_field(json, "id")?.to_string();
    let owner = Address::parse(str_field(json, "owner")?)
        .map_err(|e| DataSourceError::ParseError(format!("Invalid owner: {}", e)))?;
    let token0 = parse_token(json, "token0")?;
    let token1 = parse_token(json, "token1")?;

    let tick = |field: &str| -> Result<i32, DataSourceError> {
        let inner = json
            .get(field)
            .ok_or_else(|| DataSourceError::ParseError(format!("Missing {} field", field)))?;
        let idx = int_field(inner, "tickIdx")?;
        i32::try_from(idx).map_err(|_| DataSourceError::ParseError(format!("Invalid {}", field)))
    };
    let tick_lower = tick("tickLower")?;
    let tick_upper = tick("tickUpper")?;

    let transaction = json
        .get("transaction")
        .ok_or_else(|| DataSourceError::ParseError("Missing transaction field".to_string()))?;
    let created_at = UnixSecs::new(int_field(transaction, "timestamp")?);

    Ok(Position {
        id,
        owner,
        created_at,
        tick_lower,
        tick_upper,
        liquidity: str_field(json, "liquidity")?.to_string(),
        deposited0: raw_amount(json, "depositedToken0", token0.decimals)?,
        deposited1: raw_amount(json, "depositedToken1", token1.decimals)?,
        withdrawn0: raw_amount(json, "withdrawnToken0", token0.decimals)?,
        withdrawn1: raw_amount(json, "withdrawnToken1", token1.decimals)?,
        collected_fees0: raw_amount(json, "collectedFeesToken0", token0.decimals)?,
        collected_fees1: raw_amount(json, "collectedFeesToken1", token1.decimals)?,
        token0,
        token1,
        current0: None,
        current1: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position_json() -> serde_json::Value {
        serde_json::json!({
            "id": "655320",
            "owner": "0x6D530c88F583478fdC2e553f872bbE6DDd89C7eE",
            "pool": { "id": "0x172fcd41e0913e95784454622d1c3724f546f849" },
            "token0": { "id": "0x55d398326f99059ff775485246999027b3197955", "symbol": "USDT", "decimals": "18" },
            "token1": { "id": "0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c", "symbol": "WBNB", "decimals": "18" },
            "tickLower": { "tickIdx": "-64800" },
            "tickUpper": { "tickIdx": "-63600" },
            "liquidity": "0",
            "depositedToken0": "1500.25",
            "depositedToken1": "2.5",
            "withdrawnToken0": "1610.5",
            "withdrawnToken1": "2.31",
            "collectedFeesToken0": "3.75",
            "collectedFeesToken1": "0.004",
            "transaction": { "id": "0xabc", "timestamp": "1757300000" }
        })
    }

    #[test]
    fn test_parse_position_valid() {
        let position = parse_position(&position_json()).unwrap();
        assert_eq!(position.id, "655320");
        assert_eq!(position.owner.as_str(), "0x6d530c88f583478fdc2e553f872bbe6ddd89c7ee");
        assert_eq!(position.created_at, UnixSecs::new(1_757_300_000));
        assert_eq!(position.tick_lower, -64800);
        assert_eq!(position.token1.symbol, "WBNB");
        assert_eq!(position.deposited0, "1500250000000000000000");
        assert_eq!(position.deposited1, "2500000000000000000");
        assert_eq!(position.collected_fees1, "4000000000000000");
    }

    #[test]
    fn test_parse_position_missing_transaction() {
        let mut json = position_json();
        json.as_object_mut().unwrap().remove("transaction");
        let err = parse_position(&json).unwrap_err();
        assert!(err.to_string().contains("transaction"));
    }

    #[test]
    fn test_unconvertible_amount_passes_through() {
        let mut json = position_json();
        json["depositedToken0"] = serde_json::json!("not-a-number");
        let position = parse_position(&json).unwrap();
        assert_eq!(position.deposited0, "not-a-number");
    }

    #[test]
    fn test_unparseable_positions_are_reported() {
        let mut missing_tx = position_json();
        missing_tx["id"] = serde_json::json!("655321");
        missing_tx.as_object_mut().unwrap().remove("transaction");
        let no_id = serde_json::json!({"owner": "0x6d530c88f583478fdc2e553f872bbe6ddd89c7ee"});

        let mut batch = PositionBatch::default();
        parse_positions_page(&[position_json(), missing_tx, no_id], 1000, &mut batch);

        assert_eq!(batch.positions.len(), 1);
        let ids: Vec<_> = batch.skipped.iter().map(|s| s.record_id.as_str()).collect();
        assert_eq!(ids, vec!["655321", "positions:1002"]);
        assert!(batch.skipped.iter().all(|s| s.source == RecordSource::Position));
    }
}
