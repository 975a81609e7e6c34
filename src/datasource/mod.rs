//! Data source abstraction for fetching positions, swaps and prices from
//! external services.

use crate::domain::{
    Address, DecodeIssue, Position, PricePoint, RecordSource, Resolution, SwapRecord, UnixSecs,
};
use async_trait::async_trait;
use std::fmt;
use tracing::warn;

pub mod binance;
pub mod cached;
pub mod explorer;
pub mod http;
pub mod mock;
pub mod subgraph;

pub use binance::BinancePriceSource;
pub use cached::CachedPriceSource;
pub use explorer::{ExplorerSwapSource, ORDER_RECORD_TOPIC};
pub use mock::MockDataSource;
pub use subgraph::SubgraphPositionSource;

/// Positions from one fetch, plus upstream entries that could not be parsed.
#[derive(Debug, Clone, Default)]
pub struct PositionBatch {
    pub positions: Vec<Position>,
    pub skipped: Vec<DecodeIssue>,
}

/// Swap records from one fetch, plus transactions and logs that could not be
/// decoded.
#[derive(Debug, Clone, Default)]
pub struct SwapBatch {
    pub records: Vec<SwapRecord>,
    pub skipped: Vec<DecodeIssue>,
}

/// Concentrated-liquidity positions owned by a wallet.
///
/// Implementations must handle pagination and retry/backoff.
#[async_trait]
pub trait PositionSource: Send + Sync + fmt::Debug {
    /// Fetch every position owned by `owner`, open or closed. Entries that
    /// fail to parse are returned in `skipped` rather than failing the fetch.
    async fn fetch_position_batch(&self, owner: &Address) -> Result<PositionBatch, DataSourceError>;

    async fn fetch_positions(&self, owner: &Address) -> Result<Vec<Position>, DataSourceError> {
        self.fetch_position_batch(owner)
            .await
            .map(|batch| batch.positions)
    }
}

/// Decoded aggregator swap records for a wallet.
#[async_trait]
pub trait SwapSource: Send + Sync + fmt::Debug {
    /// Fetch swap records from successful transactions sent by `owner`,
    /// starting at `from_block`, along with anything that failed to decode.
    async fn fetch_swaps(&self, owner: &Address, from_block: u64)
        -> Result<SwapBatch, DataSourceError>;

    async fn fetch_swap_records(
        &self,
        owner: &Address,
        from_block: u64,
    ) -> Result<Vec<SwapRecord>, DataSourceError> {
        self.fetch_swaps(owner, from_block)
            .await
            .map(|batch| batch.records)
    }
}

/// Historical prices of the volatile reference asset.
#[async_trait]
pub trait PriceSource: Send + Sync + fmt::Debug {
    /// Fetch a price series covering `[start, end]`, ascending by timestamp.
    async fn fetch_price_series(
        &self,
        symbol: &str,
        start: UnixSecs,
        end: UnixSecs,
        resolution: Resolution,
    ) -> Result<Vec<PricePoint>, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded (caller should implement backoff)
    RateLimited,
    /// Other error
    Other(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
            DataSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}

/// Log and describe an upstream entry that is being skipped.
pub(crate) fn skipped(source: RecordSource, record_id: String, error: &DataSourceError) -> DecodeIssue {
    warn!("Skipping upstream {:?} entry {}: {}", source, record_id, error);
    DecodeIssue {
        source,
        record_id,
        reason: error.to_string(),
    }
}
