//! Mock data source for testing without network calls.

use super::{DataSourceError, PositionBatch, PositionSource, PriceSource, SwapBatch, SwapSource};
use crate::domain::{Address, DecodeIssue, Position, PricePoint, Resolution, SwapRecord, UnixSecs};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Mock data source that returns predefined test data for every source
/// trait. Each source can be made to fail independently.
#[derive(Debug, Clone, Default)]
pub struct MockDataSource {
    positions: Vec<Position>,
    swaps: Vec<SwapRecord>,
    prices: Vec<PricePoint>,
    skipped_positions: Vec<DecodeIssue>,
    skipped_swaps: Vec<DecodeIssue>,
    positions_error: Option<DataSourceError>,
    swaps_error: Option<DataSourceError>,
    prices_error: Option<DataSourceError>,
    price_calls: Arc<AtomicUsize>,
}

impl MockDataSource {
    /// Create a new mock data source with empty data.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.positions.push(position);
        self
    }

    pub fn with_positions(mut self, positions: Vec<Position>) -> Self {
        self.positions.extend(positions);
        self
    }

    pub fn with_swap(mut self, swap: SwapRecord) -> Self {
        self.swaps.push(swap);
        self
    }

    pub fn with_swaps(mut self, swaps: Vec<SwapRecord>) -> Self {
        self.swaps.extend(swaps);
        self
    }

    pub fn with_prices(mut self, prices: Vec<PricePoint>) -> Self {
        self.prices.extend(prices);
        self
    }

    /// Report `issue` as an upstream position entry that failed to parse.
    pub fn with_skipped_position(mut self, issue: DecodeIssue) -> Self {
        self.skipped_positions.push(issue);
        self
    }

    /// Report `issue` as an upstream swap entry that failed to decode.
    pub fn with_skipped_swap(mut self, issue: DecodeIssue) -> Self {
        self.skipped_swaps.push(issue);
        self
    }

    /// Make `fetch_position_batch` fail with `error`.
    pub fn with_positions_error(mut self, error: DataSourceError) -> Self {
        self.positions_error = Some(error);
        self
    }

    /// Make `fetch_swaps` fail with `error`.
    pub fn with_swaps_error(mut self, error: DataSourceError) -> Self {
        self.swaps_error = Some(error);
        self
    }

    /// Make `fetch_price_series` fail with `error`.
    pub fn with_prices_error(mut self, error: DataSourceError) -> Self {
        self.prices_error = Some(error);
        self
    }

    /// Number of `fetch_price_series` calls served so far, shared across clones.
    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PositionSource for MockDataSource {
    async fn fetch_position_batch(&self, owner: &Address) -> Result<PositionBatch, DataSourceError> {
        if let Some(err) = &self.positions_error {
            return Err(err.clone());
        }
        Ok(PositionBatch {
            positions: self
                .positions
                .iter()
                .filter(|p| &p.owner == owner)
                .cloned()
                .collect(),
            skipped: self.skipped_positions.clone(),
        })
    }
}

#[async_trait]
impl SwapSource for MockDataSource {
    async fn fetch_swaps(&self, owner: &Address, from_block: u64) -> Result<SwapBatch, DataSourceError> {
        if let Some(err) = &self.swaps_error {
            return Err(err.clone());
        }
        Ok(SwapBatch {
            records: self
                .swaps
                .iter()
                .filter(|s| &s.sender == owner && s.block_number >= from_block)
                .cloned()
                .collect(),
            skipped: self.skipped_swaps.clone(),
        })
    }
}

#[async_trait]
impl PriceSource for MockDataSource {
    async fn fetch_price_series(
        &self,
        _symbol: &str,
        start: UnixSecs,
        end: UnixSecs,
        _resolution: Resolution,
    ) -> Result<Vec<PricePoint>, DataSourceError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.prices_error {
            return Err(err.clone());
        }
        Ok(self
            .prices
            .iter()
            .filter(|p| p.timestamp >= start && p.timestamp <= end)
            .copied()
            .collect())
    }
}
