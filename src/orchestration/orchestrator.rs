use crate::config::Config;
use crate::datasource::{DataSourceError, PositionSource, PriceSource, SwapSource};
use crate::domain::{
    Address, AssetRegistry, Clock, Decimal, PartialWithdrawalPolicy, PnlReport, Position,
    Resolution, ReportDiagnostics, UnixSecs,
};
use crate::engine::{
    price_window, AggregateError, EventNormalizer, PnlAggregator, PriceIndex, SeedSwap,
    TimelineBuilder,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Report parameters that do not change between requests.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub price_symbol: String,
    pub price_resolution: Resolution,
    pub fallback_price: Decimal,
    pub swap_from_block: u64,
    pub partial_withdrawal_policy: PartialWithdrawalPolicy,
    pub min_position_id: Option<u64>,
    pub seed_swaps: Vec<SeedSwap>,
}

impl ReportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            price_symbol: config.price_symbol.clone(),
            price_resolution: config.price_resolution,
            fallback_price: config.fallback_price,
            swap_from_block: config.swap_from_block,
            partial_withdrawal_policy: config.partial_withdrawal_policy,
            min_position_id: config.min_position_id,
            seed_swaps: config.seed_swaps.clone(),
        }
    }
}

/// The collaborator a failed fetch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Positions,
    Swaps,
    Prices,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collaborator::Positions => write!(f, "position source"),
            Collaborator::Swaps => write!(f, "swap source"),
            Collaborator::Prices => write!(f, "price source"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{collaborator} failed: {error}")]
    Upstream {
        collaborator: Collaborator,
        #[source]
        error: DataSourceError,
    },
    #[error("report totals out of range: {0}")]
    OutOfRange(#[from] AggregateError),
}

impl ReportError {
    fn upstream(collaborator: Collaborator) -> impl FnOnce(DataSourceError) -> ReportError {
        move |error| ReportError::Upstream {
            collaborator,
            error,
        }
    }
}

/// Fetches a wallet's positions, swaps and prices and runs them through the
/// engine. Either source failing fails the whole report.
#[derive(Clone)]
pub struct ReportService {
    positions: Arc<dyn PositionSource>,
    swaps: Arc<dyn SwapSource>,
    prices: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    registry: Arc<AssetRegistry>,
    settings: ReportSettings,
}

impl ReportService {
    pub fn new(
        positions: Arc<dyn PositionSource>,
        swaps: Arc<dyn SwapSource>,
        prices: Arc<dyn PriceSource>,
        clock: Arc<dyn Clock>,
        registry: Arc<AssetRegistry>,
        settings: ReportSettings,
    ) -> Self {
        Self {
            positions,
            swaps,
            prices,
            clock,
            registry,
            settings,
        }
    }

    pub async fn build_report(&self, owner: &Address) -> Result<PnlReport, ReportError> {
        let now = self.clock.now();
        info!("Building PnL report for {}", owner);

        let (position_batch, swap_batch) = futures::try_join!(
            async {
                self.positions
                    .fetch_position_batch(owner)
                    .await
                    .map_err(ReportError::upstream(Collaborator::Positions))
            },
            async {
                self.swaps
                    .fetch_swaps(owner, self.settings.swap_from_block)
                    .await
                    .map_err(ReportError::upstream(Collaborator::Swaps))
            },
        )?;
        let mut rejected = position_batch.skipped;
        rejected.extend(swap_batch.skipped);
        let positions = self.filter_positions(position_batch.positions);
        let swaps = swap_batch.records;
        info!(
            "Fetched {} positions and {} swap records for {}",
            positions.len(),
            swaps.len(),
            owner
        );

        let normalizer =
            EventNormalizer::new(&self.registry, self.settings.partial_withdrawal_policy);
        let events = normalizer.normalize(&swaps, &positions, &self.settings.seed_swaps, now);
        rejected.extend(events.rejected);

        let (window_start, window_end) = price_window(&events.operations, now);
        let points = if events.operations.is_empty() {
            Vec::new()
        } else {
            // Pad by one candle so the first operation is bracketed.
            let fetch_start = UnixSecs::new(
                window_start
                    .as_i64()
                    .saturating_sub(self.settings.price_resolution.seconds()),
            );
            self.prices
                .fetch_price_series(
                    &self.settings.price_symbol,
                    fetch_start,
                    window_end,
                    self.settings.price_resolution,
                )
                .await
                .map_err(ReportError::upstream(Collaborator::Prices))?
        };
        let index = PriceIndex::new(points).with_fallback(self.settings.fallback_price);
        if index.is_degraded() && !events.operations.is_empty() {
            warn!(
                "No {} prices between {} and {}; valuing at fallback {}",
                self.settings.price_symbol, window_start, window_end, self.settings.fallback_price
            );
        }

        let (timeline, left_off) = TimelineBuilder::build_with_rejections(events.operations, &index);
        rejected.extend(left_off);
        if !rejected.is_empty() {
            warn!("{} records rejected for {}", rejected.len(), owner);
        }

        let diagnostics = ReportDiagnostics {
            rejected,
            price_window_start: window_start,
            price_window_end: window_end,
            price_points: index.len(),
            // Nothing was valued when the timeline is empty.
            price_fallback_used: index.is_degraded() && !timeline.is_empty(),
            generated_at: now,
        };
        let report = PnlAggregator::new(&index).aggregate(timeline, &events.positions, diagnostics)?;

        info!(
            "Report for {}: {} timeline entries, total profit {}",
            owner,
            report.timeline.len(),
            report.combined.total_profit
        );
        Ok(report)
    }

    /// Drop positions below the configured id floor. Ids that are not
    /// numeric are kept.
    fn filter_positions(&self, positions: Vec<Position>) -> Vec<Position> {
        let Some(min_id) = self.settings.min_position_id else {
            return positions;
        };
        positions
            .into_iter()
            .filter(|p| p.numeric_id().map_or(true, |id| id >= min_id))
            .collect()
    }
}
