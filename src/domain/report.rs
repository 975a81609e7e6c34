//! The PnL report handed to presentation layers.

use super::{Decimal, OperationKind, TimelineEntry, UnixSecs};
use serde::Serialize;

/// Net flows restricted to swap operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapSummary {
    pub net_stable: Decimal,
    pub net_volatile: Decimal,
    /// `|net stable / net volatile|`, `null` when no volatile moved.
    pub avg_price: Option<Decimal>,
    pub transaction_count: usize,
    /// Seeded operations included in the nets above.
    pub manual_count: usize,
    /// Gas paid in native units.
    pub total_gas_cost: Decimal,
}

/// Mark-to-market estimate for a position that is still active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnrealizedPosition {
    pub position_id: String,
    pub current_stable: Decimal,
    pub current_volatile: Decimal,
    pub deposited_stable: Decimal,
    pub deposited_volatile: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Realized flows of closed positions plus unrealized estimates of active ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSummary {
    pub net_stable: Decimal,
    pub net_volatile: Decimal,
    pub avg_price: Option<Decimal>,
    pub total_fees_stable: Decimal,
    pub total_fees_volatile: Decimal,
    pub closed_positions: usize,
    pub active_positions: usize,
    pub unrealized: Vec<UnrealizedPosition>,
    pub total_unrealized_pnl: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedSummary {
    pub net_stable: Decimal,
    pub net_volatile: Decimal,
    pub avg_price: Option<Decimal>,
    pub current_reference_price: Decimal,
    /// `net stable + net volatile x current reference price`.
    pub total_profit: Decimal,
    pub total_gas_cost: Decimal,
}

/// Statistics over the `totalUsdValue` series of the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendStats {
    pub initial_value: Decimal,
    pub final_value: Decimal,
    pub max_value: Decimal,
    pub min_value: Decimal,
    pub total_pnl: Decimal,
    /// `max - min` over the whole series; not a peak-to-trough drawdown.
    pub max_drawdown: Decimal,
    /// `(final - initial) / |initial|`, `null` when the initial value is zero.
    pub roi: Option<Decimal>,
    pub peak_at: UnixSecs,
    pub trough_at: UnixSecs,
    pub current_market_value: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Count and net impact of one operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindBreakdown {
    pub kind: OperationKind,
    pub count: usize,
    pub stable_impact: Decimal,
    pub volatile_impact: Decimal,
}

/// Where a rejected record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Swap,
    Position,
    Seed,
}

/// A single upstream record that could not be normalized and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeIssue {
    pub source: RecordSource,
    pub record_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDiagnostics {
    pub rejected: Vec<DecodeIssue>,
    pub price_window_start: UnixSecs,
    pub price_window_end: UnixSecs,
    pub price_points: usize,
    /// The price series was empty and the fallback constant was used.
    pub price_fallback_used: bool,
    pub generated_at: UnixSecs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlReport {
    pub swap_summary: SwapSummary,
    pub position_summary: PositionSummary,
    pub combined: CombinedSummary,
    pub trend: Option<TrendStats>,
    pub breakdown: Vec<KindBreakdown>,
    pub timeline: Vec<TimelineEntry>,
    pub diagnostics: ReportDiagnostics,
}
