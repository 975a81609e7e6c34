//! Summaries over a finished timeline.

use crate::domain::{
    CombinedSummary, Decimal, KindBreakdown, OperationKind, PnlReport, PositionStatus,
    PositionSummary, ReportDiagnostics, SwapSummary, TimelineEntry, TrendStats,
    UnrealizedPosition,
};
use thiserror::Error;

use super::{PositionLedger, PriceIndex};

/// A summary figure left the decimal range. Per-record overflow is caught
/// earlier; this only fires when many in-range records add up past it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("{0} overflows the decimal range")]
    Overflow(&'static str),
}

type Result<T> = std::result::Result<T, AggregateError>;

fn add(acc: Decimal, rhs: Decimal, what: &'static str) -> Result<Decimal> {
    acc.checked_add(rhs).ok_or(AggregateError::Overflow(what))
}

fn sub(acc: Decimal, rhs: Decimal, what: &'static str) -> Result<Decimal> {
    acc.checked_sub(rhs).ok_or(AggregateError::Overflow(what))
}

/// `stable + volatile x price`.
fn value_at(stable: Decimal, volatile: Decimal, price: Decimal, what: &'static str) -> Result<Decimal> {
    volatile
        .checked_mul(price)
        .and_then(|v| stable.checked_add(v))
        .ok_or(AggregateError::Overflow(what))
}

/// Produces the report sections. Every figure is derived from the timeline
/// and the position ledgers it is given; nothing is fetched here.
pub struct PnlAggregator<'a> {
    index: &'a PriceIndex,
}

impl<'a> PnlAggregator<'a> {
    pub fn new(index: &'a PriceIndex) -> Self {
        Self { index }
    }

    /// Price used for the current-value figures: the latest sample.
    pub fn current_price(&self) -> Decimal {
        self.index.latest()
    }

    pub fn aggregate(
        &self,
        timeline: Vec<TimelineEntry>,
        positions: &[PositionLedger],
        diagnostics: ReportDiagnostics,
    ) -> Result<PnlReport> {
        let swap_summary = self.swap_summary(&timeline)?;
        let position_summary = self.position_summary(positions)?;
        let combined = self.combined(&swap_summary, &position_summary, &timeline)?;
        let trend = self.trend(&timeline, &combined)?;
        let breakdown = breakdown(&timeline)?;

        Ok(PnlReport {
            swap_summary,
            position_summary,
            combined,
            trend,
            breakdown,
            timeline,
            diagnostics,
        })
    }

    pub fn swap_summary(&self, timeline: &[TimelineEntry]) -> Result<SwapSummary> {
        let mut summary = SwapSummary::default();
        for entry in timeline.iter().filter(|e| e.kind() == OperationKind::Swap) {
            let op = entry.operation();
            summary.net_stable = add(summary.net_stable, op.stable_change, "swap net stable")?;
            summary.net_volatile =
                add(summary.net_volatile, op.volatile_change, "swap net volatile")?;
            summary.transaction_count += 1;
            if op.details.manual {
                summary.manual_count += 1;
            }
            if let Some(gas) = op.details.gas_cost {
                summary.total_gas_cost = add(summary.total_gas_cost, gas, "swap gas cost")?;
            }
        }
        summary.avg_price = summary.net_stable.checked_ratio(summary.net_volatile);
        Ok(summary)
    }

    /// Realized flows and fees come from closed positions only; active
    /// positions are valued at the current price instead.
    pub fn position_summary(&self, positions: &[PositionLedger]) -> Result<PositionSummary> {
        const NET: &str = "position net";
        let price = self.current_price();
        let mut summary = PositionSummary::default();

        for ledger in positions {
            match ledger.status {
                PositionStatus::Closed => {
                    summary.closed_positions += 1;
                    let net_stable = ledger.net_stable().ok_or(AggregateError::Overflow(NET))?;
                    let net_volatile =
                        ledger.net_volatile().ok_or(AggregateError::Overflow(NET))?;
                    summary.net_stable = add(summary.net_stable, net_stable, NET)?;
                    summary.net_volatile = add(summary.net_volatile, net_volatile, NET)?;
                    summary.total_fees_stable =
                        add(summary.total_fees_stable, ledger.fees_stable, "position fees")?;
                    summary.total_fees_volatile =
                        add(summary.total_fees_volatile, ledger.fees_volatile, "position fees")?;
                }
                PositionStatus::Active => {
                    summary.active_positions += 1;
                    let unrealized = unrealized(ledger, price)?;
                    summary.total_unrealized_pnl = add(
                        summary.total_unrealized_pnl,
                        unrealized.unrealized_pnl,
                        "unrealized pnl",
                    )?;
                    summary.unrealized.push(unrealized);
                }
            }
        }

        summary.avg_price = summary.net_stable.checked_ratio(summary.net_volatile);
        Ok(summary)
    }

    /// Swap nets plus closed-position nets, valued at the current price.
    /// Capital still deployed in active positions is not counted here; it
    /// shows up in the position summary's unrealized figures.
    pub fn combined(
        &self,
        swaps: &SwapSummary,
        positions: &PositionSummary,
        timeline: &[TimelineEntry],
    ) -> Result<CombinedSummary> {
        let price = self.current_price();
        let net_stable = add(swaps.net_stable, positions.net_stable, "combined net stable")?;
        let net_volatile =
            add(swaps.net_volatile, positions.net_volatile, "combined net volatile")?;
        let total_gas_cost = timeline
            .iter()
            .filter_map(|e| e.operation().details.gas_cost)
            .try_fold(Decimal::zero(), |acc, gas| add(acc, gas, "gas cost"))?;

        Ok(CombinedSummary {
            net_stable,
            net_volatile,
            avg_price: net_stable.checked_ratio(net_volatile),
            current_reference_price: price,
            total_profit: value_at(net_stable, net_volatile, price, "total profit")?,
            total_gas_cost,
        })
    }

    /// `None` for an empty timeline.
    pub fn trend(
        &self,
        timeline: &[TimelineEntry],
        combined: &CombinedSummary,
    ) -> Result<Option<TrendStats>> {
        let (Some(first), Some(last)) = (timeline.first(), timeline.last()) else {
            return Ok(None);
        };

        let mut peak = first;
        let mut trough = first;
        for entry in timeline {
            // Strict comparisons keep the earliest occurrence.
            if entry.total_usd_value() > peak.total_usd_value() {
                peak = entry;
            }
            if entry.total_usd_value() < trough.total_usd_value() {
                trough = entry;
            }
        }

        let initial_value = first.total_usd_value();
        let final_value = last.total_usd_value();
        let total_pnl = sub(final_value, initial_value, "trend pnl")?;
        let roi = if initial_value.is_zero() {
            None
        } else {
            total_pnl.checked_div(initial_value.abs())
        };
        let current_market_value = combined.total_profit;

        Ok(Some(TrendStats {
            initial_value,
            final_value,
            max_value: peak.total_usd_value(),
            min_value: trough.total_usd_value(),
            total_pnl,
            max_drawdown: sub(peak.total_usd_value(), trough.total_usd_value(), "max drawdown")?,
            roi,
            peak_at: peak.timestamp(),
            trough_at: trough.timestamp(),
            current_market_value,
            unrealized_pnl: sub(current_market_value, final_value, "trend unrealized pnl")?,
        }))
    }
}

/// Count and net impact per operation kind, in a fixed kind order. Kinds
/// with no operations are omitted.
pub fn breakdown(timeline: &[TimelineEntry]) -> Result<Vec<KindBreakdown>> {
    let mut rows = Vec::new();
    for kind in OperationKind::ALL {
        let mut row = KindBreakdown {
            kind,
            count: 0,
            stable_impact: Decimal::zero(),
            volatile_impact: Decimal::zero(),
        };
        for entry in timeline.iter().filter(|e| e.kind() == kind) {
            row.count += 1;
            row.stable_impact = add(row.stable_impact, entry.operation().stable_change, "breakdown")?;
            row.volatile_impact =
                add(row.volatile_impact, entry.operation().volatile_change, "breakdown")?;
        }
        if row.count > 0 {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Current value minus deposited value, both at `price`. Without reported
/// current amounts the position is assumed to hold deposits less withdrawals.
fn unrealized(ledger: &PositionLedger, price: Decimal) -> Result<UnrealizedPosition> {
    const WHAT: &str = "unrealized pnl";
    let current_stable = match ledger.current_stable {
        Some(amount) => amount,
        None => sub(ledger.deposited_stable, ledger.withdrawn_stable, WHAT)?,
    };
    let current_volatile = match ledger.current_volatile {
        Some(amount) => amount,
        None => sub(ledger.deposited_volatile, ledger.withdrawn_volatile, WHAT)?,
    };
    let current_value = value_at(current_stable, current_volatile, price, WHAT)?;
    let deposited_value =
        value_at(ledger.deposited_stable, ledger.deposited_volatile, price, WHAT)?;

    Ok(UnrealizedPosition {
        position_id: ledger.position_id.clone(),
        current_stable,
        current_volatile,
        deposited_stable: ledger.deposited_stable,
        deposited_volatile: ledger.deposited_volatile,
        unrealized_pnl: sub(current_value, deposited_value, WHAT)?,
    })
}
