//! Converts swap records and positions into ledger operations.
//!
//! Raw integer amounts are converted to display decimals here and nowhere
//! else. A record that cannot be converted is rejected on its own and
//! reported; the rest of the batch still goes through.

use std::collections::HashSet;

use crate::domain::{
    AssetRegistry, AssetRole, DecodeIssue, Decimal, Operation, OperationDetails, OperationKind,
    PartialWithdrawalPolicy, Position, PositionStatus, RawAmount, RecordSource, SwapRecord,
    UnixSecs,
};
use tracing::warn;

/// Decimals of the chain's native gas token.
const NATIVE_DECIMALS: u8 = 18;

/// A manually entered opening trade, e.g. capital acquired before the
/// tracked window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSwap {
    pub timestamp: UnixSecs,
    pub stable_change: Decimal,
    pub volatile_change: Decimal,
    pub label: String,
}

/// Per-position amounts oriented onto the tracked pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionLedger {
    pub position_id: String,
    pub created_at: UnixSecs,
    pub status: PositionStatus,
    pub tick_range: (i32, i32),
    pub deposited_stable: Decimal,
    pub deposited_volatile: Decimal,
    pub withdrawn_stable: Decimal,
    pub withdrawn_volatile: Decimal,
    pub fees_stable: Decimal,
    pub fees_volatile: Decimal,
    pub current_stable: Option<Decimal>,
    pub current_volatile: Option<Decimal>,
}

impl PositionLedger {
    pub fn has_deposit(&self) -> bool {
        self.deposited_stable.is_positive() || self.deposited_volatile.is_positive()
    }

    pub fn has_exit(&self) -> bool {
        self.withdrawn_stable.is_positive()
            || self.withdrawn_volatile.is_positive()
            || self.fees_stable.is_positive()
            || self.fees_volatile.is_positive()
    }

    /// Withdrawals plus fees, stable leg. `None` on overflow.
    pub fn inflow_stable(&self) -> Option<Decimal> {
        self.withdrawn_stable.checked_add(self.fees_stable)
    }

    pub fn inflow_volatile(&self) -> Option<Decimal> {
        self.withdrawn_volatile.checked_add(self.fees_volatile)
    }

    /// Withdrawals plus fees minus deposits, stable leg.
    pub fn net_stable(&self) -> Option<Decimal> {
        self.inflow_stable()?.checked_sub(self.deposited_stable)
    }

    pub fn net_volatile(&self) -> Option<Decimal> {
        self.inflow_volatile()?.checked_sub(self.deposited_volatile)
    }
}

/// Output of one normalization run.
#[derive(Debug, Clone, Default)]
pub struct NormalizedEvents {
    /// Unordered; the timeline builder is the single ordering authority.
    pub operations: Vec<Operation>,
    pub positions: Vec<PositionLedger>,
    pub rejected: Vec<DecodeIssue>,
}

pub struct EventNormalizer<'a> {
    registry: &'a AssetRegistry,
    policy: PartialWithdrawalPolicy,
}

impl<'a> EventNormalizer<'a> {
    pub fn new(registry: &'a AssetRegistry, policy: PartialWithdrawalPolicy) -> Self {
        Self { registry, policy }
    }

    /// Normalize every source into one flat list of operations.
    ///
    /// `now` anchors the close of the most recent position.
    pub fn normalize(
        &self,
        swaps: &[SwapRecord],
        positions: &[Position],
        seeds: &[SeedSwap],
        now: UnixSecs,
    ) -> NormalizedEvents {
        let mut out = NormalizedEvents::default();

        out.operations.extend(seeds.iter().map(seed_operation));

        let mut gas_charged: HashSet<String> = HashSet::new();
        for record in swaps {
            match self.normalize_swap(record) {
                Ok(mut op) => {
                    // Gas is paid per transaction, not per decoded log.
                    if !gas_charged.insert(record.tx_hash.to_ascii_lowercase()) {
                        op.details.gas_cost = None;
                    }
                    out.operations.push(op);
                }
                Err(reason) => out.rejected.push(reject(
                    RecordSource::Swap,
                    record.record_key(),
                    reason,
                )),
            }
        }

        let mut ledgers = Vec::with_capacity(positions.len());
        for position in positions {
            match self.position_ledger(position) {
                Ok(ledger) => ledgers.push(ledger),
                Err(reason) => out.rejected.push(reject(
                    RecordSource::Position,
                    position.id.clone(),
                    reason,
                )),
            }
        }
        ledgers.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| position_order_key(&a.position_id).cmp(&position_order_key(&b.position_id)))
        });

        for (i, ledger) in ledgers.iter().enumerate() {
            if ledger.has_deposit() {
                out.operations.push(self.open_operation(ledger));
            }
            if ledger.has_exit() {
                // Upstream does not expose the withdrawal time; the next
                // position's open stands in for when the capital was redeployed.
                let close_at = ledgers
                    .get(i + 1)
                    .map(|next| next.created_at)
                    .unwrap_or(now);
                match self.close_operation(ledger, close_at) {
                    Ok(op) => out.operations.push(op),
                    Err(reason) => out.rejected.push(reject(
                        RecordSource::Position,
                        format!("close:{}", ledger.position_id),
                        reason,
                    )),
                }
            }
        }

        out.positions = ledgers;
        out
    }

    /// Convert one swap record. Legs in untracked tokens contribute nothing
    /// to the balances but the swap is still emitted.
    pub fn normalize_swap(&self, record: &SwapRecord) -> Result<Operation, String> {
        let from_role = self.registry.role_of(&record.from_token);
        let to_role = self.registry.role_of(&record.to_token);

        let from_amount = self.display_amount(&record.from_amount, &record.from_token, "fromAmount")?;
        let return_amount =
            self.display_amount(&record.return_amount, &record.to_token, "returnAmount")?;

        // Both legs can land on the same role, e.g. USDT -> USDT.
        let mut stable_change = Decimal::zero();
        let mut volatile_change = Decimal::zero();
        match from_role {
            AssetRole::Stable => stable_change = -from_amount,
            AssetRole::VolatileReference => volatile_change = -from_amount,
            AssetRole::Other => {}
        }
        let leg = match to_role {
            AssetRole::Stable => Some(&mut stable_change),
            AssetRole::VolatileReference => Some(&mut volatile_change),
            AssetRole::Other => None,
        };
        if let Some(change) = leg {
            *change = change
                .checked_add(return_amount)
                .ok_or_else(|| "returnAmount: balance change overflows".to_string())?;
        }

        let description = self.swap_description(record, from_role, to_role, from_amount, return_amount);
        let details = OperationDetails {
            tx_hash: Some(record.tx_hash.clone()),
            gas_used: Some(record.gas_used.clone()),
            gas_cost: gas_cost(record),
            ..OperationDetails::default()
        };

        Ok(Operation::new(
            record.record_key(),
            record.timestamp,
            OperationKind::Swap,
            description,
            stable_change,
            volatile_change,
        )
        .with_details(details))
    }

    fn display_amount(
        &self,
        raw: &str,
        token: &crate::domain::Address,
        field: &str,
    ) -> Result<Decimal, String> {
        let decimals = self.registry.decimals_of(token);
        RawAmount::parse(raw)
            .and_then(|amount| amount.to_decimal(decimals))
            .map_err(|e| format!("{}: {}", field, e))
    }

    fn swap_description(
        &self,
        record: &SwapRecord,
        from_role: AssetRole,
        to_role: AssetRole,
        from_amount: Decimal,
        return_amount: Decimal,
    ) -> String {
        let stable = self.registry.stable_symbol();
        let volatile = self.registry.volatile_symbol();
        match (from_role, to_role) {
            (AssetRole::Stable, AssetRole::VolatileReference) => format!(
                "BUY {}: {} {} → {} {}",
                volatile,
                from_amount.to_fixed(2),
                stable,
                return_amount.to_fixed(6),
                volatile
            ),
            (AssetRole::VolatileReference, AssetRole::Stable) => format!(
                "SELL {}: {} {} → {} {}",
                volatile,
                from_amount.to_fixed(6),
                volatile,
                return_amount.to_fixed(2),
                stable
            ),
            (_, AssetRole::VolatileReference) => format!(
                "BUY {}: +{} {} (from {})",
                volatile,
                return_amount.to_fixed(6),
                volatile,
                record.from_token.short()
            ),
            (AssetRole::VolatileReference, _) => format!(
                "SELL {}: {} {} (to {})",
                volatile,
                from_amount.to_fixed(6),
                volatile,
                record.to_token.short()
            ),
            _ => format!(
                "SWAP: {} → {}",
                record.from_token.short(),
                record.to_token.short()
            ),
        }
    }

    /// Orient a position's token0/token1 amounts onto stable/volatile.
    pub fn position_ledger(&self, position: &Position) -> Result<PositionLedger, String> {
        let role0 = self
            .registry
            .resolve(&position.token0.address, Some(&position.token0.symbol));
        let role1 = self
            .registry
            .resolve(&position.token1.address, Some(&position.token1.symbol));
        let stable_is_token0 = match (role0, role1) {
            (AssetRole::Stable, AssetRole::VolatileReference) => true,
            (AssetRole::VolatileReference, AssetRole::Stable) => false,
            _ => {
                return Err(format!(
                    "pool {}/{} is not the tracked pair",
                    position.token0.symbol, position.token1.symbol
                ))
            }
        };

        let d0 = position.token0.decimals;
        let d1 = position.token1.decimals;
        let convert = |raw: &str, decimals: u8, field: &str| {
            RawAmount::parse(raw)
                .and_then(|a| a.to_decimal(decimals))
                .map_err(|e| format!("{}: {}", field, e))
        };
        let pair = |raw0: &str, raw1: &str, field: &str| -> Result<(Decimal, Decimal), String> {
            let a0 = convert(raw0, d0, format!("{}0", field).as_str())?;
            let a1 = convert(raw1, d1, format!("{}1", field).as_str())?;
            Ok(if stable_is_token0 { (a0, a1) } else { (a1, a0) })
        };

        let (deposited_stable, deposited_volatile) =
            pair(&position.deposited0, &position.deposited1, "deposited")?;
        let (withdrawn_stable, withdrawn_volatile) =
            pair(&position.withdrawn0, &position.withdrawn1, "withdrawn")?;
        let (fees_stable, fees_volatile) =
            pair(&position.collected_fees0, &position.collected_fees1, "collectedFees")?;
        let (current_stable, current_volatile) = match (&position.current0, &position.current1) {
            (Some(c0), Some(c1)) => {
                let (s, v) = pair(c0, c1, "current")?;
                (Some(s), Some(v))
            }
            _ => (None, None),
        };

        let liquidity = RawAmount::parse(&position.liquidity)
            .map_err(|e| format!("liquidity: {}", e))?;
        let has_withdrawal = withdrawn_stable.is_positive() || withdrawn_volatile.is_positive();
        let has_fees = fees_stable.is_positive() || fees_volatile.is_positive();
        let status =
            PositionStatus::classify(has_withdrawal, has_fees, liquidity.is_zero(), self.policy);

        let ledger = PositionLedger {
            position_id: position.id.clone(),
            created_at: position.created_at,
            status,
            tick_range: (position.tick_lower, position.tick_upper),
            deposited_stable,
            deposited_volatile,
            withdrawn_stable,
            withdrawn_volatile,
            fees_stable,
            fees_volatile,
            current_stable,
            current_volatile,
        };
        if ledger.net_stable().is_none() || ledger.net_volatile().is_none() {
            return Err("position net overflows".to_string());
        }
        Ok(ledger)
    }

    fn open_operation(&self, ledger: &PositionLedger) -> Operation {
        let description = format!(
            "OPEN LP #{}: -{} {}, -{} {}",
            ledger.position_id,
            ledger.deposited_stable.to_fixed(2),
            self.registry.stable_symbol(),
            ledger.deposited_volatile.to_fixed(6),
            self.registry.volatile_symbol()
        );
        Operation::new(
            format!("open:{}", ledger.position_id),
            ledger.created_at,
            OperationKind::PositionOpen,
            description,
            -ledger.deposited_stable,
            -ledger.deposited_volatile,
        )
        .with_details(OperationDetails {
            position_id: Some(ledger.position_id.clone()),
            tick_range: Some(ledger.tick_range),
            ..OperationDetails::default()
        })
    }

    /// Fees are folded into the close inflow; the split stays in `details`.
    fn close_operation(
        &self,
        ledger: &PositionLedger,
        close_at: UnixSecs,
    ) -> Result<Operation, String> {
        let (Some(stable_in), Some(volatile_in)) = (ledger.inflow_stable(), ledger.inflow_volatile())
        else {
            return Err("close inflow overflows".to_string());
        };
        let description = format!(
            "CLOSE LP #{}: +{} {}, +{} {} (fees: {}/{})",
            ledger.position_id,
            stable_in.to_fixed(2),
            self.registry.stable_symbol(),
            volatile_in.to_fixed(6),
            self.registry.volatile_symbol(),
            ledger.fees_stable.to_fixed(2),
            ledger.fees_volatile.to_fixed(6)
        );
        Ok(Operation::new(
            format!("close:{}", ledger.position_id),
            close_at,
            OperationKind::PositionClose,
            description,
            stable_in,
            volatile_in,
        )
        .with_details(OperationDetails {
            position_id: Some(ledger.position_id.clone()),
            tick_range: Some(ledger.tick_range),
            withdrawn_stable: Some(ledger.withdrawn_stable),
            withdrawn_volatile: Some(ledger.withdrawn_volatile),
            fees_stable: Some(ledger.fees_stable),
            fees_volatile: Some(ledger.fees_volatile),
            original_open_time: Some(ledger.created_at),
            ..OperationDetails::default()
        }))
    }
}

/// Build the operation for a manually seeded trade.
pub fn seed_operation(seed: &SeedSwap) -> Operation {
    let description = if seed.label.is_empty() {
        format!(
            "Manual: {} stable, {} volatile",
            seed.stable_change.to_fixed(2),
            seed.volatile_change.to_fixed(6)
        )
    } else {
        format!("Manual: {}", seed.label)
    };
    Operation::new(
        Operation::manual_key(
            seed.timestamp,
            &seed.stable_change,
            &seed.volatile_change,
            &seed.label,
        ),
        seed.timestamp,
        OperationKind::Swap,
        description,
        seed.stable_change,
        seed.volatile_change,
    )
    .with_details(OperationDetails {
        manual: true,
        ..OperationDetails::default()
    })
}

/// Gas cost in native units; `None` when either figure is unparseable.
fn gas_cost(record: &SwapRecord) -> Option<Decimal> {
    let used = RawAmount::parse(&record.gas_used).ok()?;
    let price = RawAmount::parse(&record.gas_price).ok()?;
    used.checked_mul(price)?.to_decimal(NATIVE_DECIMALS).ok()
}

/// Numeric ids order numerically, anything else after them lexically.
fn position_order_key(id: &str) -> (u8, u64, &str) {
    match id.parse::<u64>() {
        Ok(n) => (0, n, ""),
        Err(_) => (1, 0, id),
    }
}

fn reject(source: RecordSource, record_id: String, reason: String) -> DecodeIssue {
    warn!("Skipping {:?} record {}: {}", source, record_id, reason);
    DecodeIssue {
        source,
        record_id,
        reason,
    }
}
