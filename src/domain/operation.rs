//! Ledger operations and the annotated timeline entries derived from them.

use super::{Decimal, UnixSecs};
use serde::{Deserialize, Serialize};

/// Kind of a ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Swap,
    PositionOpen,
    PositionClose,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Swap,
        OperationKind::PositionOpen,
        OperationKind::PositionClose,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Swap => "SWAP",
            OperationKind::PositionOpen => "POSITION_OPEN",
            OperationKind::PositionClose => "POSITION_CLOSE",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form payload carried alongside an operation. The timeline never
/// interprets it; the aggregator only reads `gas_cost`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<String>,
    /// Gas paid in native units (gas used x gas price).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_cost: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_range: Option<(i32, i32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawn_stable: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawn_volatile: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees_stable: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees_volatile: Option<Decimal>,
    /// For closes: when the position was opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_open_time: Option<UnixSecs>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub manual: bool,
}

/// One ledger entry before it is placed on the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub key: String,
    /// Economic effective time, not necessarily the block time.
    pub timestamp: UnixSecs,
    pub kind: OperationKind,
    pub description: String,
    /// Signed change of the stable asset (negative = outflow).
    pub stable_change: Decimal,
    /// Signed change of the volatile reference asset (negative = outflow).
    pub volatile_change: Decimal,
    pub details: OperationDetails,
}

impl Operation {
    pub fn new(
        key: impl Into<String>,
        timestamp: UnixSecs,
        kind: OperationKind,
        description: impl Into<String>,
        stable_change: Decimal,
        volatile_change: Decimal,
    ) -> Self {
        Self {
            key: key.into(),
            timestamp,
            kind,
            description: description.into(),
            stable_change,
            volatile_change,
            details: OperationDetails::default(),
        }
    }

    pub fn with_details(mut self, details: OperationDetails) -> Self {
        self.details = details;
        self
    }

    /// Key for manually entered operations, hashed from their fields so the
    /// same seed always yields the same key.
    pub fn manual_key(
        timestamp: UnixSecs,
        stable_change: &Decimal,
        volatile_change: &Decimal,
        label: &str,
    ) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(timestamp.as_i64().to_le_bytes());
        hasher.update(stable_change.to_canonical_string());
        hasher.update([0u8]);
        hasher.update(volatile_change.to_canonical_string());
        hasher.update([0u8]);
        hasher.update(label);
        let hash = hasher.finalize();
        format!("manual:{}", hex::encode(&hash[..8]))
    }
}

/// An operation placed on the timeline with its derived running balances and
/// mark-to-market valuation.
///
/// Derived fields are private: they are only ever produced by the timeline
/// builder from the ordered prefix of operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    #[serde(flatten)]
    operation: Operation,
    date: String,
    cumulative_stable: Decimal,
    cumulative_volatile: Decimal,
    reference_price: Decimal,
    total_usd_value: Decimal,
    avg_cost: Option<Decimal>,
}

impl TimelineEntry {
    /// Hands the operation back when the valuation overflows.
    pub(crate) fn derive(
        operation: Operation,
        cumulative_stable: Decimal,
        cumulative_volatile: Decimal,
        reference_price: Decimal,
    ) -> Result<Self, Operation> {
        let Some(total_usd_value) = cumulative_volatile
            .checked_mul(reference_price)
            .and_then(|volatile_value| cumulative_stable.checked_add(volatile_value))
        else {
            return Err(operation);
        };
        let date = operation.timestamp.to_utc_string();
        Ok(Self {
            total_usd_value,
            avg_cost: cumulative_stable.checked_ratio(cumulative_volatile),
            operation,
            date,
            cumulative_stable,
            cumulative_volatile,
            reference_price,
        })
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn into_operation(self) -> Operation {
        self.operation
    }

    pub fn timestamp(&self) -> UnixSecs {
        self.operation.timestamp
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn cumulative_stable(&self) -> Decimal {
        self.cumulative_stable
    }

    pub fn cumulative_volatile(&self) -> Decimal {
        self.cumulative_volatile
    }

    pub fn reference_price(&self) -> Decimal {
        self.reference_price
    }

    pub fn total_usd_value(&self) -> Decimal {
        self.total_usd_value
    }

    /// `|cumulative stable / cumulative volatile|`; `None` while the volatile
    /// balance is zero.
    pub fn avg_cost(&self) -> Option<Decimal> {
        self.avg_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&OperationKind::PositionClose).unwrap();
        assert_eq!(json, "\"POSITION_CLOSE\"");
    }

    #[test]
    fn test_manual_key_is_deterministic() {
        let a = Operation::manual_key(UnixSecs::new(100), &d("-76500"), &d("90"), "seed");
        let b = Operation::manual_key(UnixSecs::new(100), &d("-76500"), &d("90"), "seed");
        let c = Operation::manual_key(UnixSecs::new(101), &d("-76500"), &d("90"), "seed");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("manual:"));
    }

    #[test]
    fn test_entry_derives_value_and_avg_cost() {
        let op = Operation::new(
            "k",
            UnixSecs::new(0),
            OperationKind::Swap,
            "buy",
            d("-1000"),
            d("2"),
        );
        let entry = TimelineEntry::derive(op, d("-1000"), d("2"), d("600")).unwrap();
        assert_eq!(entry.total_usd_value(), d("200"));
        assert_eq!(entry.avg_cost(), Some(d("500")));
        assert_eq!(entry.date(), "1970-01-01 00:00:00");
    }

    #[test]
    fn test_entry_avg_cost_guarded_when_volatile_flat() {
        let op = Operation::new(
            "k",
            UnixSecs::new(0),
            OperationKind::Swap,
            "",
            d("10"),
            Decimal::zero(),
        );
        let entry = TimelineEntry::derive(op, d("10"), Decimal::zero(), d("600")).unwrap();
        assert_eq!(entry.avg_cost(), None);
        assert_eq!(entry.total_usd_value(), d("10"));
    }

    #[test]
    fn test_entry_valuation_overflow_returns_operation() {
        let op = Operation::new(
            "big",
            UnixSecs::new(0),
            OperationKind::PositionOpen,
            "",
            Decimal::zero(),
            d("-50000000000000000000000000000"),
        );
        let returned =
            TimelineEntry::derive(op.clone(), Decimal::zero(), op.volatile_change, d("2")).unwrap_err();
        assert_eq!(returned, op);
    }

    #[test]
    fn test_details_skip_empty_fields() {
        let json = serde_json::to_value(OperationDetails::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
