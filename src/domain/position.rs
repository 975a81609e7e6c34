//! Liquidity positions as reported by the positions subgraph.

use super::{Address, TokenInfo, UnixSecs};
use serde::{Deserialize, Serialize};

/// A concentrated-liquidity position.
///
/// Amounts are raw integers in each token's smallest unit, exactly as the
/// upstream reports them; the normalizer converts them once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub owner: Address,
    /// Creation (mint) time.
    pub created_at: UnixSecs,
    pub token0: TokenInfo,
    pub token1: TokenInfo,
    pub tick_lower: i32,
    pub tick_upper: i32,
    /// Liquidity remaining in the position (raw integer).
    pub liquidity: String,
    pub deposited0: String,
    pub deposited1: String,
    pub withdrawn0: String,
    pub withdrawn1: String,
    pub collected_fees0: String,
    pub collected_fees1: String,
    /// Current token amounts, when the upstream exposes them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current0: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current1: Option<String>,
}

impl Position {
    /// Numeric token id, when the id is an NFT token number.
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.trim().parse().ok()
    }
}

/// Whether a position's capital is still deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Active,
    Closed,
}

/// How to classify a position that still holds liquidity but has already
/// had withdrawals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialWithdrawalPolicy {
    /// Any withdrawal marks the position closed.
    #[default]
    Closed,
    /// The position stays active until its liquidity reaches zero.
    Active,
}

impl PositionStatus {
    /// Classify a position from its exit activity and remaining liquidity.
    pub fn classify(
        has_withdrawal: bool,
        has_fees: bool,
        liquidity_is_zero: bool,
        policy: PartialWithdrawalPolicy,
    ) -> Self {
        if liquidity_is_zero && (has_withdrawal || has_fees) {
            return PositionStatus::Closed;
        }
        if !liquidity_is_zero && has_withdrawal && policy == PartialWithdrawalPolicy::Closed {
            return PositionStatus::Closed;
        }
        PositionStatus::Active
    }
}
