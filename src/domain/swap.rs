//! Swap records decoded from aggregator `OrderRecord` events.

use super::{Address, UnixSecs};
use serde::{Deserialize, Serialize};

/// One decoded swap leg pair from a transaction receipt.
///
/// Amounts and gas figures stay string-encoded integers until normalization,
/// so one malformed record can be rejected without failing the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRecord {
    pub from_token: Address,
    pub to_token: Address,
    pub sender: Address,
    pub from_amount: String,
    pub return_amount: String,
    pub tx_hash: String,
    /// Position of the log within the receipt.
    pub log_index: u32,
    pub block_number: u64,
    pub timestamp: UnixSecs,
    pub gas_used: String,
    pub gas_price: String,
}

impl SwapRecord {
    /// Stable identifier of the record within the ledger.
    pub fn record_key(&self) -> String {
        format!("swap:{}:{}", self.tx_hash.to_ascii_lowercase(), self.log_index)
    }
}
