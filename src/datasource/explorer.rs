//! Aggregator swaps from a block explorer transaction list plus the
//! `OrderRecord` logs in each transaction's receipt.

use super::http::JsonClient;
use super::{skipped, DataSourceError, SwapBatch, SwapSource};
use crate::db::Repository;
use crate::domain::{Address, Clock, DecodeIssue, RecordSource, SwapRecord, UnixSecs};
use async_trait::async_trait;
use primitive_types::U256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// `keccak256("OrderRecord(address,address,address,uint256,uint256)")`.
pub const ORDER_RECORD_TOPIC: &str =
    "0x1bb43f2da90e35f7b0cf38521ca95a49e68eb42fac49924930a5bd73cdf7576c";

/// `txlist` page size.
const PAGE_SIZE: usize = 1000;

/// Five ABI words: fromToken, toToken, sender, fromAmount, returnAmount.
const ORDER_RECORD_WORDS: usize = 5;

#[derive(Debug, Clone)]
pub struct ExplorerSettings {
    pub api_url: String,
    pub api_key: String,
    pub chain_id: u64,
    /// Substring of the explorer's `functionName` that marks a swap.
    pub swap_method: String,
    /// Pause between uncached receipt requests.
    pub request_delay: Duration,
}

/// One transaction from the explorer's `txlist`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerTx {
    pub hash: String,
    pub block_number: u64,
    pub timestamp: UnixSecs,
    pub function_name: String,
    pub succeeded: bool,
    pub gas_used: String,
    pub gas_price: String,
}

/// Decoded payload of an `OrderRecord` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecordLog {
    pub from_token: Address,
    pub to_token: Address,
    pub sender: Address,
    pub from_amount: U256,
    pub return_amount: U256,
    pub log_index: u32,
}

#[derive(Clone)]
struct ReceiptCache {
    repo: Arc<Repository>,
    clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct ExplorerSwapSource {
    http: JsonClient,
    rpc_url: String,
    settings: ExplorerSettings,
    cache: Option<ReceiptCache>,
}

impl std::fmt::Debug for ExplorerSwapSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplorerSwapSource")
            .field("api_url", &self.settings.api_url)
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.settings.chain_id)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl ExplorerSwapSource {
    pub fn new(http: JsonClient, rpc_url: String, settings: ExplorerSettings) -> Self {
        Self {
            http,
            rpc_url,
            settings,
            cache: None,
        }
    }

    /// Persist receipts; they never change once mined.
    pub fn with_receipt_cache(mut self, repo: Arc<Repository>, clock: Arc<dyn Clock>) -> Self {
        self.cache = Some(ReceiptCache { repo, clock });
        self
    }

    async fn fetch_txlist(
        &self,
        owner: &Address,
        from_block: u64,
        skipped_out: &mut Vec<DecodeIssue>,
    ) -> Result<Vec<ExplorerTx>, DataSourceError> {
        let mut txs = Vec::new();
        let mut page = 1usize;
        loop {
            let query = [
                ("chainid", self.settings.chain_id.to_string()),
                ("module", "account".to_string()),
                ("action", "txlist".to_string()),
                ("address", owner.as_str().to_string()),
                ("startblock", from_block.to_string()),
                ("endblock", "99999999".to_string()),
                ("page", page.to_string()),
                ("offset", PAGE_SIZE.to_string()),
                ("sort", "asc".to_string()),
                ("apikey", self.settings.api_key.clone()),
            ];
            let response = self.http.get_json(&self.settings.api_url, &query).await?;
            let batch = explorer_result(&response)?;
            let batch_len = batch.len();
            parse_txlist_page(batch, page, &mut txs, skipped_out);
            if batch_len < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(txs)
    }

    async fn fetch_receipt(&self, tx_hash: &str) -> Result<serde_json::Value, DataSourceError> {
        let key = tx_hash.to_ascii_lowercase();
        if let Some(cache) = &self.cache {
            match cache.repo.get_receipt(&key).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(e) => warn!("Receipt cache read failed for {}: {}", key, e),
            }
        }

        tokio::time::sleep(self.settings.request_delay).await;
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getTransactionReceipt",
            "params": [tx_hash],
        });
        let response = self.http.post_json(&self.rpc_url, &payload).await?;
        if let Some(error) = response.get("error") {
            return Err(DataSourceError::Other(format!("rpc error: {}", error)));
        }
        let receipt = response
            .get("result")
            .filter(|r| !r.is_null())
            .cloned()
            .ok_or_else(|| {
                DataSourceError::ParseError(format!("No receipt for transaction {}", tx_hash))
            })?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache
                .repo
                .put_receipt(&key, &receipt, cache.clock.now())
                .await
            {
                warn!("Receipt cache write failed for {}: {}", key, e);
            }
        }
        Ok(receipt)
    }
}

#[async_trait]
impl SwapSource for ExplorerSwapSource {
    async fn fetch_swaps(
        &self,
        owner: &Address,
        from_block: u64,
    ) -> Result<SwapBatch, DataSourceError> {
        debug!("Fetching swap transactions for owner={}, from_block={}", owner, from_block);

        let mut batch = SwapBatch::default();
        let txs = self.fetch_txlist(owner, from_block, &mut batch.skipped).await?;
        let swaps: Vec<_> = txs
            .into_iter()
            .filter(|tx| tx.succeeded && tx.function_name.contains(&self.settings.swap_method))
            .collect();
        info!("Found {} swap transactions for {}", swaps.len(), owner);

        for tx in &swaps {
            let receipt = self.fetch_receipt(&tx.hash).await?;
            let logs = receipt
                .get("logs")
                .and_then(|v| v.as_array())
                .ok_or_else(|| {
                    DataSourceError::ParseError(format!("Receipt {} has no logs", tx.hash))
                })?;
            decode_receipt_logs(tx, logs, &mut batch);
        }

        debug!(
            "Decoded {} swap records for owner={} ({} skipped)",
            batch.records.len(),
            owner,
            batch.skipped.len()
        );
        Ok(batch)
    }
}

/// Parse one `txlist` page. Entries without a usable hash are identified by
/// page and position.
fn parse_txlist_page(
    page_json: &[serde_json::Value],
    page: usize,
    txs: &mut Vec<ExplorerTx>,
    skipped_out: &mut Vec<DecodeIssue>,
) {
    for (i, tx_json) in page_json.iter().enumerate() {
        match parse_tx(tx_json) {
            Ok(tx) => txs.push(tx),
            Err(e) => {
                let id = tx_json
                    .get("hash")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("txlist:{}:{}", page, i));
                skipped_out.push(skipped(RecordSource::Swap, id, &e));
            }
        }
    }
}

/// Turn the `OrderRecord` logs of one receipt into swap records.
fn decode_receipt_logs(tx: &ExplorerTx, logs: &[serde_json::Value], batch: &mut SwapBatch) {
    for (i, log) in logs.iter().enumerate().filter(|(_, log)| is_order_record(log)) {
        match decode_order_record(log) {
            Ok(order) => batch.records.push(SwapRecord {
                from_token: order.from_token,
                to_token: order.to_token,
                sender: order.sender,
                from_amount: order.from_amount.to_string(),
                return_amount: order.return_amount.to_string(),
                tx_hash: tx.hash.clone(),
                log_index: order.log_index,
                block_number: tx.block_number,
                timestamp: tx.timestamp,
                gas_used: tx.gas_used.clone(),
                gas_price: tx.gas_price.clone(),
            }),
            Err(e) => batch.skipped.push(skipped(
                RecordSource::Swap,
                format!("{}#log{}", tx.hash, i),
                &e,
            )),
        }
    }
}

/// Unwrap the explorer's `{status, message, result}` envelope.
fn explorer_result(response: &serde_json::Value) -> Result<&Vec<serde_json::Value>, DataSourceError> {
    static EMPTY: Vec<serde_json::Value> = Vec::new();

    let status = response.get("status").and_then(|v| v.as_str()).unwrap_or("");
    let message = response.get("message").and_then(|v| v.as_str()).unwrap_or("");
    if let Some(result) = response.get("result").and_then(|v| v.as_array()) {
        if status == "1" || result.is_empty() {
            return Ok(result);
        }
    }
    if message.starts_with("No transactions found") {
        return Ok(&EMPTY);
    }
    let detail = response
        .get("result")
        .and_then(|v| v.as_str())
        .unwrap_or(message);
    if detail.to_ascii_lowercase().contains("rate limit") {
        return Err(DataSourceError::RateLimited);
    }
    Err(DataSourceError::Other(format!("explorer error: {}", detail)))
}

fn str_field<'a>(json: &'a serde_json::Value, field: &str) -> Result<&'a str, DataSourceError> {
    json.get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| DataSourceError::ParseError(format!("Missing {} field", field)))
}

fn parse_tx(json: &serde_json::Value) -> Result<ExplorerTx, DataSourceError> {
    let hash = str_field(json, "hash")?.to_string();
    let block_number = str_field(json, "blockNumber")?
        .parse::<u64>()
        .map_err(|e| DataSourceError::ParseError(format!("Invalid blockNumber: {}", e)))?;
    let timestamp = str_field(json, "timeStamp")?
        .parse::<i64>()
        .map_err(|e| DataSourceError::ParseError(format!("Invalid timeStamp: {}", e)))?;
    let is_error = json.get("isError").and_then(|v| v.as_str()).unwrap_or("0");
    let receipt_status = json
        .get("txreceipt_status")
        .and_then(|v| v.as_str())
        .unwrap_or("1");

    Ok(ExplorerTx {
        hash,
        block_number,
        timestamp: UnixSecs::new(timestamp),
        function_name: json
            .get("functionName")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        succeeded: is_error == "0" && receipt_status == "1",
        gas_used: str_field(json, "gasUsed")?.to_string(),
        gas_price: str_field(json, "gasPrice")?.to_string(),
    })
}

fn is_order_record(log: &serde_json::Value) -> bool {
    log.get("topics")
        .and_then(|t| t.as_array())
        .and_then(|t| t.first())
        .and_then(|t| t.as_str())
        .map(|topic| topic.eq_ignore_ascii_case(ORDER_RECORD_TOPIC))
        .unwrap_or(false)
}

/// Decode the non-indexed `OrderRecord` fields from a receipt log.
pub fn decode_order_record(log: &serde_json::Value) -> Result<OrderRecordLog, DataSourceError> {
    let data = str_field(log, "data")?;
    let bytes = hex::decode(data.trim_start_matches("0x"))
        .map_err(|e| DataSourceError::ParseError(format!("Invalid log data: {}", e)))?;
    if bytes.len() < ORDER_RECORD_WORDS * 32 {
        return Err(DataSourceError::ParseError(format!(
            "Log data too short: {} bytes",
            bytes.len()
        )));
    }
    let word = |i: usize| &bytes[i * 32..(i + 1) * 32];
    let address = |i: usize| Address::new(format!("0x{}", hex::encode(&word(i)[12..])));

    let log_index = str_field(log, "logIndex")?;
    let log_index = u32::from_str_radix(log_index.trim_start_matches("0x"), 16)
        .map_err(|e| DataSourceError::ParseError(format!("Invalid logIndex: {}", e)))?;

    Ok(OrderRecordLog {
        from_token: address(0),
        to_token: address(1),
        sender: address(2),
        from_amount: U256::from_big_endian(word(3)),
        return_amount: U256::from_big_endian(word(4)),
        log_index,
    })
}
