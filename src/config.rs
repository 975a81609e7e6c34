use crate::datasource::binance::DEFAULT_KLINES_URL;
use crate::domain::{
    Address, AssetRegistry, Decimal, PartialWithdrawalPolicy, Resolution, TokenInfo, UnixSecs,
};
use crate::engine::{SeedSwap, DEFAULT_FALLBACK_PRICE};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_EXPLORER_API_URL: &str = "https://api.etherscan.io/v2/api";
const DEFAULT_STABLE_TOKENS: &str = "0x55d398326f99059ff775485246999027b3197955:USDT:18";
const DEFAULT_VOLATILE_TOKENS: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee:BNB:18,\
0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c:WBNB:18";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub subgraph_url: String,
    pub subgraph_api_key: Option<String>,
    pub explorer_api_url: String,
    pub explorer_api_key: String,
    pub rpc_url: String,
    pub chain_id: u64,
    pub swap_method: String,
    pub swap_from_block: u64,
    pub stable_tokens: Vec<TokenInfo>,
    pub volatile_tokens: Vec<TokenInfo>,
    pub price_api_url: String,
    pub price_symbol: String,
    pub price_resolution: Resolution,
    pub fallback_price: Decimal,
    pub price_cache_max_age: Duration,
    pub request_delay: Duration,
    pub partial_withdrawal_policy: PartialWithdrawalPolicy,
    /// Positions with a lower numeric id are ignored.
    pub min_position_id: Option<u64>,
    pub seed_swaps: Vec<SeedSwap>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", 8080u16, "must be a valid u16")?;
        let database_path = required(&env_map, "DATABASE_PATH")?;
        let subgraph_url = required(&env_map, "SUBGRAPH_URL")?;
        let subgraph_api_key = optional(&env_map, "SUBGRAPH_API_KEY");
        let explorer_api_url = optional(&env_map, "EXPLORER_API_URL")
            .unwrap_or_else(|| DEFAULT_EXPLORER_API_URL.to_string());
        let explorer_api_key = required(&env_map, "EXPLORER_API_KEY")?;
        let rpc_url = required(&env_map, "RPC_URL")?;
        let chain_id = parse_or(&env_map, "CHAIN_ID", 56u64, "must be a valid u64")?;
        let swap_method = optional(&env_map, "SWAP_METHOD")
            .unwrap_or_else(|| "smartSwapByOrderId".to_string());
        let swap_from_block = parse_or(&env_map, "SWAP_FROM_BLOCK", 0u64, "must be a valid u64")?;

        let stable_tokens = parse_token_list(
            "STABLE_TOKENS",
            env_map
                .get("STABLE_TOKENS")
                .map(|s| s.as_str())
                .unwrap_or(DEFAULT_STABLE_TOKENS),
        )?;
        let volatile_tokens = parse_token_list(
            "VOLATILE_TOKENS",
            env_map
                .get("VOLATILE_TOKENS")
                .map(|s| s.as_str())
                .unwrap_or(DEFAULT_VOLATILE_TOKENS),
        )?;
        if let Some(token) = stable_tokens
            .iter()
            .find(|s| volatile_tokens.iter().any(|v| v.address == s.address))
        {
            return Err(ConfigError::InvalidValue(
                "VOLATILE_TOKENS".to_string(),
                format!("{} is also listed as a stable token", token.address),
            ));
        }

        let price_api_url =
            optional(&env_map, "PRICE_API_URL").unwrap_or_else(|| DEFAULT_KLINES_URL.to_string());
        let price_symbol =
            optional(&env_map, "PRICE_SYMBOL").unwrap_or_else(|| "BNBUSDT".to_string());
        let price_resolution = parse_or(
            &env_map,
            "PRICE_RESOLUTION",
            Resolution::OneMinute,
            "must be one of 1m, 5m, 15m, 1h, 4h, 1d",
        )?;
        let fallback_price = parse_or(
            &env_map,
            "FALLBACK_PRICE",
            Decimal::from_i64(DEFAULT_FALLBACK_PRICE),
            "must be a decimal number",
        )?;
        if !fallback_price.is_positive() {
            return Err(ConfigError::InvalidValue(
                "FALLBACK_PRICE".to_string(),
                "must be positive".to_string(),
            ));
        }
        let price_cache_max_age = Duration::from_secs(parse_or(
            &env_map,
            "PRICE_CACHE_MAX_AGE_SECS",
            86_400u64,
            "must be a valid u64",
        )?);
        let request_delay = Duration::from_millis(parse_or(
            &env_map,
            "REQUEST_DELAY_MS",
            100u64,
            "must be a valid u64",
        )?);

        let partial_withdrawal_policy = match env_map
            .get("PARTIAL_WITHDRAWAL_POLICY")
            .map(|s| s.as_str())
            .unwrap_or("closed")
        {
            "closed" => PartialWithdrawalPolicy::Closed,
            "active" => PartialWithdrawalPolicy::Active,
            other => {
                return Err(ConfigError::InvalidValue(
                    "PARTIAL_WITHDRAWAL_POLICY".to_string(),
                    format!("must be closed or active, got {}", other),
                ))
            }
        };

        let min_position_id = match optional(&env_map, "MIN_POSITION_ID") {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(
                    "MIN_POSITION_ID".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?),
            None => None,
        };

        let seed_swaps = match optional(&env_map, "SEED_SWAPS") {
            Some(raw) => parse_seed_swaps(&raw)?,
            None => Vec::new(),
        };

        Ok(Config {
            port,
            database_path,
            subgraph_url,
            subgraph_api_key,
            explorer_api_url,
            explorer_api_key,
            rpc_url,
            chain_id,
            swap_method,
            swap_from_block,
            stable_tokens,
            volatile_tokens,
            price_api_url,
            price_symbol,
            price_resolution,
            fallback_price,
            price_cache_max_age,
            request_delay,
            partial_withdrawal_policy,
            min_position_id,
            seed_swaps,
        })
    }

    pub fn asset_registry(&self) -> AssetRegistry {
        AssetRegistry::new(self.chain_id, &self.stable_tokens, &self.volatile_tokens)
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    optional(env_map, key).ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

/// Present and non-blank.
fn optional(env_map: &HashMap<String, String>, key: &str) -> Option<String> {
    env_map
        .get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    message: &str,
) -> Result<T, ConfigError> {
    match optional(env_map, key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), message.to_string())),
        None => Ok(default),
    }
}

/// `address:symbol:decimals[,address:symbol:decimals...]`
fn parse_token_list(key: &str, raw: &str) -> Result<Vec<TokenInfo>, ConfigError> {
    let invalid = |msg: String| ConfigError::InvalidValue(key.to_string(), msg);

    let tokens = raw
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(|p| p.trim()).collect();
            let [address, symbol, decimals] = parts.as_slice() else {
                return Err(invalid(format!(
                    "expected address:symbol:decimals, got {}",
                    entry
                )));
            };
            let address =
                Address::parse(address).map_err(|e| invalid(format!("{}: {}", entry, e)))?;
            let decimals = decimals
                .parse::<u8>()
                .map_err(|_| invalid(format!("invalid decimals in {}", entry)))?;
            Ok(TokenInfo::new(address, *symbol, decimals))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if tokens.is_empty() {
        return Err(invalid("at least one token is required".to_string()));
    }
    Ok(tokens)
}

/// `timestamp:stable_change:volatile_change[:label]` entries separated by `;`.
fn parse_seed_swaps(raw: &str) -> Result<Vec<SeedSwap>, ConfigError> {
    let invalid = |msg: String| ConfigError::InvalidValue("SEED_SWAPS".to_string(), msg);

    raw.split(';')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(4, ':');
            let (Some(ts), Some(stable), Some(volatile)) =
                (parts.next(), parts.next(), parts.next())
            else {
                return Err(invalid(format!(
                    "expected timestamp:stable:volatile[:label], got {}",
                    entry
                )));
            };
            let timestamp = ts
                .trim()
                .parse::<i64>()
                .map_err(|_| invalid(format!("invalid timestamp in {}", entry)))?;
            let stable_change = Decimal::from_str_canonical(stable)
                .map_err(|_| invalid(format!("invalid stable change in {}", entry)))?;
            let volatile_change = Decimal::from_str_canonical(volatile)
                .map_err(|_| invalid(format!("invalid volatile change in {}", entry)))?;
            Ok(SeedSwap {
                timestamp: UnixSecs::new(timestamp),
                stable_change,
                volatile_change,
                label: parts.next().map(|l| l.trim().to_string()).unwrap_or_default(),
            })
        })
        .collect()
}
