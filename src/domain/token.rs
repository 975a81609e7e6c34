//! Token metadata and the asset registry that decides which two assets the
//! ledger tracks.

use super::{Address, AssetRole};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decimals assumed for tokens the registry does not know.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Symbols recognised as stablecoins when a token's address is not registered.
const STABLECOIN_SYMBOLS: &[&str] = &[
    "USDT", "USDC", "USD", "DAI", "BUSD", "TUSD", "USDP", "GUSD", "USD₮0",
];

/// Static metadata for one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenInfo {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RegistryEntry {
    role: AssetRole,
    token: TokenInfo,
}

/// Maps (chain, address) to an asset role, resolved once at configuration
/// time. Symbol matching is only a fallback for unregistered addresses.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    chain_id: u64,
    entries: HashMap<Address, RegistryEntry>,
    stable_symbol: String,
    volatile_symbol: String,
    volatile_symbols: Vec<String>,
}

impl AssetRegistry {
    /// Build a registry for one chain from the configured stable and
    /// volatile-reference token lists. The first token of each list gives the
    /// display symbol used in descriptions.
    pub fn new(chain_id: u64, stable: &[TokenInfo], volatile: &[TokenInfo]) -> Self {
        let mut entries = HashMap::new();
        for token in stable {
            entries.insert(
                token.address.clone(),
                RegistryEntry {
                    role: AssetRole::Stable,
                    token: token.clone(),
                },
            );
        }
        for token in volatile {
            entries.insert(
                token.address.clone(),
                RegistryEntry {
                    role: AssetRole::VolatileReference,
                    token: token.clone(),
                },
            );
        }

        Self {
            chain_id,
            entries,
            stable_symbol: stable
                .first()
                .map(|t| t.symbol.clone())
                .unwrap_or_else(|| "STABLE".to_string()),
            volatile_symbol: volatile
                .first()
                .map(|t| t.symbol.clone())
                .unwrap_or_else(|| "VOLATILE".to_string()),
            volatile_symbols: volatile.iter().map(|t| t.symbol.to_uppercase()).collect(),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn stable_symbol(&self) -> &str {
        &self.stable_symbol
    }

    pub fn volatile_symbol(&self) -> &str {
        &self.volatile_symbol
    }

    /// Role of a registered address; unregistered addresses are `Other`.
    pub fn role_of(&self, address: &Address) -> AssetRole {
        self.entries
            .get(address)
            .map(|e| e.role)
            .unwrap_or(AssetRole::Other)
    }

    /// Role by address, falling back to symbol heuristics for tokens the
    /// registry does not know.
    pub fn resolve(&self, address: &Address, symbol: Option<&str>) -> AssetRole {
        if let Some(entry) = self.entries.get(address) {
            return entry.role;
        }
        match symbol {
            Some(sym) if is_stablecoin_symbol(sym) => AssetRole::Stable,
            Some(sym) if self.volatile_symbols.contains(&sym.trim().to_uppercase()) => {
                AssetRole::VolatileReference
            }
            _ => AssetRole::Other,
        }
    }

    /// Decimals of a registered token, or [`DEFAULT_TOKEN_DECIMALS`].
    pub fn decimals_of(&self, address: &Address) -> u8 {
        self.entries
            .get(address)
            .map(|e| e.token.decimals)
            .unwrap_or(DEFAULT_TOKEN_DECIMALS)
    }

    pub fn symbol_of(&self, address: &Address) -> Option<&str> {
        self.entries.get(address).map(|e| e.token.symbol.as_str())
    }
}

pub fn is_stablecoin_symbol(symbol: &str) -> bool {
    let upper = symbol.trim().to_uppercase();
    STABLECOIN_SYMBOLS.iter().any(|s| upper.contains(s))
}
