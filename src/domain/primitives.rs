//! Domain primitives: UnixSecs, Address, AssetRole.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Time in whole seconds since Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UnixSecs(pub i64);

impl UnixSecs {
    pub fn new(secs: i64) -> Self {
        UnixSecs(secs)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    pub fn as_millis(&self) -> i64 {
        self.0.saturating_mul(1000)
    }

    /// UTC rendering as `YYYY-MM-DD HH:MM:SS`; out-of-range values render as
    /// the raw number of seconds.
    pub fn to_utc_string(&self) -> String {
        match Utc.timestamp_opt(self.0, 0).single() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => self.0.to_string(),
        }
    }
}

impl std::fmt::Display for UnixSecs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must be 40 hex characters after 0x")]
    InvalidLength,
    #[error("address contains non-hex characters")]
    InvalidHex,
}

/// EVM address, stored lowercase so map lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wrap an address without validation (upstream payloads, test fixtures).
    pub fn new(addr: impl Into<String>) -> Self {
        Address(addr.into().trim().to_ascii_lowercase())
    }

    /// Parse and validate a user-supplied address.
    pub fn parse(input: &str) -> Result<Self, AddressParseError> {
        let trimmed = input.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or(AddressParseError::MissingPrefix)?;
        if hex_part.len() != 40 {
            return Err(AddressParseError::InvalidLength);
        }
        if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressParseError::InvalidHex);
        }
        Ok(Address::new(trimmed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form used in descriptions, e.g. `0x55d398`.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a token in the two-asset accounting model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetRole {
    /// The stable quote asset balances are accounted in.
    Stable,
    /// The volatile reference asset priced by the price index.
    VolatileReference,
    /// Any other token; not balance-tracked.
    Other,
}

impl std::fmt::Display for AssetRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetRole::Stable => write!(f, "stable"),
            AssetRole::VolatileReference => write!(f, "volatile-reference"),
            AssetRole::Other => write!(f, "other"),
        }
    }
}
