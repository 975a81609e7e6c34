//! Reference price samples.

use super::{Decimal, UnixSecs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One sample of the volatile asset's price in stable terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: UnixSecs,
    pub price: Decimal,
}

impl PricePoint {
    pub fn new(timestamp: UnixSecs, price: Decimal) -> Self {
        Self { timestamp, price }
    }
}

/// Candle resolution of a price series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::OneMinute => "1m",
            Resolution::FiveMinutes => "5m",
            Resolution::FifteenMinutes => "15m",
            Resolution::OneHour => "1h",
            Resolution::FourHours => "4h",
            Resolution::OneDay => "1d",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            Resolution::OneMinute => 60,
            Resolution::FiveMinutes => 300,
            Resolution::FifteenMinutes => 900,
            Resolution::OneHour => 3_600,
            Resolution::FourHours => 14_400,
            Resolution::OneDay => 86_400,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported resolution: {0}")]
pub struct ResolutionParseError(pub String);

impl FromStr for Resolution {
    type Err = ResolutionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1m" => Ok(Resolution::OneMinute),
            "5m" => Ok(Resolution::FiveMinutes),
            "15m" => Ok(Resolution::FifteenMinutes),
            "1h" => Ok(Resolution::OneHour),
            "4h" => Ok(Resolution::FourHours),
            "1d" => Ok(Resolution::OneDay),
            other => Err(ResolutionParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_round_trips_through_str() {
        for res in [
            Resolution::OneMinute,
            Resolution::FiveMinutes,
            Resolution::FifteenMinutes,
            Resolution::OneHour,
            Resolution::FourHours,
            Resolution::OneDay,
        ] {
            assert_eq!(res.as_str().parse::<Resolution>(), Ok(res));
        }
        assert!("2w".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_resolution_seconds() {
        assert_eq!(Resolution::OneMinute.seconds(), 60);
        assert_eq!(Resolution::OneDay.seconds(), 86_400);
    }
}
