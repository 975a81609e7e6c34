//! Point-in-time price lookups over a fetched price series.

use crate::domain::{Decimal, PricePoint, UnixSecs};

/// Price returned when the series is empty, so a report can still be
/// rendered when no price data is available.
pub const DEFAULT_FALLBACK_PRICE: i64 = 600;

/// Immutable, sorted price series treated as a piecewise-linear function of
/// time, held constant beyond its first and last samples.
#[derive(Debug, Clone)]
pub struct PriceIndex {
    points: Vec<PricePoint>,
    fallback: Decimal,
}

impl PriceIndex {
    /// Build an index. Points are stable-sorted by timestamp, so an upstream
    /// that returns pages out of order cannot break the binary search.
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        if !points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp) {
            tracing::warn!("price series was not sorted; sorting {} points", points.len());
            points.sort_by_key(|p| p.timestamp);
        }
        Self {
            points,
            fallback: Decimal::from_i64(DEFAULT_FALLBACK_PRICE),
        }
    }

    /// Override the price used when the series is empty.
    pub fn with_fallback(mut self, fallback: Decimal) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True when lookups are answered from the fallback constant.
    pub fn is_degraded(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<UnixSecs> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<UnixSecs> {
        self.points.last().map(|p| p.timestamp)
    }

    /// Price of the most recent sample.
    pub fn latest(&self) -> Decimal {
        self.points.last().map(|p| p.price).unwrap_or(self.fallback)
    }

    /// Price at `timestamp`: clamped outside the series, linearly
    /// interpolated between the bracketing samples inside it.
    pub fn lookup(&self, timestamp: UnixSecs) -> Decimal {
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return self.fallback,
        };
        if timestamp <= first.timestamp {
            return first.price;
        }
        if timestamp >= last.timestamp {
            return last.price;
        }

        // Invariant: points[left].timestamp <= timestamp < points[right].timestamp
        let mut left = 0;
        let mut right = self.points.len() - 1;
        while left + 1 < right {
            let mid = left + (right - left) / 2;
            if self.points[mid].timestamp <= timestamp {
                left = mid;
            } else {
                right = mid;
            }
        }

        let lo = self.points[left];
        let hi = self.points[right];
        if lo.timestamp == timestamp || lo.timestamp == hi.timestamp {
            return lo.price;
        }

        let elapsed = Decimal::from_i64(timestamp.as_i64() - lo.timestamp.as_i64());
        let span = Decimal::from_i64(hi.timestamp.as_i64() - lo.timestamp.as_i64());
        hi.price
            .checked_sub(lo.price)
            .and_then(|delta| delta.checked_mul(elapsed))
            .and_then(|scaled| scaled.checked_div(span))
            .and_then(|step| lo.price.checked_add(step))
            .unwrap_or(lo.price)
    }
}
