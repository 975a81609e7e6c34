//! Read-through cache in front of a [`PriceSource`].

use super::{DataSourceError, PriceSource};
use crate::db::{CachedSeries, Repository};
use crate::domain::{Clock, PricePoint, Resolution, UnixSecs};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default freshness window for cached series.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Serves a series from the repository when a fresh entry covers the
/// requested window, otherwise fetches from `inner` and stores the result.
///
/// An entry that ends less than one candle before the requested end still
/// counts as covering it: that candle has not closed yet. When the gap is
/// wider only the missing tail is fetched and merged into the entry.
///
/// Cache failures are logged and never fail the request.
pub struct CachedPriceSource<S> {
    inner: S,
    repo: Arc<Repository>,
    clock: Arc<dyn Clock>,
    max_age: Duration,
}

enum Lookup {
    Hit(Vec<PricePoint>),
    /// Fresh entry that starts early enough but ends too soon.
    Tail(CachedSeries),
    Miss,
}

fn within(points: Vec<PricePoint>, start: UnixSecs, end: UnixSecs) -> Vec<PricePoint> {
    points
        .into_iter()
        .filter(|p| p.timestamp >= start && p.timestamp <= end)
        .collect()
}

impl<S: PriceSource> CachedPriceSource<S> {
    pub fn new(inner: S, repo: Arc<Repository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            repo,
            clock,
            max_age: DEFAULT_MAX_AGE,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn lookup(
        &self,
        symbol: &str,
        start: UnixSecs,
        end: UnixSecs,
        resolution: Resolution,
    ) -> Lookup {
        let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
        let fresh_since = UnixSecs::new(self.clock.now().as_i64().saturating_sub(max_age));

        let cached = match self
            .repo
            .get_price_cache(symbol, resolution, fresh_since)
            .await
        {
            Ok(Some(cached)) => cached,
            Ok(None) => return Lookup::Miss,
            Err(e) => {
                warn!("Price cache read failed for {} {}: {}", symbol, resolution, e);
                return Lookup::Miss;
            }
        };
        if cached.start > start {
            debug!(
                "Cached {} series starts at {}, after {}",
                symbol, cached.start, start
            );
            return Lookup::Miss;
        }
        if end.as_i64().saturating_sub(cached.end.as_i64()) <= resolution.seconds() {
            return Lookup::Hit(within(cached.points, start, end));
        }
        Lookup::Tail(cached)
    }

    /// Fetch `[last cached point, end]` and splice it onto `cached`.
    async fn extend_tail(
        &self,
        symbol: &str,
        cached: CachedSeries,
        start: UnixSecs,
        end: UnixSecs,
        resolution: Resolution,
    ) -> Result<Vec<PricePoint>, DataSourceError> {
        let tail_start = cached
            .points
            .last()
            .map_or(cached.end, |p| p.timestamp)
            .min(cached.end);
        debug!(
            "Extending cached {} series from {} to {}",
            symbol, tail_start, end
        );
        let tail = self
            .inner
            .fetch_price_series(symbol, tail_start, end, resolution)
            .await?;
        if tail.is_empty() {
            return Ok(within(cached.points, start, end));
        }

        let mut merged: Vec<PricePoint> = cached
            .points
            .into_iter()
            .filter(|p| p.timestamp < tail_start)
            .collect();
        merged.extend(tail);
        self.store(symbol, resolution, cached.start, end, &merged).await;
        Ok(within(merged, start, end))
    }

    async fn store(
        &self,
        symbol: &str,
        resolution: Resolution,
        start: UnixSecs,
        end: UnixSecs,
        points: &[PricePoint],
    ) {
        if let Err(e) = self
            .repo
            .put_price_cache(symbol, resolution, start, end, self.clock.now(), points)
            .await
        {
            warn!("Price cache write failed for {} {}: {}", symbol, resolution, e);
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for CachedPriceSource<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedPriceSource")
            .field("inner", &self.inner)
            .field("max_age", &self.max_age)
            .finish()
    }
}

#[async_trait]
impl<S: PriceSource> PriceSource for CachedPriceSource<S> {
    async fn fetch_price_series(
        &self,
        symbol: &str,
        start: UnixSecs,
        end: UnixSecs,
        resolution: Resolution,
    ) -> Result<Vec<PricePoint>, DataSourceError> {
        match self.lookup(symbol, start, end, resolution).await {
            Lookup::Hit(points) => {
                debug!("Using {} cached price points for {}", points.len(), symbol);
                return Ok(points);
            }
            Lookup::Tail(cached) => {
                return self
                    .extend_tail(symbol, cached, start, end, resolution)
                    .await;
            }
            Lookup::Miss => {}
        }

        let points = self
            .inner
            .fetch_price_series(symbol, start, end, resolution)
            .await?;

        // An empty series is not worth remembering.
        if !points.is_empty() {
            self.store(symbol, resolution, start, end, &points).await;
        }
        Ok(points)
    }
}
