//! Pure computation engine for deterministic ledger logic.
//!
//! Nothing in here performs I/O: the orchestrator fetches inputs, then runs
//! normalizer -> timeline builder -> aggregator over them.

pub mod aggregator;
pub mod normalizer;
pub mod price_index;
pub mod timeline;

pub use aggregator::{breakdown, AggregateError, PnlAggregator};
pub use normalizer::{seed_operation, EventNormalizer, NormalizedEvents, PositionLedger, SeedSwap};
pub use price_index::{PriceIndex, DEFAULT_FALLBACK_PRICE};
pub use timeline::{price_window, TimelineBuilder};
