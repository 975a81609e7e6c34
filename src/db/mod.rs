//! SQLite-backed cache for upstream data.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - The `Repository` holding cached price series and transaction receipts

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{CacheError, CachedSeries, Repository};
