pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{
    DataSourceError, MockDataSource, PositionBatch, PositionSource, PriceSource, SwapBatch,
    SwapSource,
};
pub use db::{init_db, Repository};
pub use domain::{
    Address, AssetRegistry, Decimal, Operation, OperationKind, PnlReport, Position, PricePoint,
    SwapRecord, TimelineEntry, UnixSecs,
};
pub use engine::{EventNormalizer, PnlAggregator, PriceIndex, TimelineBuilder};
pub use error::AppError;
pub use orchestration::{ReportError, ReportService, ReportSettings};
