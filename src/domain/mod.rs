//! Domain types for the LP PnL ledger.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper and U256 raw amounts
//! - Domain primitives: UnixSecs, Address, AssetRole
//! - Upstream record shapes: Position, SwapRecord, PricePoint
//! - Ledger shapes: Operation, TimelineEntry and the PnlReport

pub mod amount;
pub mod clock;
pub mod decimal;
pub mod operation;
pub mod position;
pub mod price;
pub mod primitives;
pub mod report;
pub mod swap;
pub mod token;

pub use amount::{AmountError, RawAmount};
pub use clock::{Clock, FixedClock, SystemClock};
pub use decimal::Decimal;
pub use operation::{Operation, OperationDetails, OperationKind, TimelineEntry};
pub use position::{PartialWithdrawalPolicy, Position, PositionStatus};
pub use price::{PricePoint, Resolution, ResolutionParseError};
pub use primitives::{Address, AddressParseError, AssetRole, UnixSecs};
pub use report::{
    CombinedSummary, DecodeIssue, KindBreakdown, PnlReport, PositionSummary, RecordSource,
    ReportDiagnostics, SwapSummary, TrendStats, UnrealizedPosition,
};
pub use swap::SwapRecord;
pub use token::{is_stablecoin_symbol, AssetRegistry, TokenInfo, DEFAULT_TOKEN_DECIMALS};
