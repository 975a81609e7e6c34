use lpledger::datasource::{CachedPriceSource, DataSourceError, MockDataSource};
use lpledger::db::init_db;
use lpledger::domain::{
    Address, AssetRegistry, Clock, DecodeIssue, Decimal, FixedClock, OperationKind,
    PartialWithdrawalPolicy, Position, PricePoint, RecordSource, Resolution, SwapRecord,
    TokenInfo, UnixSecs,
};
use lpledger::engine::{AggregateError, SeedSwap};
use lpledger::orchestration::{Collaborator, ReportError, ReportService, ReportSettings};
use lpledger::Repository;
use std::sync::Arc;
use tempfile::TempDir;

const USDT: &str = "0x55d398326f99059ff775485246999027b3197955";
const WBNB: &str = "0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c";
const WALLET: &str = "0x6d530c88f583478fdc2e553f872bbe6ddd89c7ee";

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn wallet() -> Address {
    Address::new(WALLET)
}

fn settings() -> ReportSettings {
    ReportSettings {
        price_symbol: "BNBUSDT".to_string(),
        price_resolution: Resolution::OneMinute,
        fallback_price: d("600"),
        swap_from_block: 0,
        partial_withdrawal_policy: PartialWithdrawalPolicy::Closed,
        min_position_id: None,
        seed_swaps: Vec::new(),
    }
}

fn registry() -> AssetRegistry {
    AssetRegistry::new(
        56,
        &[TokenInfo::new(Address::new(USDT), "USDT", 18)],
        &[TokenInfo::new(Address::new(WBNB), "WBNB", 18)],
    )
}

fn service(mock: MockDataSource, settings: ReportSettings, now: i64) -> ReportService {
    let registry = registry();
    ReportService::new(
        Arc::new(mock.clone()),
        Arc::new(mock.clone()),
        Arc::new(mock),
        Arc::new(FixedClock::new(UnixSecs::new(now))),
        Arc::new(registry),
        settings,
    )
}

fn buy_swap() -> SwapRecord {
    SwapRecord {
        from_token: Address::new(USDT),
        to_token: Address::new(WBNB),
        sender: wallet(),
        from_amount: "1000000000000000000000".to_string(),
        return_amount: "2000000000000000000".to_string(),
        tx_hash: "0xaaa".to_string(),
        log_index: 3,
        block_number: 40_000_000,
        timestamp: UnixSecs::new(100),
        gas_used: "150000".to_string(),
        gas_price: "1000000000".to_string(),
    }
}

fn closed_position(id: &str, created_at: i64) -> Position {
    Position {
        id: id.to_string(),
        owner: wallet(),
        created_at: UnixSecs::new(created_at),
        token0: TokenInfo::new(Address::new(USDT), "USDT", 18),
        token1: TokenInfo::new(Address::new(WBNB), "WBNB", 18),
        tick_lower: -500,
        tick_upper: 500,
        liquidity: "0".to_string(),
        deposited0: "500000000000000000000".to_string(),
        deposited1: "1000000000000000000".to_string(),
        withdrawn0: "550000000000000000000".to_string(),
        withdrawn1: "1000000000000000000".to_string(),
        collected_fees0: "50000000000000000000".to_string(),
        collected_fees1: "200000000000000000".to_string(),
        current0: None,
        current1: None,
    }
}

fn prices() -> Vec<PricePoint> {
    vec![
        PricePoint::new(UnixSecs::new(100), d("500")),
        PricePoint::new(UnixSecs::new(200), d("520")),
        PricePoint::new(UnixSecs::new(300), d("540")),
    ]
}

#[tokio::test]
async fn test_report_from_mock_sources() {
    let mock = MockDataSource::new()
        .with_swap(buy_swap())
        .with_position(closed_position("101", 200))
        .with_prices(prices());
    let report = service(mock.clone(), settings(), 300)
        .build_report(&wallet())
        .await
        .expect("report");

    assert_eq!(report.timeline.len(), 3);
    assert_eq!(report.combined.net_stable, d("-900"));
    assert_eq!(report.combined.net_volatile, d("2.2"));
    assert_eq!(report.combined.current_reference_price, d("540"));
    assert_eq!(report.combined.total_profit, d("288"));
    assert_eq!(report.swap_summary.total_gas_cost, d("0.00015"));

    assert_eq!(report.diagnostics.price_points, 3);
    assert!(!report.diagnostics.price_fallback_used);
    assert_eq!(report.diagnostics.price_window_start, UnixSecs::new(100));
    assert_eq!(report.diagnostics.price_window_end, UnixSecs::new(300));
    assert_eq!(report.diagnostics.generated_at, UnixSecs::new(300));
    assert_eq!(mock.price_calls(), 1);

    let kinds: Vec<OperationKind> = report.breakdown.iter().map(|b| b.kind).collect();
    assert_eq!(
        kinds,
        vec![
            OperationKind::Swap,
            OperationKind::PositionOpen,
            OperationKind::PositionClose
        ]
    );
}

#[tokio::test]
async fn test_report_serializes_camel_case() {
    let mock = MockDataSource::new()
        .with_swap(buy_swap())
        .with_prices(prices());
    let report = service(mock, settings(), 300)
        .build_report(&wallet())
        .await
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert!(json["swapSummary"]["netStable"].is_number());
    assert!(json["positionSummary"]["avgPrice"].is_null());
    assert_eq!(json["timeline"][0]["kind"], "SWAP");
    assert_eq!(json["timeline"][0]["key"], "swap:0xaaa:3");
    assert!(json["timeline"][0]["cumulativeStable"].is_number());
    assert!(json["diagnostics"]["rejected"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_swap_source_failure_fails_report() {
    let mock = MockDataSource::new()
        .with_position(closed_position("101", 200))
        .with_swaps_error(DataSourceError::RateLimited);
    let err = service(mock.clone(), settings(), 300)
        .build_report(&wallet())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReportError::Upstream {
            collaborator: Collaborator::Swaps,
            ..
        }
    ));
    assert_eq!(mock.price_calls(), 0);
}

#[tokio::test]
async fn test_position_and_price_failures_name_their_source() {
    let mock = MockDataSource::new().with_positions_error(DataSourceError::HttpError {
        status: 503,
        message: "unavailable".to_string(),
    });
    let err = service(mock, settings(), 300)
        .build_report(&wallet())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "position source failed: HTTP error 503: unavailable");

    let mock = MockDataSource::new()
        .with_swap(buy_swap())
        .with_prices_error(DataSourceError::NetworkError("reset".to_string()));
    let err = service(mock, settings(), 300)
        .build_report(&wallet())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReportError::Upstream {
            collaborator: Collaborator::Prices,
            ..
        }
    ));
}

#[tokio::test]
async fn test_empty_wallet_yields_empty_report_without_price_fetch() {
    let mock = MockDataSource::new().with_prices(prices());
    let report = service(mock.clone(), settings(), 300)
        .build_report(&wallet())
        .await
        .unwrap();

    assert!(report.timeline.is_empty());
    assert!(report.trend.is_none());
    assert!(report.breakdown.is_empty());
    assert_eq!(report.combined.total_profit, d("0"));
    assert_eq!(mock.price_calls(), 0);
    assert!(!report.diagnostics.price_fallback_used);
}

#[tokio::test]
async fn test_missing_prices_fall_back_and_are_flagged() {
    let mock = MockDataSource::new().with_swap(buy_swap());
    let report = service(mock, settings(), 300)
        .build_report(&wallet())
        .await
        .unwrap();

    assert!(report.diagnostics.price_fallback_used);
    assert_eq!(report.diagnostics.price_points, 0);
    assert_eq!(report.timeline[0].reference_price(), d("600"));
    // -1000 + 2 * 600
    assert_eq!(report.combined.total_profit, d("200"));
}

#[tokio::test]
async fn test_position_floor_and_seed_swaps() {
    let mut settings = settings();
    settings.min_position_id = Some(100);
    settings.seed_swaps = vec![SeedSwap {
        timestamp: UnixSecs::new(50),
        stable_change: d("-600"),
        volatile_change: d("1"),
        label: "opening balance".to_string(),
    }];

    let mock = MockDataSource::new()
        .with_position(closed_position("7", 150))
        .with_position(closed_position("101", 200))
        .with_prices(prices());
    let report = service(mock, settings, 300)
        .build_report(&wallet())
        .await
        .unwrap();

    assert_eq!(report.position_summary.closed_positions, 1);
    assert_eq!(report.swap_summary.manual_count, 1);
    assert_eq!(report.timeline[0].operation().description, "Manual: opening balance");
    assert!(report
        .timeline
        .iter()
        .all(|e| e.operation().details.position_id.as_deref() != Some("7")));
}

#[tokio::test]
async fn test_rejected_records_reach_diagnostics() {
    let mut bad = buy_swap();
    bad.tx_hash = "0xbad".to_string();
    bad.return_amount = "not-a-number".to_string();

    let mock = MockDataSource::new()
        .with_swap(buy_swap())
        .with_swap(bad)
        .with_prices(prices());
    let report = service(mock, settings(), 300)
        .build_report(&wallet())
        .await
        .unwrap();

    assert_eq!(report.timeline.len(), 1);
    assert_eq!(report.diagnostics.rejected.len(), 1);
    assert_eq!(report.diagnostics.rejected[0].source, RecordSource::Swap);
    assert_eq!(report.diagnostics.rejected[0].record_id, "swap:0xbad:3");
}

/// Position in whole units of a 0-decimal stable token, so that amounts near
/// the top of the decimal range are easy to write.
fn whole_unit_position(id: &str, created_at: i64, deposited: &str, withdrawn: &str) -> Position {
    let mut position = closed_position(id, created_at);
    position.token0.decimals = 0;
    position.deposited0 = deposited.to_string();
    position.deposited1 = "0".to_string();
    position.withdrawn0 = withdrawn.to_string();
    position.withdrawn1 = "0".to_string();
    position.collected_fees0 = "0".to_string();
    position.collected_fees1 = "0".to_string();
    position
}

const HUGE: &str = "50000000000000000000000000000";

#[tokio::test]
async fn test_oversized_deposits_are_rejected_not_fatal() {
    let mut first = whole_unit_position("1", 100, HUGE, "0");
    first.liquidity = "1".to_string();
    let mut second = whole_unit_position("2", 200, HUGE, "0");
    second.liquidity = "1".to_string();

    let mock = MockDataSource::new()
        .with_positions(vec![first, second])
        .with_prices(prices());
    let report = service(mock, settings(), 300)
        .build_report(&wallet())
        .await
        .expect("report");

    assert_eq!(report.timeline.len(), 1);
    assert_eq!(report.timeline[0].operation().key, "open:1");
    assert_eq!(report.diagnostics.rejected.len(), 1);
    assert_eq!(report.diagnostics.rejected[0].record_id, "open:2");
    assert_eq!(report.diagnostics.rejected[0].source, RecordSource::Position);
    assert_eq!(report.position_summary.active_positions, 2);
    assert_eq!(report.position_summary.total_unrealized_pnl, Decimal::zero());
}

#[tokio::test]
async fn test_closed_totals_past_decimal_range_fail_with_typed_error() {
    let mock = MockDataSource::new()
        .with_positions(vec![
            whole_unit_position("1", 100, "0", HUGE),
            whole_unit_position("2", 200, "0", HUGE),
        ])
        .with_prices(prices());
    let err = service(mock, settings(), 300)
        .build_report(&wallet())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReportError::OutOfRange(AggregateError::Overflow("position net"))
    ));
}

#[tokio::test]
async fn test_absurd_token_decimals_do_not_break_the_report() {
    let mut junk = closed_position("666", 150);
    junk.token0 = TokenInfo::new(
        Address::new("0x0000000000000000000000000000000000000bad"),
        "USDT.fake",
        80,
    );

    let mock = MockDataSource::new()
        .with_swap(buy_swap())
        .with_position(junk)
        .with_prices(prices());
    let report = service(mock, settings(), 300)
        .build_report(&wallet())
        .await
        .expect("report");

    assert_eq!(report.timeline.len(), 1);
    assert_eq!(report.diagnostics.rejected.len(), 1);
    assert_eq!(report.diagnostics.rejected[0].record_id, "666");
}

#[tokio::test]
async fn test_upstream_skipped_entries_reach_diagnostics() {
    let mock = MockDataSource::new()
        .with_swap(buy_swap())
        .with_prices(prices())
        .with_skipped_position(DecodeIssue {
            source: RecordSource::Position,
            record_id: "positions:3".to_string(),
            reason: "Parse error: Missing transaction field".to_string(),
        })
        .with_skipped_swap(DecodeIssue {
            source: RecordSource::Swap,
            record_id: "0xccc#log4".to_string(),
            reason: "Parse error: Log data too short: 2 bytes".to_string(),
        });
    let report = service(mock, settings(), 300)
        .build_report(&wallet())
        .await
        .unwrap();

    let ids: Vec<_> = report
        .diagnostics
        .rejected
        .iter()
        .map(|r| r.record_id.as_str())
        .collect();
    assert_eq!(ids, vec!["positions:3", "0xccc#log4"]);
    assert_eq!(report.timeline.len(), 1);
}

#[tokio::test]
async fn test_repeated_reports_reuse_cached_prices() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("cache.db").to_string_lossy().to_string();
    let repo = Arc::new(Repository::new(init_db(&db_path).await.unwrap()));
    let clock = Arc::new(FixedClock::new(UnixSecs::new(300)));
    let dyn_clock: Arc<dyn Clock> = clock.clone();

    let mut minute_prices = prices();
    minute_prices.extend((6..20).map(|i| PricePoint::new(UnixSecs::new(i * 60), d("550"))));
    let mock = MockDataSource::new()
        .with_swap(buy_swap())
        .with_position(closed_position("101", 200))
        .with_prices(minute_prices);
    let prices = CachedPriceSource::new(mock.clone(), repo, dyn_clock.clone());
    let service = ReportService::new(
        Arc::new(mock.clone()),
        Arc::new(mock.clone()),
        Arc::new(prices),
        dyn_clock,
        Arc::new(registry()),
        settings(),
    );

    let first = service.build_report(&wallet()).await.unwrap();
    assert_eq!(mock.price_calls(), 1);

    // The window end follows the clock; one more candle is still a hit.
    clock.advance(60);
    let second = service.build_report(&wallet()).await.unwrap();
    assert_eq!(mock.price_calls(), 1);
    assert_eq!(second.combined.net_stable, first.combined.net_stable);
    assert_eq!(second.diagnostics.price_window_end, UnixSecs::new(360));

    // Further ahead only the missing tail is fetched.
    clock.advance(600);
    let third = service.build_report(&wallet()).await.unwrap();
    assert_eq!(mock.price_calls(), 2);
    assert_eq!(third.combined.current_reference_price, d("550"));
    // 100, 200 and every minute from 300 to 960.
    assert_eq!(third.diagnostics.price_points, 14);

    service.build_report(&wallet()).await.unwrap();
    assert_eq!(mock.price_calls(), 2);
}
