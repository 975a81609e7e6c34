use axum::http::{header, StatusCode};
use lpledger::api::{self, AppState};
use lpledger::datasource::{DataSourceError, MockDataSource};
use lpledger::db::init_db;
use lpledger::domain::{
    Address, AssetRegistry, Decimal, FixedClock, PartialWithdrawalPolicy, PricePoint, Resolution,
    SwapRecord, TokenInfo, UnixSecs,
};
use lpledger::{Repository, ReportService, ReportSettings};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

const USDT: &str = "0x55d398326f99059ff775485246999027b3197955";
const WBNB: &str = "0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c";
const WALLET: &str = "0x6d530c88f583478fdc2e553f872bbe6ddd89c7ee";

struct TestApp {
    app: axum::Router,
    _temp: TempDir,
}

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

async fn setup_test_app(mock: MockDataSource) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let registry = AssetRegistry::new(
        56,
        &[TokenInfo::new(Address::new(USDT), "USDT", 18)],
        &[TokenInfo::new(Address::new(WBNB), "WBNB", 18)],
    );
    let settings = ReportSettings {
        price_symbol: "BNBUSDT".to_string(),
        price_resolution: Resolution::OneMinute,
        fallback_price: d("600"),
        swap_from_block: 0,
        partial_withdrawal_policy: PartialWithdrawalPolicy::Closed,
        min_position_id: None,
        seed_swaps: Vec::new(),
    };
    let service = ReportService::new(
        Arc::new(mock.clone()),
        Arc::new(mock.clone()),
        Arc::new(mock),
        Arc::new(FixedClock::new(UnixSecs::new(300))),
        Arc::new(registry),
        settings,
    );

    let app = api::create_router(AppState::new(repo, Arc::new(service)));
    TestApp {
        app,
        _temp: temp_dir,
    }
}

fn swap(tx: &str, from: &str, to: &str, from_amount: &str, return_amount: &str, ts: i64) -> SwapRecord {
    SwapRecord {
        from_token: Address::new(from),
        to_token: Address::new(to),
        sender: Address::new(WALLET),
        from_amount: from_amount.to_string(),
        return_amount: return_amount.to_string(),
        tx_hash: tx.to_string(),
        log_index: 0,
        block_number: 1,
        timestamp: UnixSecs::new(ts),
        gas_used: "0".to_string(),
        gas_price: "0".to_string(),
    }
}

fn wallet_activity() -> MockDataSource {
    MockDataSource::new()
        .with_swap(swap(
            "0x01",
            USDT,
            WBNB,
            "1000000000000000000000",
            "2000000000000000000",
            100,
        ))
        .with_swap(swap(
            "0x02",
            WBNB,
            USDT,
            "500000000000000000",
            "260000000000000000000",
            200,
        ))
        .with_prices(vec![
            PricePoint::new(UnixSecs::new(100), d("500")),
            PricePoint::new(UnixSecs::new(200), d("520")),
        ])
}

async fn request(
    app: axum::Router,
    uri: &str,
) -> (StatusCode, Option<String>, axum::body::Bytes) {
    let req = axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let content_type = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, body)
}

#[tokio::test]
async fn test_health_and_ready() {
    let test_app = setup_test_app(MockDataSource::new()).await;

    let (status, _, body) = request(test_app.app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");

    let (status, _, body) = request(test_app.app, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ready");
}

#[tokio::test]
async fn test_pnl_response_has_required_fields() {
    let test_app = setup_test_app(wallet_activity()).await;

    let (status, _, body) = request(test_app.app, &format!("/v1/pnl?user={}", WALLET)).await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    for field in [
        "swapSummary",
        "positionSummary",
        "combined",
        "trend",
        "breakdown",
        "timeline",
        "diagnostics",
    ] {
        assert!(json.get(field).is_some(), "missing {}", field);
    }
    assert_eq!(json["swapSummary"]["transactionCount"], 2);
    assert_eq!(json["timeline"].as_array().unwrap().len(), 2);
    assert_eq!(json["timeline"][1]["kind"], "SWAP");
    // -740 + 1.5 * 520
    assert_eq!(json["combined"]["totalProfit"].as_f64(), Some(40.0));
}

#[tokio::test]
async fn test_pnl_accepts_checksummed_address() {
    let test_app = setup_test_app(wallet_activity()).await;
    let checksummed = "0x6D530C88F583478FDC2E553F872BBE6DDD89C7EE";

    let (status, _, body) =
        request(test_app.app, &format!("/v1/pnl?user={}", checksummed)).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["timeline"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_pnl_rejects_bad_address() {
    let test_app = setup_test_app(wallet_activity()).await;

    let (status, _, body) = request(test_app.app.clone(), "/v1/pnl?user=0x1234").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid user address"));

    let (status, _, _) = request(test_app.app, "/v1/pnl").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upstream_failure_is_bad_gateway() {
    let mock = wallet_activity().with_swaps_error(DataSourceError::HttpError {
        status: 500,
        message: "boom".to_string(),
    });
    let test_app = setup_test_app(mock).await;

    let (status, _, body) = request(test_app.app, &format!("/v1/pnl?user={}", WALLET)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "swap source failed: HTTP error 500: boom");
}

#[tokio::test]
async fn test_timeline_json_and_csv() {
    let test_app = setup_test_app(wallet_activity()).await;

    let (status, _, body) =
        request(test_app.app.clone(), &format!("/v1/timeline?user={}", WALLET)).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 2);
    assert_eq!(json[0]["key"], "swap:0x01:0");

    let (status, content_type, body) = request(
        test_app.app,
        &format!("/v1/timeline?user={}&format=csv", WALLET),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/csv"));

    let text = String::from_utf8(body.to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Date,Kind,Description,Stable Change"));
    assert!(lines[1].starts_with("1970-01-01 00:01:40,SWAP,"));
    assert!(lines[1].contains(",-1000,2,-1000,2,500,0,500,"));
}

#[tokio::test]
async fn test_timeline_rejects_unknown_format() {
    let test_app = setup_test_app(wallet_activity()).await;

    let (status, _, body) = request(
        test_app.app,
        &format!("/v1/timeline?user={}&format=xml", WALLET),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("xml"));
}
