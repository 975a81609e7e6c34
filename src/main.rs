use anyhow::Context;
use lpledger::datasource::explorer::ExplorerSettings;
use lpledger::datasource::http::JsonClient;
use lpledger::datasource::{
    BinancePriceSource, CachedPriceSource, ExplorerSwapSource, SubgraphPositionSource,
};
use lpledger::domain::{Clock, SystemClock};
use lpledger::{api, config::Config, db::init_db, ReportService, ReportSettings, Repository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("Failed to initialize database at {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let positions = SubgraphPositionSource::new(
        JsonClient::new(client.clone()).with_bearer_token(config.subgraph_api_key.clone()),
        config.subgraph_url.clone(),
    );
    let swaps = ExplorerSwapSource::new(
        JsonClient::new(client.clone()),
        config.rpc_url.clone(),
        ExplorerSettings {
            api_url: config.explorer_api_url.clone(),
            api_key: config.explorer_api_key.clone(),
            chain_id: config.chain_id,
            swap_method: config.swap_method.clone(),
            request_delay: config.request_delay,
        },
    )
    .with_receipt_cache(repo.clone(), clock.clone());
    let prices = CachedPriceSource::new(
        BinancePriceSource::new(
            JsonClient::new(client),
            config.price_api_url.clone(),
            config.request_delay,
        ),
        repo.clone(),
        clock.clone(),
    )
    .with_max_age(config.price_cache_max_age);

    let service = ReportService::new(
        Arc::new(positions),
        Arc::new(swaps),
        Arc::new(prices),
        clock,
        Arc::new(config.asset_registry()),
        ReportSettings::from_config(&config),
    );

    let app = api::create_router(api::AppState::new(repo, Arc::new(service)));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
