pub mod health;
pub mod pnl;
pub mod timeline;

use crate::db::Repository;
use crate::domain::Address;
use crate::error::AppError;
use crate::orchestration::ReportService;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub service: Arc<ReportService>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, service: Arc<ReportService>) -> Self {
        Self { repo, service }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/pnl", get(pnl::get_pnl))
        .route("/v1/timeline", get(timeline::get_timeline))
        .layer(cors)
        .with_state(state)
}

pub(crate) fn parse_user_address(input: &str) -> Result<Address, AppError> {
    Address::parse(input).map_err(|e| AppError::BadRequest(format!("Invalid user address: {}", e)))
}
