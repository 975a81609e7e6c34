use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::{parse_user_address, AppState};
use crate::domain::PnlReport;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct PnlQuery {
    pub user: String,
}

/// Full report: summaries, trend, breakdown, timeline and diagnostics.
pub async fn get_pnl(
    Query(params): Query<PnlQuery>,
    State(state): State<AppState>,
) -> Result<Json<PnlReport>, AppError> {
    let user = parse_user_address(&params.user)?;
    let report = state.service.build_report(&user).await?;
    Ok(Json(report))
}
