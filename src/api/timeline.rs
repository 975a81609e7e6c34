use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::api::{parse_user_address, AppState};
use crate::domain::TimelineEntry;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineFormat {
    Json,
    Csv,
}

impl TimelineFormat {
    /// `json` when absent or blank.
    fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(str::trim) {
            None | Some("") | Some("json") => Ok(TimelineFormat::Json),
            Some("csv") => Ok(TimelineFormat::Csv),
            Some(other) => Err(AppError::BadRequest(format!(
                "format must be json or csv, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    pub user: String,
    #[serde(default)]
    pub format: Option<String>,
}

pub async fn get_timeline(
    Query(params): Query<TimelineQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let user = parse_user_address(&params.user)?;
    let format = TimelineFormat::parse(params.format.as_deref())?;

    let report = state.service.build_report(&user).await?;
    match format {
        TimelineFormat::Json => Ok(Json(report.timeline).into_response()),
        TimelineFormat::Csv => {
            let body = timeline_csv(&report.timeline)?;
            Ok((
                [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
                body,
            )
                .into_response())
        }
    }
}

const CSV_HEADER: [&str; 11] = [
    "Date",
    "Kind",
    "Description",
    "Stable Change",
    "Volatile Change",
    "Cumulative Stable",
    "Cumulative Volatile",
    "Reference Price",
    "Total USD Value",
    "Avg Cost",
    "Key",
];

/// Render the timeline as CSV, one row per entry.
pub fn timeline_csv(timeline: &[TimelineEntry]) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for entry in timeline {
        let op = entry.operation();
        writer.write_record([
            entry.date().to_string(),
            op.kind.to_string(),
            op.description.clone(),
            op.stable_change.to_canonical_string(),
            op.volatile_change.to_canonical_string(),
            entry.cumulative_stable().to_canonical_string(),
            entry.cumulative_volatile().to_canonical_string(),
            entry.reference_price().to_canonical_string(),
            entry.total_usd_value().to_canonical_string(),
            entry
                .avg_cost()
                .map(|c| c.to_canonical_string())
                .unwrap_or_default(),
            op.key.clone(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(e.to_string()))
}
