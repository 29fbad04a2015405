use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Local;
use serde::Serialize;
use std::sync::Arc;

use crate::{
    analytics::{compute_analytics, Analytics},
    error::{AppError, AppResult},
    AppState,
};

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub success: bool,
    pub analytics: Analytics,
}

/// GET /api/analytics/:code
///
/// Day boundaries follow the server's local time zone.
pub async fn link_analytics(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> AppResult<Json<AnalyticsResponse>> {
    let link = state
        .registry
        .get_by_short_code(&code)
        .await?
        .ok_or(AppError::NotFound("Link"))?;

    let clicks = state.recorder.clicks_for(&code).await?;
    let analytics = compute_analytics(link, &clicks, Local::now().fixed_offset());

    if let Some(top) = analytics.top_countries.first() {
        tracing::debug!(short_code = %code, "top country {}", top);
    }

    Ok(Json(AnalyticsResponse {
        success: true,
        analytics,
    }))
}
