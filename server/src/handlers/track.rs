use axum::{
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};

use super::redirect::{client_ip, header_str};
use crate::{error::AppResult, AppState};

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub success: bool,
    pub message: &'static str,
}

/// POST /api/track/:code
///
/// Records a visit without redirecting. The code does not have to belong to a
/// link; such clicks are stored all the same.
pub async fn track_click(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> AppResult<Json<TrackResponse>> {
    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let user_agent = header_str(&headers, "user-agent").unwrap_or_default();
    let referer = header_str(&headers, "referer");

    state
        .recorder
        .record_click(&code, &ip, user_agent, referer)
        .await?;

    Ok(Json(TrackResponse {
        success: true,
        message: "Click tracked successfully",
    }))
}
