use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::{net::SocketAddr, sync::Arc};

use crate::{error::AppResult, registry::RedirectTarget, AppState};

/// Fallback when neither proxy headers nor the socket reveal a client.
pub const UNKNOWN_CLIENT_IP: &str = "127.0.0.1";

/// GET /:code
///
/// Only live links redirect. The visit is recorded in a background task so
/// geolocation never holds up the 302.
pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let original_url = match state.registry.resolve_for_redirect(&code, Utc::now()).await? {
        RedirectTarget::Redirect(url) => url,
        RedirectTarget::NotFound => {
            return Ok((StatusCode::NOT_FOUND, "Short link not found").into_response());
        }
        RedirectTarget::Expired => {
            return Ok((StatusCode::GONE, "Short link has expired").into_response());
        }
    };

    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let user_agent = header_str(&headers, "user-agent").unwrap_or_default().to_owned();
    let referer = header_str(&headers, "referer").map(str::to_owned);

    let recorder = state.recorder.clone();
    tokio::spawn(async move {
        if let Err(e) = recorder
            .record_click(&code, &ip, &user_agent, referer.as_deref())
            .await
        {
            tracing::error!("Click logging failed for '{}': {:?}", code, e);
        }
    });

    Ok((StatusCode::FOUND, [(header::LOCATION, original_url)]).into_response())
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// Determine the real client IP, preferring common proxy headers.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    // X-Forwarded-For can be a comma-separated list; take the first entry.
    if let Some(xff) = header_str(headers, "x-forwarded-for") {
        if let Some(ip) = xff.split(',').next().map(str::trim) {
            if !ip.is_empty() {
                return ip.to_owned();
            }
        }
    }

    for name in ["x-real-ip", "remote-addr"] {
        if let Some(value) = header_str(headers, name).map(str::trim) {
            if !value.is_empty() {
                return value.to_owned();
            }
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT_IP.to_owned())
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
