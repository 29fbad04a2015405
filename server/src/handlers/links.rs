use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::Link,
    registry::CreateLink,
    storage::InsertOutcome,
    AppState,
};

// ── Request / response types ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    #[serde(default)]
    pub url: String,
    pub custom_alias: Option<String>,
    pub expires_at: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkResponse {
    pub success: bool,
    pub link: Link,
    pub short_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// When present, return only this many links, newest first.
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LinksResponse {
    pub success: bool,
    pub links: Vec<Link>,
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub success: bool,
    pub link: Link,
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// POST /api/links
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateLinkRequest>, JsonRejection>,
) -> AppResult<Json<CreateLinkResponse>> {
    let Json(payload) = payload?;
    let outcome = state
        .registry
        .create_link(CreateLink {
            url: payload.url,
            custom_alias: payload.custom_alias,
            expires_at: payload.expires_at,
        })
        .await?;

    let message = match outcome {
        InsertOutcome::Created(_) => None,
        InsertOutcome::Existing(_) => Some("URL already shortened"),
    };
    let link = outcome.into_link();

    Ok(Json(CreateLinkResponse {
        success: true,
        short_url: state.config.short_url(&link.short_code),
        link,
        message,
    }))
}

/// GET /api/links
pub async fn list_links(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> AppResult<Json<LinksResponse>> {
    let Query(query) = query?;
    let links = match query.limit {
        Some(limit) => state.registry.recent(limit).await?,
        None => state.registry.list_all().await?,
    };

    Ok(Json(LinksResponse {
        success: true,
        links,
    }))
}

/// POST /api/links/:code/deactivate
pub async fn deactivate_link(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> AppResult<Json<LinkResponse>> {
    let link = state.registry.set_active(&code, false).await?;
    tracing::info!(short_code = %code, "link deactivated");
    Ok(Json(LinkResponse {
        success: true,
        link,
    }))
}

/// POST /api/links/:code/reactivate
pub async fn reactivate_link(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> AppResult<Json<LinkResponse>> {
    let link = state.registry.set_active(&code, true).await?;
    tracing::info!(short_code = %code, "link reactivated");
    Ok(Json(LinkResponse {
        success: true,
        link,
    }))
}
