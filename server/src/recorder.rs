use chrono::Utc;
use std::sync::Arc;

use crate::error::AppResult;
use crate::geo::GeoResolver;
use crate::models::{Click, NewClick};
use crate::storage::LinkStore;

/// Appends visit events and keeps each link's counter in step.
#[derive(Clone)]
pub struct ClickRecorder {
    store: Arc<dyn LinkStore>,
    geo: GeoResolver,
}

impl ClickRecorder {
    pub fn new(store: Arc<dyn LinkStore>, geo: GeoResolver) -> Self {
        Self { store, geo }
    }

    /// Record one visit to `short_code`.
    ///
    /// Geolocation runs first and without any store lock held; a failed or
    /// slow lookup only means the click is stored without a location. The
    /// click is kept even when no link owns `short_code`.
    pub async fn record_click(
        &self,
        short_code: &str,
        ip_address: &str,
        user_agent: &str,
        referer: Option<&str>,
    ) -> AppResult<Click> {
        let location = self.geo.resolve(ip_address).await;

        let click = self
            .store
            .record_click(NewClick {
                short_code: short_code.to_owned(),
                timestamp: Utc::now(),
                ip_address: ip_address.to_owned(),
                user_agent: user_agent.to_owned(),
                referer: referer.filter(|r| !r.is_empty()).map(str::to_owned),
                location,
            })
            .await?;

        tracing::debug!(
            short_code = %click.short_code,
            located = click.location.is_some(),
            "recorded click"
        );
        Ok(click)
    }

    /// Full click history of one code, oldest first.
    pub async fn clicks_for(&self, short_code: &str) -> AppResult<Vec<Click>> {
        Ok(self.store.clicks_for(short_code).await?)
    }
}
