use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linktrail::{
    config::AppConfig,
    geo::{DisabledLookup, GeoLookup, GeoResolver, IpApiLookup},
    seed,
    storage::{LinkStore, MemoryStore, SqliteStore},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (ignore error if file is absent; env vars may already be set)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linktrail=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Starting linktrail on {}:{}", config.host, config.port);
    tracing::info!("Base URL: {}", config.base_url);

    let store: Arc<dyn LinkStore> = match &config.database_url {
        Some(url) => {
            let store = SqliteStore::connect(url, config.database_max_connections)
                .await
                .with_context(|| format!("opening database {url}"))?;
            Arc::new(store)
        }
        None => {
            tracing::info!("No DATABASE_URL set; keeping links in memory");
            Arc::new(MemoryStore::new())
        }
    };

    if config.seed_sample_data {
        seed::seed_if_empty(store.as_ref()).await?;
    }

    let backend: Arc<dyn GeoLookup> = if config.geo_enabled {
        Arc::new(IpApiLookup::new(config.geo_endpoint.clone(), config.geo_timeout)?)
    } else {
        tracing::info!("Geolocation disabled");
        Arc::new(DisabledLookup)
    };
    let geo = GeoResolver::new(backend, config.geo_timeout)
        .with_cache_capacity(config.geo_cache_capacity);

    let bind_addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config, store, geo));
    let app = linktrail::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
