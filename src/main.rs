use anyhow::Context;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use goldrate::api::rest::{create_router, ApiState};
use goldrate::broadcast::RateBroadcaster;
use goldrate::cache::RateCache;
use goldrate::catalog::MemoryCatalogStore;
use goldrate::config::loader::AppConfig;
use goldrate::engine::AdjustmentBook;
use goldrate::feeds::build_feeds;
use goldrate::feeds::resolver::Resolver;
use goldrate::interfaces::catalog_store::CatalogStore;
use goldrate::scheduler::Scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let env = std::env::var("GOLDRATE_ENV").unwrap_or_else(|_| "default".to_string());
    let config = AppConfig::load(&env).context("loading configuration")?;

    let feeds = build_feeds(&config.sources, config.refresh.feed_timeout())?;
    let resolver = Resolver::new(
        feeds,
        config.resolution.clone(),
        config.refresh.feed_timeout(),
    );
    let cache = Arc::new(RateCache::new(&config.refresh));
    let store: Arc<dyn CatalogStore> = Arc::new(MemoryCatalogStore::new());
    let adjustments = Arc::new(AdjustmentBook::new());
    let broadcaster = RateBroadcaster::new(goldrate::BROADCAST_CAPACITY);

    let scheduler = Scheduler::new(
        cache.clone(),
        resolver,
        store,
        broadcaster,
        adjustments.clone(),
        config.refresh.clone(),
        config.location.clone(),
    );
    scheduler.initialize_from_store().await;
    scheduler.clone().spawn_background();

    let state = Arc::new(ApiState {
        cache,
        scheduler,
        adjustments,
    });
    let router = create_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    tracing::info!(addr = %config.server.bind, "goldrate listening");
    axum::serve(listener, router).await?;
    Ok(())
}
