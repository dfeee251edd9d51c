use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use news_desk::aggregator::{start_staleness_check, Aggregator, Settings};
use news_desk::cache::{CacheStore, MemoryCacheStore, SqliteCacheStore};
use news_desk::config::Config;
use news_desk::fetcher::Rss2JsonClient;
use news_desk::render::DisplayClock;
use news_desk::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "news_desk=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("NEWS_DESK_CONFIG").unwrap_or_else(|_| "feeds.toml".to_string());
    let config = Config::load(&config_path)?;
    info!("Loaded {} feeds from {}", config.feeds.len(), config_path);

    // Initialize cache storage; an empty DATABASE_URL keeps the snapshot in memory
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:news_desk.db?mode=rwc".to_string());
    let store: Arc<dyn CacheStore> = if database_url.is_empty() {
        info!("Using in-memory news cache");
        Arc::new(MemoryCacheStore::new())
    } else {
        let store = SqliteCacheStore::new(&database_url).await?;
        store.initialize().await?;
        info!("Cache database initialized");
        Arc::new(store)
    };

    let client = Arc::new(Rss2JsonClient::new(&config.api_endpoint)?);
    let aggregator = Arc::new(Aggregator::new(
        config.feeds.clone().into(),
        client,
        store,
        Settings::from(&config),
    ));

    // Start background staleness check
    let bg_aggregator = aggregator.clone();
    let check_interval = config.staleness_check_interval();
    tokio::spawn(async move {
        start_staleness_check(bg_aggregator, check_interval).await;
    });

    let state = Arc::new(AppState {
        aggregator,
        clock: DisplayClock::from_config(&config),
        branding_image: config.branding_image.clone(),
    });

    let app = routes::router(state);

    // Start server
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
