use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsboard::cache::ResultCache;
use newsboard::comments::CommentStore;
use newsboard::config::{Config, Secrets};
use newsboard::db::ConnectionScope;
use newsboard::news::NewsClient;
use newsboard::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsboard=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load("dashboard.toml")?;
    let secrets = Secrets::from_env();
    info!(
        "Using {:?} news provider, results cached for {}s",
        config.provider.kind, config.cache_ttl_secs
    );
    if secrets.news_api_key.is_none() {
        warn!("NEWS_API_KEY is not set, searches will report a missing key");
    }

    // News search
    let client = NewsClient::new(config.provider.clone(), secrets.news_api_key)?;
    let news = ResultCache::new(client, Duration::from_secs(config.cache_ttl_secs));

    // Comment database
    let scope = ConnectionScope::new(secrets.database_url.as_deref())?;
    let comments = CommentStore::new(scope);
    if comments.is_configured() {
        match comments.ensure_schema().await {
            Ok(()) => info!("Comment database initialized"),
            Err(e) => warn!("Comment database unavailable: {}", e),
        }
    }

    let listen_addr = config.listen_addr.clone();
    let state = Arc::new(AppState {
        news,
        comments,
        config,
    });

    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("Server starting on http://{}", listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
