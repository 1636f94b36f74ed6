use std::net::SocketAddr;
use std::sync::Arc;
use thumbcache::{cache::ThumbnailStore, config::ThumbCacheConfig, router};

/// Thumbnail cache server entry point.
///
/// # Configuration
/// Environment variables:
/// - `THUMBCACHE_ROOT`, `THUMBCACHE_FOLDER`: where thumbnails are stored
/// - `THUMBCACHE_EXPIRE`: entry lifetime in seconds, 0 never expires
/// - `THUMBCACHE_QUALITY`: default encode quality (1-100)
/// - `THUMBCACHE_USE_FILENAME`: readable file names instead of bare hashes
/// - `THUMBCACHE_ABSOLUTE_URL`, `THUMBCACHE_BASE_URL`: URL shape
/// - `THUMBCACHE_ALIASES`: `name=dir,name=dir` for `@name/...` paths
/// - `THUMBCACHE_SOURCE_ROOT`: directory plain `/thumb` source paths must stay in
/// - `THUMBCACHE_SECRET`: HMAC key for signed requests; required for `DELETE /cache`
/// - `PORT`: HTTP listen port (default: 8080)
/// - `RUST_LOG`: Logging verbosity (default: "thumbcache=debug,tower_http=debug")
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thumbcache=debug,tower_http=debug".into()),
        )
        .init();

    let cfg = ThumbCacheConfig::from_env()?;
    tracing::info!(
        "Starting thumbcache: root={}, folder={}, expire={}s, naming={}",
        cfg.cache_root.display(),
        cfg.cache_folder,
        cfg.cache_expire,
        cfg.naming
    );

    let store = Arc::new(ThumbnailStore::new(cfg)?);
    let app = router(store);

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server listening on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
