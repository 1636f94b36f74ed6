use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod cache;
pub mod config;
pub mod paths;
pub mod signature;
pub mod transform;

use crate::cache::ThumbnailStore;
use crate::config::{ConfigError, ThumbCacheConfig};
use crate::signature::{verify_signature, SignatureError};
use crate::transform::params::ThumbQuery;

pub use crate::cache::CacheStats;
pub use crate::transform::params::{ResizeMode, TransformSpec};

#[derive(Error, Debug)]
pub enum ThumbCacheError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing error: {0}")]
    Processing(String),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Expired: {0}")]
    Expired(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ThumbCacheError>;

impl ThumbCacheError {
    pub fn status(&self) -> StatusCode {
        match self {
            ThumbCacheError::NotFound(_) => StatusCode::NOT_FOUND,
            ThumbCacheError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ThumbCacheError::Processing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ThumbCacheError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ThumbCacheError::Expired(_) => StatusCode::GONE,
            ThumbCacheError::Forbidden(_) => StatusCode::FORBIDDEN,
            ThumbCacheError::Io(_) | ThumbCacheError::Config(_) | ThumbCacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ThumbCacheError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ThumbResponse {
    pub url: String,
    pub path: String,
}

/// Prefixes `relative` with the configured base URL, or the request host,
/// when the config asks for absolute URLs.
fn public_url(config: &ThumbCacheConfig, headers: &HeaderMap, relative: &str) -> String {
    if !config.absolute_url {
        return relative.to_string();
    }
    let base = match &config.base_url {
        Some(base) => base.clone(),
        None => match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
            Some(host) => format!("http://{}", host),
            None => String::new(),
        },
    };
    format!("{}/{}", base.trim_end_matches('/'), relative)
}

/// Runs blocking cache work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ThumbCacheError::Internal(e.to_string()))?
}

fn query_params(raw: Option<&str>) -> Result<BTreeMap<String, String>> {
    serde_urlencoded::from_str(raw.unwrap_or(""))
        .map_err(|e| ThumbCacheError::InvalidParameter(e.to_string()))
}

/// Checks the request signature when the config carries a secret.
fn authorize(config: &ThumbCacheConfig, endpoint: &str, params: &BTreeMap<String, String>) -> Result<()> {
    let Some(secret) = config.secret.as_deref() else {
        return Ok(());
    };
    let sig = params.get("sig").map(String::as_str).unwrap_or("");
    verify_signature(endpoint, params, sig, secret).map_err(|e| match e {
        SignatureError::Expired => ThumbCacheError::Expired(e.to_string()),
        _ => ThumbCacheError::Unauthorized(e.to_string()),
    })
}

async fn thumb_handler(
    State(store): State<Arc<ThumbnailStore>>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Result<Json<ThumbResponse>> {
    let params = query_params(raw.as_deref())?;
    authorize(store.config(), "/thumb", &params)?;
    let query: ThumbQuery = raw
        .as_deref()
        .unwrap_or("")
        .parse()
        .map_err(|e: serde_urlencoded::de::Error| ThumbCacheError::InvalidParameter(e.to_string()))?;

    tracing::debug!(
        "Thumbnail request: path={}, w={}, h={}, mode={:?}, q={:?}",
        query.path, query.w, query.h, query.mode, query.q
    );

    let worker = store.clone();
    let (path, relative) = blocking(move || {
        let spec = query.to_spec()?;
        let config = worker.config();
        let source = paths::resolve_within(
            Path::new(&query.path),
            &config.aliases,
            config.source_root.as_deref(),
        )?;
        let path = worker.generate(&source, &spec)?;
        let url = worker.url_for(&path)?;
        Ok((path, url))
    })
    .await?;

    Ok(Json(ThumbResponse {
        url: public_url(store.config(), &headers, &relative),
        path: path.display().to_string(),
    }))
}

/// Requires a configured secret and a signed request.
async fn clear_handler(
    State(store): State<Arc<ThumbnailStore>>,
    RawQuery(raw): RawQuery,
) -> Result<StatusCode> {
    if store.config().secret.is_none() {
        return Err(ThumbCacheError::Forbidden("cache clearing needs a configured secret".into()));
    }
    let params = query_params(raw.as_deref())?;
    authorize(store.config(), "/cache", &params)?;

    blocking(move || store.clear()).await?;
    tracing::info!("Thumbnail cache cleared");
    Ok(StatusCode::NO_CONTENT)
}

async fn cache_stats_handler(State(store): State<Arc<ThumbnailStore>>) -> Result<Json<CacheStats>> {
    let stats = blocking(move || store.stats()).await?;
    Ok(Json(stats))
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "thumbcache"
    }))
}

/// Builds the HTTP surface around a store: thumbnail generation, cache
/// maintenance, and static serving of the cache folder under its URL prefix.
pub fn router(store: Arc<ThumbnailStore>) -> Router {
    let static_prefix = format!("/{}", store.config().url_folder());
    let files = ServeDir::new(store.cache_dir());

    Router::new()
        .route("/health", get(health_handler))
        .route("/thumb", get(thumb_handler))
        .route("/cache", delete(clear_handler))
        .route("/stats/cache", get(cache_stats_handler))
        .with_state(store)
        .nest_service(&static_prefix, files)
        .layer(TraceLayer::new_for_http())
}
