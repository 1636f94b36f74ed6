use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Default encode quality when a request does not override it.
pub const DEFAULT_QUALITY: u8 = 50;

/// Default cache folder, relative to the cache root and used verbatim in URLs.
pub const DEFAULT_CACHE_FOLDER: &str = "upload/thumb";

/// How artifact filenames are derived from the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingPolicy {
    /// `<6 hex chars>_<sanitised base name>`
    Readable,
    /// Full key hex, no readable component.
    Hash,
}

impl std::fmt::Display for NamingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NamingPolicy::Readable => write!(f, "readable"),
            NamingPolicy::Hash => write!(f, "hash"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThumbCacheConfig {
    /// Base directory (may be an `@alias/...` path).
    pub cache_root: PathBuf,
    /// Subdirectory under `cache_root`, also the URL prefix.
    pub cache_folder: String,
    /// Entry lifetime in seconds; 0 never expires.
    pub cache_expire: u64,
    pub image_quality: u8,
    pub naming: NamingPolicy,
    pub absolute_url: bool,
    pub base_url: Option<String>,
    pub aliases: BTreeMap<String, PathBuf>,
    /// Directory that plain (non-alias) HTTP source paths must stay inside.
    /// Unset means only `@alias/...` sources are served over HTTP.
    pub source_root: Option<PathBuf>,
    /// HMAC secret for signed HTTP requests. Unset disables `DELETE /cache`.
    pub secret: Option<String>,
}

impl Default for ThumbCacheConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("./upload"),
            cache_folder: DEFAULT_CACHE_FOLDER.to_string(),
            cache_expire: 0,
            image_quality: DEFAULT_QUALITY,
            naming: NamingPolicy::Readable,
            absolute_url: false,
            base_url: None,
            aliases: BTreeMap::new(),
            source_root: None,
            secret: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Image quality must be within 1..=100, got {0}")] InvalidQuality(u8),
    #[error("Cache folder must be a non-empty relative path")] InvalidCacheFolder,
    #[error("Invalid alias name: {0}")] InvalidAlias(String),
    #[error("Secret cannot be empty")] EmptySecret,
    #[error("Invalid value for {name}: {value}")] InvalidEnv { name: &'static str, value: String },
}

impl ThumbCacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.image_quality) {
            return Err(ConfigError::InvalidQuality(self.image_quality));
        }
        let folder = self.cache_folder.trim_matches('/');
        if folder.is_empty() || Path::new(&self.cache_folder).is_absolute() {
            return Err(ConfigError::InvalidCacheFolder);
        }
        // `clear` removes this subtree, so it must stay below the root.
        let escapes = folder
            .split(|c: char| c == '/' || c == '\\')
            .any(|seg| matches!(seg, "" | "." | ".."))
            || Path::new(folder).components().any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(ConfigError::InvalidCacheFolder);
        }
        if matches!(&self.secret, Some(secret) if secret.trim().is_empty()) {
            return Err(ConfigError::EmptySecret);
        }
        for name in self.aliases.keys() {
            if name.is_empty() || name.contains('/') || name.starts_with('@') {
                return Err(ConfigError::InvalidAlias(name.clone()));
            }
        }
        Ok(())
    }

    /// Cache folder with surrounding slashes removed, as used in URLs.
    pub fn url_folder(&self) -> &str {
        self.cache_folder.trim_matches('/')
    }

    /// Builds a config from `THUMBCACHE_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(root) = lookup("THUMBCACHE_ROOT") {
            cfg.cache_root = PathBuf::from(root);
        }
        if let Some(folder) = lookup("THUMBCACHE_FOLDER") {
            cfg.cache_folder = folder;
        }
        if let Some(v) = lookup("THUMBCACHE_EXPIRE") {
            cfg.cache_expire = parse_env("THUMBCACHE_EXPIRE", &v)?;
        }
        if let Some(v) = lookup("THUMBCACHE_QUALITY") {
            cfg.image_quality = parse_env("THUMBCACHE_QUALITY", &v)?;
        }
        if let Some(v) = lookup("THUMBCACHE_USE_FILENAME") {
            cfg.naming = if parse_bool("THUMBCACHE_USE_FILENAME", &v)? {
                NamingPolicy::Readable
            } else {
                NamingPolicy::Hash
            };
        }
        if let Some(v) = lookup("THUMBCACHE_ABSOLUTE_URL") {
            cfg.absolute_url = parse_bool("THUMBCACHE_ABSOLUTE_URL", &v)?;
        }
        cfg.base_url = lookup("THUMBCACHE_BASE_URL").filter(|s| !s.is_empty());
        cfg.source_root = lookup("THUMBCACHE_SOURCE_ROOT").map(PathBuf::from);
        cfg.secret = lookup("THUMBCACHE_SECRET");
        if let Some(v) = lookup("THUMBCACHE_ALIASES") {
            for pair in v.split(',').filter(|p| !p.trim().is_empty()) {
                let (name, dir) = pair.split_once('=').ok_or_else(|| ConfigError::InvalidEnv {
                    name: "THUMBCACHE_ALIASES",
                    value: pair.to_string(),
                })?;
                cfg.aliases
                    .insert(name.trim().trim_start_matches('@').to_string(), PathBuf::from(dir.trim()));
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv { name, value: value.to_string() })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv { name, value: value.to_string() }),
    }
}
