use crate::cache::key::{locate, shard_of, ArtifactLocation, SourceImage};
use crate::cache::CacheStats;
use crate::config::{ConfigError, ThumbCacheConfig};
use crate::paths;
use crate::transform::params::TransformSpec;
use crate::transform::{ImageResizer, Resizer};
use crate::{Result, ThumbCacheError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;

/// Permissions for created cache directories.
#[cfg(unix)]
const DIR_MODE: u32 = 0o755;
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Filesystem-backed thumbnail cache.
///
/// There is no in-memory index: the presence of a file at the derived path is
/// the cache entry. Concurrent misses for one key may both run the resizer;
/// each result is written to a temp file and renamed into place, so readers
/// only ever see complete files.
///
/// `clear` holds the write side of an in-process lock while generation holds
/// the read side. Other processes sharing the folder are not coordinated.
pub struct ThumbnailStore {
    config: ThumbCacheConfig,
    cache_dir: PathBuf,
    resizer: Arc<dyn Resizer>,
    clear_lock: RwLock<()>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    generated: AtomicU64,
}

impl ThumbnailStore {
    /// Store using the `image` crate resizer.
    pub fn new(config: ThumbCacheConfig) -> Result<Self> {
        Self::with_resizer(config, Arc::new(ImageResizer))
    }

    pub fn with_resizer(config: ThumbCacheConfig, resizer: Arc<dyn Resizer>) -> Result<Self> {
        config.validate()?;
        let root = paths::resolve(&config.cache_root, &config.aliases)?;
        let cache_dir = paths::normalize(&root.join(config.url_folder()))?;
        if !cache_dir.starts_with(&root) || cache_dir == root {
            return Err(ConfigError::InvalidCacheFolder.into());
        }

        Ok(Self {
            config,
            cache_dir,
            resizer,
            clear_lock: RwLock::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            generated: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &ThumbCacheConfig {
        &self.config
    }

    /// `<cache_root>/<cache_folder>`, resolved and normalised.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Resolves `source`, validates `spec` and derives where its thumbnail lives.
    ///
    /// Does not touch the cache folder.
    pub fn locate(&self, source: impl AsRef<Path>, spec: &TransformSpec) -> Result<ArtifactLocation> {
        self.prepare(source.as_ref(), spec).map(|(_, loc)| loc)
    }

    fn prepare(&self, source: &Path, spec: &TransformSpec) -> Result<(SourceImage, ArtifactLocation)> {
        let source = SourceImage::open(paths::resolve(source, &self.config.aliases)?)?;
        spec.validate()?;
        let loc = locate(&self.cache_dir, self.config.naming, &source, spec);
        Ok((source, loc))
    }

    /// Returns the path of a fresh thumbnail for `source`, generating it on a
    /// miss or when the existing entry has outlived `cache_expire`.
    pub fn generate(&self, source: impl AsRef<Path>, spec: &TransformSpec) -> Result<PathBuf> {
        let (source, loc) = self.prepare(source.as_ref(), spec)?;

        let _guard = self.clear_lock.read().unwrap_or_else(|e| e.into_inner());

        if self.is_fresh(&loc.path)? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %loc.key, path = %loc.path.display(), "thumbnail cache hit");
            return Ok(loc.path);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %loc.key, source = %source.path().display(), "thumbnail cache miss");

        if !loc.shard_dir.is_dir() {
            create_dir(&loc.shard_dir)?;
        }

        let quality = spec.effective_quality(self.config.image_quality);
        let suffix = loc
            .path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let tmp = tempfile::Builder::new()
            .prefix(".tmp-")
            .suffix(&suffix)
            .tempfile_in(&loc.shard_dir)?;

        self.resizer
            .resize(source.path(), tmp.path(), spec.width, spec.height, spec.mode, quality)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file().set_permissions(fs::Permissions::from_mode(FILE_MODE))?;
        }
        tmp.persist(&loc.path).map_err(|e| ThumbCacheError::Io(e.error))?;

        self.generated.fetch_add(1, Ordering::Relaxed);
        Ok(loc.path)
    }

    /// Public URL for an already generated artifact:
    /// `<cache_folder>/<shard>/<filename>`.
    pub fn url_for(&self, artifact: &Path) -> Result<String> {
        let file_name = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ThumbCacheError::InvalidParameter(format!("{} has no usable file name", artifact.display()))
            })?;
        Ok(format!("{}/{}/{}", self.config.url_folder(), shard_of(file_name), file_name))
    }

    /// Generates (or reuses) the thumbnail and returns its public URL.
    pub fn url(&self, source: impl AsRef<Path>, spec: &TransformSpec) -> Result<String> {
        let path = self.generate(source, spec)?;
        self.url_for(&path)
    }

    /// Removes every cached thumbnail and recreates an empty cache folder.
    ///
    /// A missing folder counts as already cleared.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.clear_lock.write().unwrap_or_else(|e| e.into_inner());

        match fs::remove_dir_all(&self.cache_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        create_dir(&self.cache_dir)?;
        tracing::debug!(dir = %self.cache_dir.display(), "thumbnail cache cleared");
        Ok(())
    }

    /// Walks the shard directories and reports sizes plus this store's counters.
    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            generated: self.generated.load(Ordering::Relaxed),
            ..CacheStats::default()
        };

        let shards = match fs::read_dir(&self.cache_dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e.into()),
        };
        for shard in shards {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                let meta = entry.metadata()?;
                let is_temp = entry.file_name().to_string_lossy().starts_with(".tmp-");
                if meta.is_file() && !is_temp {
                    stats.entry_count += 1;
                    stats.total_bytes += meta.len();
                }
            }
        }
        Ok(stats)
    }

    /// Whether an entry exists at `path` and is within TTL. Stale entries are
    /// deleted here.
    fn is_fresh(&self, path: &Path) -> Result<bool> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if self.config.cache_expire == 0 {
            return Ok(true);
        }

        let modified = OffsetDateTime::from(meta.modified()?).unix_timestamp();
        let age = OffsetDateTime::now_utc().unix_timestamp() - modified;
        let ttl = i64::try_from(self.config.cache_expire).unwrap_or(i64::MAX);
        if age <= ttl {
            return Ok(true);
        }

        tracing::debug!(path = %path.display(), age, "thumbnail expired");
        self.expired.fetch_add(1, Ordering::Relaxed);
        match fs::remove_file(path) {
            Ok(()) => Ok(false),
            // Another caller already evicted it.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(dir)?;
    Ok(())
}
