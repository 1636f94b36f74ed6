//! Cache key derivation and artifact naming.
//!
//! The key covers the normalised source path, the requested box, the resize
//! mode and the source mtime. Editing the source changes its mtime and
//! therefore the key; the old artifact is simply never looked up again.
//! Quality and the custom display name are deliberately left out, so two
//! requests differing only in those share one entry.

use crate::config::NamingPolicy;
use crate::transform::params::TransformSpec;
use crate::{Result, ThumbCacheError};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use time::OffsetDateTime;

/// Hex characters kept from the key in readable names.
pub const SHORT_HASH_LEN: usize = 6;

/// Length of the shard directory name.
pub const SHARD_LEN: usize = 2;

static UNSAFE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.\-]+").expect("valid regex"));
static TRAILING_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[A-Za-z0-9_]+$").expect("valid regex"));

/// A source image as seen by the cache: where it lives and when it last changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    path: PathBuf,
    mtime: i64,
}

impl SourceImage {
    /// Reads metadata for an already normalised path.
    ///
    /// # Errors
    /// `NotFound` if the path is missing or not a regular file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let meta = match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(ThumbCacheError::NotFound(format!("{} is not a file", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ThumbCacheError::NotFound(format!("File {} doesn't exist", path.display())))
            }
            Err(e) => return Err(e.into()),
        };
        let mtime = OffsetDateTime::from(meta.modified()?).unix_timestamp();
        Ok(Self { path, mtime })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last modification time in Unix seconds.
    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn extension(&self) -> Option<String> {
        self.path.extension().map(|e| e.to_string_lossy().into_owned())
    }
}

/// SHA-256 hex digest identifying one (source, transform) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(source: &SourceImage, spec: &TransformSpec) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.path.as_os_str().as_encoded_bytes());
        for field in [
            spec.width.to_string(),
            spec.height.to_string(),
            spec.mode.code().to_string(),
            source.mtime.to_string(),
        ] {
            hasher.update(b"|");
            hasher.update(field.as_bytes());
        }
        CacheKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..SHORT_HASH_LEN]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replaces every run of characters outside `[A-Za-z0-9_.-]` with one `-`.
pub fn sanitize_name(name: &str) -> String {
    UNSAFE_RUN.replace_all(name, "-").into_owned()
}

/// Drops a trailing `.ext` from a user supplied name.
pub fn strip_extension(name: &str) -> &str {
    match TRAILING_EXT.find(name) {
        Some(m) => &name[..m.start()],
        None => name,
    }
}

/// First two characters of a filename, used as its shard directory.
pub fn shard_of(file_name: &str) -> &str {
    match file_name.char_indices().nth(SHARD_LEN) {
        Some((idx, _)) => &file_name[..idx],
        None => file_name,
    }
}

/// Fully derived location of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub key: CacheKey,
    /// File name without extension.
    pub stem: String,
    /// `<cache_dir>/<shard>`
    pub shard_dir: PathBuf,
    /// `<cache_dir>/<shard>/<stem><.ext>`
    pub path: PathBuf,
}

/// Derives the key, file stem and artifact path for a request.
pub fn locate(
    cache_dir: &Path,
    naming: NamingPolicy,
    source: &SourceImage,
    spec: &TransformSpec,
) -> ArtifactLocation {
    let key = CacheKey::derive(source, spec);

    let stem = match naming {
        NamingPolicy::Readable => {
            let base = match spec.file_name.as_deref() {
                Some(custom) => strip_extension(custom).to_string(),
                None => source.stem(),
            };
            format!("{}_{}", key.short(), sanitize_name(&base))
        }
        NamingPolicy::Hash => key.as_str().to_string(),
    };

    let file_name = match source.extension() {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem.clone(),
    };
    let shard_dir = cache_dir.join(shard_of(&stem));
    let path = shard_dir.join(file_name);

    ArtifactLocation { key, stem, shard_dir, path }
}
