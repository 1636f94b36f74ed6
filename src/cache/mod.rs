pub mod disk;
pub mod key;

pub use disk::ThumbnailStore;
pub use key::{ArtifactLocation, CacheKey, SourceImage};

use serde::Serialize;

/// Snapshot of what a store holds and how it has been used.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Thumbnail files currently on disk.
    pub entry_count: u64,
    pub total_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed because they outlived the TTL.
    pub expired: u64,
    pub generated: u64,
}
