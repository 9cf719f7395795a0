// Media module - source tree access and the serving entry points
mod album;
pub mod catalog;
mod error;
pub mod orientation;
pub mod paths;
mod precache;
mod serve;
mod types;

pub use error::MediaError;
pub use types::*;

use crate::cache::ArtifactCache;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

pub type SharedLibrary = Arc<MediaLibrary>;

pub struct MediaLibrary {
    cache: Arc<ArtifactCache>,
    precache_in_progress: AtomicBool,
    /// Held for the whole of a top-level sweep
    sweep_lock: tokio::sync::Mutex<()>,
    /// Media-relative path of the cache root when it lives inside the media tree
    nested_cache_dir: Option<String>,
}

impl MediaLibrary {
    pub fn new(config: crate::MediaConfig, video: &crate::VideoConfig) -> Self {
        Self::with_cache(Arc::new(ArtifactCache::new(config, video)))
    }

    pub fn with_cache(cache: Arc<ArtifactCache>) -> Self {
        let nested_cache_dir = nested_cache_dir(cache.media_root(), cache.cache_root());
        if let Some(dir) = &nested_cache_dir {
            info!("Cache directory is inside the media tree, sweeps skip {:?}", dir);
        }
        Self {
            cache,
            precache_in_progress: AtomicBool::new(false),
            sweep_lock: tokio::sync::Mutex::new(()),
            nested_cache_dir,
        }
    }

    pub fn config(&self) -> &crate::MediaConfig {
        &self.cache.config
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    pub fn media_root(&self) -> &Path {
        self.cache.media_root()
    }

    pub fn full_media_path(&self, relative_path: &str) -> Result<PathBuf, MediaError> {
        paths::resolve(self.media_root(), relative_path)
    }

    pub fn relative_media_path(&self, full_path: &Path) -> Result<String, MediaError> {
        paths::relativize(self.media_root(), full_path)
    }

    pub fn is_precache_in_progress(&self) -> bool {
        self.precache_in_progress.load(Ordering::SeqCst)
    }

    /// Whether the configured frame extractor can be run on this host.
    pub fn has_video_thumbnail_support(&self) -> bool {
        self.cache.frame_extractor().is_available()
    }
}

fn nested_cache_dir(media_root: &Path, cache_root: &Path) -> Option<String> {
    let media_root = std::fs::canonicalize(media_root).ok()?;
    let cache_root = std::fs::canonicalize(cache_root).ok()?;
    paths::relativize(&media_root, &cache_root)
        .ok()
        .filter(|relative| !relative.is_empty())
}
