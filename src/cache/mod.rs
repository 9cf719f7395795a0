// Artifact cache - derived thumbnails, previews and album collages
mod cleanup;
mod generate;
pub mod naming;
mod records;
mod video;

pub use records::{ArtifactKind, ArtifactRecords, KeyGuard, KeyedLocks};
pub use video::{FfmpegExtractor, FrameExtractor, VIDEO_ICON_MARGIN, VIDEO_ICON_SIZE, draw_video_icon};

use crate::media::{MediaError, paths};
use image::{DynamicImage, ImageEncoder, RgbaImage, codecs::jpeg::JpegEncoder};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const THUMBNAIL_SIDE: u32 = 256;

pub struct ArtifactCache {
    pub(crate) config: crate::MediaConfig,
    media_root: PathBuf,
    cache_root: PathBuf,
    enabled: bool,
    records: ArtifactRecords,
    locks: KeyedLocks,
    frame_extractor: Arc<dyn FrameExtractor>,
    video_icon: OnceLock<RgbaImage>,
    generation_attempts: AtomicUsize,
}

impl ArtifactCache {
    pub fn new(config: crate::MediaConfig, video: &crate::VideoConfig) -> Self {
        let extractor = Arc::new(FfmpegExtractor::from_config(video));
        Self::with_frame_extractor(config, extractor)
    }

    pub fn with_frame_extractor(
        config: crate::MediaConfig,
        frame_extractor: Arc<dyn FrameExtractor>,
    ) -> Self {
        let media_root = config.source_directory.clone();
        let cache_root = config.cache_directory.clone();

        let mut enabled = config.enable_thumb_cache || config.enable_preview;
        if enabled && let Err(e) = std::fs::create_dir_all(&cache_root) {
            warn!(
                "Unable to create cache directory {}, caching disabled: {}",
                cache_root.display(),
                e
            );
            enabled = false;
        }

        let records = if enabled {
            scan_cache_tree(&cache_root)
        } else {
            ArtifactRecords::default()
        };

        Self {
            config,
            media_root,
            cache_root,
            enabled,
            records,
            locks: KeyedLocks::default(),
            frame_extractor,
            video_icon: OnceLock::new(),
            generation_attempts: AtomicUsize::new(0),
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn records(&self) -> &ArtifactRecords {
        &self.records
    }

    pub fn frame_extractor(&self) -> &Arc<dyn FrameExtractor> {
        &self.frame_extractor
    }

    /// Number of times decode or frame extraction work was actually started.
    pub fn generation_attempts(&self) -> usize {
        self.generation_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn count_attempt(&self) {
        self.generation_attempts.fetch_add(1, Ordering::SeqCst);
    }

    /// Absolute path of a cache-relative key.
    pub fn full_cache_path(&self, relative_key: &str) -> Result<PathBuf, MediaError> {
        paths::resolve(&self.cache_root, relative_key)
    }

    pub(crate) fn video_icon(&self) -> &RgbaImage {
        self.video_icon.get_or_init(|| draw_video_icon(VIDEO_ICON_SIZE))
    }
}

/// Load the record maps from whatever artifacts already exist on disk.
fn scan_cache_tree(cache_root: &Path) -> ArtifactRecords {
    let mut thumbnails = Vec::new();
    let mut previews = Vec::new();
    let mut album_thumbnails = Vec::new();

    for entry in WalkDir::new(cache_root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let Ok(key) = paths::relativize(cache_root, entry.path()) else {
            continue;
        };
        let name = entry.file_name().to_string_lossy();

        if name.ends_with(naming::THUMBNAIL_SUFFIX) {
            thumbnails.push(key);
        } else if name.ends_with(naming::PREVIEW_SUFFIX) {
            previews.push(key);
        } else if naming::is_album_thumbnail_name(&name) {
            album_thumbnails.push(key);
        }
    }

    info!(
        "Loaded cache index from {}: {} thumbnails, {} previews, {} album thumbnails",
        cache_root.display(),
        thumbnails.len(),
        previews.len(),
        album_thumbnails.len()
    );

    ArtifactRecords::from_scan(thumbnails, previews, album_thumbnails)
}

/// Encode an image as baseline JPEG. Alpha is dropped.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, MediaError> {
    let rgb_image = image.to_rgb8();
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder.write_image(
        &rgb_image,
        rgb_image.width(),
        rgb_image.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(buffer)
}

/// Write `bytes` to `path` through a `.part` sibling and a rename, creating
/// parent directories as needed.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MediaError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut part = path.as_os_str().to_owned();
    part.push(naming::PARTIAL_SUFFIX);
    let part = PathBuf::from(part);

    std::fs::write(&part, bytes)?;
    if let Err(e) = std::fs::rename(&part, path) {
        let _ = std::fs::remove_file(&part);
        return Err(e.into());
    }

    debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
