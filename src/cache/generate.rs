use super::video::overlay_video_icon;
use super::{ArtifactCache, ArtifactKind, THUMBNAIL_SIDE, encode_jpeg, naming, write_atomic};
use crate::media::{MediaError, MediaKind, PreviewOutcome, catalog, orientation, paths};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

impl ArtifactCache {
    pub fn thumbnail_path(&self, relative_media_path: &str) -> Result<PathBuf, MediaError> {
        self.full_cache_path(&naming::thumbnail_key(relative_media_path)?)
    }

    pub fn preview_path(&self, relative_media_path: &str) -> Result<PathBuf, MediaError> {
        self.full_cache_path(&naming::preview_key(relative_media_path)?)
    }

    pub fn error_marker_path(&self, artifact_key: &str) -> Result<PathBuf, MediaError> {
        self.full_cache_path(&naming::error_marker_key(artifact_key))
    }

    /// Whether a thumbnail for this media file is recorded in the index.
    pub async fn has_thumbnail(&self, relative_media_path: &str) -> bool {
        match naming::thumbnail_key(relative_media_path) {
            Ok(key) => self.records.contains(ArtifactKind::Thumbnail, &key).await,
            Err(_) => false,
        }
    }

    pub async fn has_preview(&self, relative_media_path: &str) -> bool {
        match naming::preview_key(relative_media_path) {
            Ok(key) => self.records.contains(ArtifactKind::Preview, &key).await,
            Err(_) => false,
        }
    }

    pub async fn has_album_thumbnail(&self, album_key: &str) -> bool {
        self.records.contains(ArtifactKind::AlbumThumbnail, album_key).await
    }

    /// Return the cached thumbnail of a media file, generating it first if
    /// needed.
    pub async fn generate_thumbnail(&self, relative_media_path: &str) -> Result<PathBuf, MediaError> {
        if !self.enabled || !self.config.enable_thumb_cache {
            return Err(MediaError::Disabled("Thumbnail cache"));
        }

        let key = naming::thumbnail_key(relative_media_path)?;
        let artifact = self.full_cache_path(&key)?;
        if let Some(path) = self.existing_artifact(ArtifactKind::Thumbnail, &key, &artifact).await {
            return Ok(path);
        }
        self.check_error_marker(&key).await?;

        let _guard = self.locks.acquire(&key).await;
        // Another caller may have finished while we waited
        if let Some(path) = self.existing_artifact(ArtifactKind::Thumbnail, &key, &artifact).await {
            return Ok(path);
        }
        self.check_error_marker(&key).await?;

        let source = self.existing_source(relative_media_path).await?;
        let (_, file_name) = paths::split_relative(relative_media_path);
        let kind = catalog::file_kind(file_name)
            .ok_or_else(|| MediaError::UnsupportedType(relative_media_path.to_string()))?;

        info!("Creating new thumbnail for {}", relative_media_path);
        let start = Instant::now();
        self.count_attempt();

        let result = match kind {
            MediaKind::Video => self.render_video_thumbnail(&source, &artifact).await,
            _ => {
                let quality = self.config.jpeg_quality;
                let artifact = artifact.clone();
                tokio::task::spawn_blocking(move || {
                    let bytes = render_image_thumbnail(&source, quality)?;
                    write_atomic(&artifact, &bytes)
                })
                .await
                .map_err(MediaError::from)
                .and_then(|r| r)
            }
        };

        match result {
            Ok(()) => {
                self.records.insert(ArtifactKind::Thumbnail, &key).await;
                info!(
                    "Thumbnail done for {} (conversion time: {} ms)",
                    relative_media_path,
                    start.elapsed().as_millis()
                );
                Ok(artifact)
            }
            Err(e) => {
                self.memoize_failure(&key, &e).await;
                Err(e)
            }
        }
    }

    /// Return the cached preview of an image, generating it first if needed.
    ///
    /// Images that already fit within the preview size produce
    /// [`PreviewOutcome::TooSmall`] unless previews for small images are on.
    pub async fn generate_preview(
        &self,
        relative_media_path: &str,
    ) -> Result<PreviewOutcome, MediaError> {
        if !self.enabled || !self.config.enable_preview {
            return Err(MediaError::Disabled("Preview"));
        }

        let (_, file_name) = paths::split_relative(relative_media_path);
        if !catalog::is_image(file_name) {
            return Err(MediaError::UnsupportedType(format!(
                "{} (only images support preview)",
                relative_media_path
            )));
        }

        let key = naming::preview_key(relative_media_path)?;
        let artifact = self.full_cache_path(&key)?;
        if let Some(path) = self.existing_artifact(ArtifactKind::Preview, &key, &artifact).await {
            return Ok(PreviewOutcome::Ready(path));
        }
        self.check_error_marker(&key).await?;

        let _guard = self.locks.acquire(&key).await;
        if let Some(path) = self.existing_artifact(ArtifactKind::Preview, &key, &artifact).await {
            return Ok(PreviewOutcome::Ready(path));
        }
        self.check_error_marker(&key).await?;

        let source = self.existing_source(relative_media_path).await?;
        let max_side = self.config.preview_max_side;
        let small_images = self.config.gen_preview_for_small_images;
        let quality = self.config.jpeg_quality;

        self.count_attempt();
        let probe_source = source.clone();
        let dimensions = tokio::task::spawn_blocking(move || orientation::image_dimensions(&probe_source))
            .await
            .map_err(MediaError::from)
            .and_then(|r| r);
        let (width, height) = match dimensions {
            Ok(dimensions) => dimensions,
            Err(e) => {
                self.memoize_failure(&key, &e).await;
                return Err(e);
            }
        };

        if !small_images && width <= max_side && height <= max_side {
            trace!("Image {} too small to generate preview", relative_media_path);
            return Ok(PreviewOutcome::TooSmall);
        }

        info!("Creating new preview file for {}", relative_media_path);
        let start = Instant::now();
        let target = artifact.clone();
        let result = tokio::task::spawn_blocking(move || {
            let img = orientation::open_oriented(&source)?;
            let preview = fit_within(img, max_side);
            write_atomic(&target, &encode_jpeg(&preview, quality)?)
        })
        .await
        .map_err(MediaError::from)
        .and_then(|r| r);

        match result {
            Ok(()) => {
                self.records.insert(ArtifactKind::Preview, &key).await;
                info!(
                    "Preview done for {} (conversion time: {} ms)",
                    relative_media_path,
                    start.elapsed().as_millis()
                );
                Ok(PreviewOutcome::Ready(artifact))
            }
            Err(e) => {
                self.memoize_failure(&key, &e).await;
                Err(e)
            }
        }
    }

    /// Path of an existing album collage, if one has been stored.
    pub async fn album_thumbnail_path(&self, album_key: &str) -> Result<Option<PathBuf>, MediaError> {
        let artifact = self.full_cache_path(album_key)?;
        Ok(self
            .existing_artifact(ArtifactKind::AlbumThumbnail, album_key, &artifact)
            .await)
    }

    /// Encode and store a composed album collage under `album_key`.
    pub async fn store_album_thumbnail(
        &self,
        album_key: &str,
        collage: DynamicImage,
    ) -> Result<PathBuf, MediaError> {
        if !self.enabled {
            return Err(MediaError::Disabled("Thumbnail cache"));
        }

        let artifact = self.full_cache_path(album_key)?;
        let quality = self.config.jpeg_quality;
        let target = artifact.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &encode_jpeg(&collage, quality)?))
            .await??;

        self.records.insert(ArtifactKind::AlbumThumbnail, album_key).await;
        debug!("Stored album thumbnail {}", album_key);
        Ok(artifact)
    }

    /// Serialize work on one artifact key across all callers.
    pub async fn lock_key(&self, key: &str) -> super::KeyGuard<'_> {
        self.locks.acquire(key).await
    }

    async fn existing_artifact(
        &self,
        kind: ArtifactKind,
        key: &str,
        artifact: &Path,
    ) -> Option<PathBuf> {
        if !tokio::fs::try_exists(artifact).await.unwrap_or(false) {
            return None;
        }
        if !self.records.contains(kind, key).await {
            self.records.insert(kind, key).await;
        }
        Some(artifact.to_path_buf())
    }

    async fn existing_source(&self, relative_media_path: &str) -> Result<PathBuf, MediaError> {
        let source = paths::resolve(&self.media_root, relative_media_path)?;
        match tokio::fs::metadata(&source).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(MediaError::UnsupportedType(relative_media_path.to_string())),
            Err(e) => return Err(MediaError::from_open(&source, e)),
        }
        // Sources held by a copier surface as FileLocked, never as a
        // decode or extractor failure
        tokio::fs::File::open(&source)
            .await
            .map_err(|e| MediaError::from_open(&source, e))?;
        Ok(source)
    }

    async fn check_error_marker(&self, key: &str) -> Result<(), MediaError> {
        let marker = self.error_marker_path(key)?;
        match tokio::fs::read_to_string(&marker).await {
            Ok(reason) => {
                trace!("Skipping {} since it has failed before", key);
                Err(MediaError::PermanentlyFailed {
                    key: key.to_string(),
                    reason: reason.trim().to_string(),
                })
            }
            Err(_) => Ok(()),
        }
    }

    async fn memoize_failure(&self, key: &str, err: &MediaError) {
        if !err.is_memoizable() {
            warn!("Unable to generate {}: {}", key, err);
            return;
        }

        error!("Unable to generate {}, marking as failed: {}", key, err);
        let marker = match self.error_marker_path(key) {
            Ok(marker) => marker,
            Err(e) => {
                warn!("No error marker for {}: {}", key, e);
                return;
            }
        };
        let reason = err.to_string();
        let result = tokio::task::spawn_blocking(move || write_atomic(&marker, reason.as_bytes()))
            .await
            .map_err(MediaError::from)
            .and_then(|r| r);
        if let Err(e) = result {
            warn!("Unable to write error marker for {}: {}", key, e);
        }
    }

    async fn render_video_thumbnail(&self, source: &Path, artifact: &Path) -> Result<(), MediaError> {
        let mut screenshot = artifact.as_os_str().to_owned();
        screenshot.push(naming::FRAME_SUFFIX);
        let screenshot = PathBuf::from(screenshot);

        if let Some(parent) = screenshot.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        self.frame_extractor.extract_frame(source, &screenshot).await?;

        let icon = self.video_icon().clone();
        let quality = self.config.jpeg_quality;
        let frame = screenshot.clone();
        let target = artifact.to_path_buf();
        let result = tokio::task::spawn_blocking(move || {
            let img = orientation::open_oriented(&frame)?;
            let thumbnail = overlay_video_icon(fit_within(img, THUMBNAIL_SIDE), &icon);
            write_atomic(&target, &encode_jpeg(&thumbnail, quality)?)
        })
        .await;

        if let Err(e) = tokio::fs::remove_file(&screenshot).await {
            debug!("Could not remove {}: {}", screenshot.display(), e);
        }

        result?
    }
}

/// Decode, orient and shrink an image into the thumbnail box.
pub(crate) fn render_image_thumbnail(source: &Path, quality: u8) -> Result<Vec<u8>, MediaError> {
    let img = orientation::open_oriented(source)?;
    encode_jpeg(&fit_within(img, THUMBNAIL_SIDE), quality)
}

/// Shrink to fit a `max_side` square, keeping the aspect ratio. Never upscales.
pub(crate) fn fit_within(img: DynamicImage, max_side: u32) -> DynamicImage {
    if img.width() <= max_side && img.height() <= max_side {
        img
    } else {
        img.thumbnail(max_side, max_side)
    }
}
