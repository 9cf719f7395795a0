use super::{MediaError, MediaKind, MediaLibrary, PrecacheStatistics, PreviewOutcome};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Marks a sweep as running and puts back the previous value when dropped,
/// so a nested sweep never clears the flag of the sweep around it.
struct ProgressGuard<'a> {
    flag: &'a AtomicBool,
    previous: bool,
}

impl<'a> ProgressGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        let previous = flag.swap(true, Ordering::SeqCst);
        Self { flag, previous }
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::SeqCst);
    }
}

impl MediaLibrary {
    /// Walk `relative_path` (and optionally every folder below it) and build
    /// missing thumbnails and previews.
    ///
    /// Only one sweep runs at a time; a second caller waits for the running
    /// sweep to finish before starting its own.
    pub async fn sweep(
        &self,
        relative_path: &str,
        recursive: bool,
        thumbnails: bool,
        previews: bool,
    ) -> PrecacheStatistics {
        let _running = match self.sweep_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Another precache sweep is running, waiting for it to finish");
                self.sweep_lock.lock().await
            }
        };
        self.sweep_folder(relative_path, recursive, thumbnails, previews)
            .await
    }

    fn sweep_folder<'a>(
        &'a self,
        relative_path: &'a str,
        recursive: bool,
        thumbnails: bool,
        previews: bool,
    ) -> Pin<Box<dyn Future<Output = PrecacheStatistics> + Send + 'a>> {
        Box::pin(async move {
            let _progress = ProgressGuard::enter(&self.precache_in_progress);
            let mut stats = PrecacheStatistics::default();

            let entries = match self.list_directory(relative_path).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Unable to list {}: {}", relative_path, e);
                    stats.failed_folders = 1;
                    return stats;
                }
            };

            for entry in &entries {
                match entry.kind {
                    MediaKind::Folder => {
                        if self.nested_cache_dir.as_deref() == Some(entry.path.as_str()) {
                            debug!("Skipping cache directory {}", entry.path);
                            continue;
                        }
                        if recursive {
                            stats.folders += 1;
                            stats += self
                                .sweep_folder(&entry.path, true, thumbnails, previews)
                                .await;
                        }
                    }
                    MediaKind::Image | MediaKind::Video => {
                        stats += self.precache_file(&entry.path, entry.kind, thumbnails, previews).await;
                    }
                }
            }

            if self.config().enable_cache_cleanup {
                stats.removed_cache_files += self.cache().cleanup_cache(relative_path, &entries).await;
            }

            stats
        })
    }

    async fn precache_file(
        &self,
        relative_path: &str,
        kind: MediaKind,
        thumbnails: bool,
        previews: bool,
    ) -> PrecacheStatistics {
        let mut stats = PrecacheStatistics::default();
        match kind {
            MediaKind::Image => stats.images += 1,
            MediaKind::Video => stats.videos += 1,
            MediaKind::Folder => return stats,
        }

        let has_exif_thumbnail =
            !self.config().ignore_exif_thumbs && self.has_embedded_thumbnail(relative_path).await;
        if has_exif_thumbnail {
            stats.exif_thumbnails += 1;
        }

        if thumbnails && !has_exif_thumbnail && !self.cache().has_thumbnail(relative_path).await {
            let result = self.cache().generate_thumbnail(relative_path).await;
            match (kind, result) {
                (MediaKind::Video, Ok(_)) => stats.video_thumbnails += 1,
                (MediaKind::Video, Err(_)) => stats.failed_video_thumbnails += 1,
                (_, Ok(_)) => stats.image_thumbnails += 1,
                (_, Err(_)) => stats.failed_image_thumbnails += 1,
            }
        }

        if previews && kind == MediaKind::Image && !self.cache().has_preview(relative_path).await {
            match self.cache().generate_preview(relative_path).await {
                Ok(PreviewOutcome::Ready(_)) => stats.image_previews += 1,
                Ok(PreviewOutcome::TooSmall) => stats.small_images += 1,
                Err(_) => stats.failed_image_previews += 1,
            }
        }

        stats
    }

    /// Sweep the whole media tree, logging timing and statistics.
    pub async fn precache_all(&self, thumbnails: bool, previews: bool) -> PrecacheStatistics {
        info!(
            "Pre-generating cache (thumbnails: {}, previews: {})",
            thumbnails, previews
        );
        let start = Instant::now();
        let stats = self.sweep("", true, thumbnails, previews).await;

        let elapsed = start.elapsed().as_secs();
        info!(
            "Generating cache took {} minutes and {} seconds",
            elapsed / 60,
            elapsed % 60
        );
        for line in stats.to_string().lines() {
            info!("{}", line);
        }
        stats
    }

    /// Drop every artifact derived from a file whose content was replaced,
    /// including its album's collage, then build the "on add" artifacts
    /// again.
    pub async fn process_changed_file(&self, relative_path: &str) -> Result<(), MediaError> {
        let removed = self.cache().remove_artifacts(relative_path).await?;
        if removed > 0 {
            debug!("Dropped {} stale artifacts of {}", removed, relative_path);
        }
        let (album, _) = super::paths::split_relative(relative_path);
        self.invalidate_album_thumbnail(album).await;
        self.process_added_file(relative_path).await
    }

    /// Build the configured "on add" artifacts for a file that just appeared.
    pub async fn process_added_file(&self, relative_path: &str) -> Result<(), MediaError> {
        let config = self.config();
        let thumbnails = config.enable_thumb_cache && config.gen_thumbs_on_add;
        let previews = config.enable_preview && config.gen_preview_on_add;
        let (_, file_name) = super::paths::split_relative(relative_path);
        let Some(kind) = super::catalog::file_kind(file_name) else {
            return Ok(());
        };

        if thumbnails {
            let has_exif_thumbnail =
                !config.ignore_exif_thumbs && self.has_embedded_thumbnail(relative_path).await;
            if !has_exif_thumbnail {
                self.cache().generate_thumbnail(relative_path).await?;
            }
        }

        if previews && kind == MediaKind::Image {
            match self.cache().generate_preview(relative_path).await? {
                PreviewOutcome::Ready(path) => debug!("Preview ready at {}", path.display()),
                PreviewOutcome::TooSmall => debug!("No preview needed for {}", relative_path),
            }
        }

        Ok(())
    }
}
