use super::{ArtifactCache, ArtifactKind, naming};
use crate::media::{MediaEntry, MediaError, paths};
use std::collections::HashSet;
use tracing::{debug, info, warn};

impl ArtifactCache {
    /// Remove everything in the mirrored cache directory of `relative_path`
    /// that does not belong to one of `expected_entries`.
    ///
    /// Kept: sub-folder names, thumbnail/preview names and their error
    /// markers, and the album collage named after the current listing.
    /// Returns the number of removed files and directories.
    pub async fn cleanup_cache(&self, relative_path: &str, expected_entries: &[MediaEntry]) -> usize {
        let cache_dir = match self.full_cache_path(relative_path) {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Not cleaning up {}: {}", relative_path, e);
                return 0;
            }
        };
        debug!("Cleaning up directory: {}", cache_dir.display());

        let allowed = allowed_cache_names(relative_path, expected_entries);

        let mut entries = match tokio::fs::read_dir(&cache_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Nothing to clean up in {}: {}", cache_dir.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Error while reading {}: {}", cache_dir.display(), e);
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().to_string();
            // Scratch files belong to generations running right now
            if allowed.contains(&name) || naming::is_temporary_name(&name) {
                continue;
            }

            let path = entry.path();
            debug!("Removing {}", path.display());
            let result = match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => tokio::fs::remove_dir_all(&path).await,
                _ => tokio::fs::remove_file(&path).await,
            };
            match result {
                Ok(()) => {
                    removed += 1;
                    self.forget(&paths::join_relative(relative_path, &name)).await;
                }
                Err(e) => warn!("Unable to remove {}: {}", path.display(), e),
            }
        }

        removed
    }

    /// Remove the thumbnail, preview and both error markers of a media file.
    /// Returns the number of files deleted.
    pub async fn remove_artifacts(&self, relative_media_path: &str) -> Result<usize, MediaError> {
        let thumbnail = naming::thumbnail_key(relative_media_path)?;
        let preview = naming::preview_key(relative_media_path)?;
        let keys = [
            naming::error_marker_key(&thumbnail),
            naming::error_marker_key(&preview),
            thumbnail.clone(),
            preview.clone(),
        ];

        let mut removed = 0;
        for key in &keys {
            let path = self.full_cache_path(key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("Removed {}", path.display());
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Unable to remove {}: {}", path.display(), e),
            }
        }

        self.records.remove(ArtifactKind::Thumbnail, &thumbnail).await;
        self.records.remove(ArtifactKind::Preview, &preview).await;

        if removed > 0 {
            info!("Removed cached artifacts for {}", relative_media_path);
        }
        Ok(removed)
    }

    /// Remove one album collage and its record.
    pub async fn remove_album_thumbnail(&self, album_key: &str) -> Result<bool, MediaError> {
        let path = self.full_cache_path(album_key)?;
        let _guard = self.lock_key(album_key).await;
        self.records.remove(ArtifactKind::AlbumThumbnail, album_key).await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the mirrored cache subtree of a deleted media directory.
    pub async fn remove_directory(&self, relative_dir: &str) -> Result<bool, MediaError> {
        if relative_dir.is_empty() {
            return Err(MediaError::PathEscape(relative_dir.to_string()));
        }
        let cache_dir = self.full_cache_path(relative_dir)?;
        let purged = self.records.remove_under(relative_dir).await;

        match tokio::fs::remove_dir_all(&cache_dir).await {
            Ok(()) => {
                info!(
                    "Removed cache directory {} ({} indexed artifacts)",
                    cache_dir.display(),
                    purged
                );
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn forget(&self, key: &str) {
        for kind in [
            ArtifactKind::Thumbnail,
            ArtifactKind::Preview,
            ArtifactKind::AlbumThumbnail,
        ] {
            self.records.remove(kind, key).await;
        }
        self.records.remove_under(key).await;
    }
}

fn allowed_cache_names(relative_path: &str, expected_entries: &[MediaEntry]) -> HashSet<String> {
    let mut allowed = HashSet::with_capacity(expected_entries.len() * 4 + 1);
    let mut media_files = Vec::new();

    for entry in expected_entries {
        if entry.is_folder() {
            allowed.insert(entry.name.clone());
            continue;
        }

        media_files.push(entry.name.as_str());
        for key in [naming::thumbnail_key(&entry.name), naming::preview_key(&entry.name)]
            .into_iter()
            .flatten()
        {
            allowed.insert(naming::error_marker_key(&key));
            allowed.insert(key);
        }
    }

    if !media_files.is_empty() {
        allowed.insert(naming::album_thumbnail_name(relative_path, &media_files));
    }
    allowed
}
