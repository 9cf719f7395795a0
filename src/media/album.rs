use super::{MediaError, MediaLibrary};
use crate::cache::naming;
use crate::composite;
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

impl MediaLibrary {
    /// Write the collage thumbnail of an album to `writer`, composing it from
    /// the album's media thumbnails on a miss.
    pub async fn write_album_thumbnail<W>(
        &self,
        writer: &mut W,
        relative_album_path: &str,
    ) -> Result<(), MediaError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let path = self.generate_album_thumbnail(relative_album_path).await?;
        let bytes = tokio::fs::read(&path).await?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Remove the collage of an album's current listing, so a file whose
    /// content changed under the same name shows up in a fresh one.
    pub async fn invalidate_album_thumbnail(&self, relative_album_path: &str) {
        let Ok(entries) = self.list_directory(relative_album_path).await else {
            return;
        };
        let files: Vec<&str> = entries
            .iter()
            .filter(|entry| !entry.is_folder())
            .map(|entry| entry.name.as_str())
            .collect();
        if files.is_empty() {
            return;
        }

        let key = naming::album_thumbnail_key(relative_album_path, &files);
        match self.cache().remove_album_thumbnail(&key).await {
            Ok(true) => debug!("Removed stale album thumbnail {}", key),
            Ok(false) => {}
            Err(e) => warn!("Unable to remove album thumbnail {}: {}", key, e),
        }
    }

    /// Path of the album collage, generating it if the album's current
    /// contents have no collage yet.
    pub async fn generate_album_thumbnail(&self, relative_album_path: &str) -> Result<PathBuf, MediaError> {
        if !self.config().gen_album_thumbs {
            return Err(MediaError::Disabled("Album thumbnails"));
        }

        let entries = self.list_directory(relative_album_path).await?;
        let files: Vec<&str> = entries
            .iter()
            .filter(|entry| !entry.is_folder())
            .map(|entry| entry.name.as_str())
            .collect();
        if files.is_empty() {
            return Err(MediaError::NotFound(format!(
                "{} (album has no media files)",
                relative_album_path
            )));
        }

        let key = naming::album_thumbnail_key(relative_album_path, &files);
        if let Some(path) = self.cache().album_thumbnail_path(&key).await? {
            return Ok(path);
        }

        let _guard = self.cache().lock_key(&key).await;
        if let Some(path) = self.cache().album_thumbnail_path(&key).await? {
            return Ok(path);
        }

        info!("Creating album thumbnail for {}", relative_album_path);
        let start = Instant::now();
        let layout = composite::CollageLayout::for_count(files.len());

        let mut tiles = Vec::with_capacity(layout.capacity());
        for file in &files {
            if tiles.len() >= layout.capacity() {
                break;
            }
            let relative_file = super::paths::join_relative(relative_album_path, file);
            match self.thumbnail_bytes(&relative_file).await {
                Ok(bytes) => match image::load_from_memory(&bytes) {
                    Ok(img) => tiles.push(img),
                    Err(e) => debug!("Skipping {} in collage: {}", relative_file, e),
                },
                Err(e) => debug!("Skipping {} in collage: {}", relative_file, e),
            }
        }

        let collage =
            tokio::task::spawn_blocking(move || composite::compose_album_collage(layout, &tiles)).await?;
        let path = self.cache().store_album_thumbnail(&key, collage).await?;

        info!(
            "Album thumbnail done for {} (conversion time: {} ms)",
            relative_album_path,
            start.elapsed().as_millis()
        );
        Ok(path)
    }
}
