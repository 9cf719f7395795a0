use super::{MediaEntry, MediaError, MediaLibrary, PreviewOutcome, catalog, orientation, paths};
use std::path::PathBuf;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Where the bytes of a thumbnail come from.
pub(crate) enum ThumbnailSource {
    Embedded(Vec<u8>),
    Cached(PathBuf),
}

impl MediaLibrary {
    pub async fn list_directory(&self, relative_path: &str) -> Result<Vec<MediaEntry>, MediaError> {
        catalog::list(self.media_root(), relative_path).await
    }

    /// Write the thumbnail of a media file to `writer`.
    ///
    /// The embedded EXIF thumbnail of a JPEG wins (unless ignored by
    /// configuration); otherwise the cached thumbnail is served, generating
    /// it on a miss.
    pub async fn write_thumbnail<W>(&self, writer: &mut W, relative_path: &str) -> Result<(), MediaError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self.resolve_thumbnail(relative_path).await? {
            ThumbnailSource::Embedded(bytes) => writer.write_all(&bytes).await?,
            ThumbnailSource::Cached(path) => copy_file(&path, writer).await?,
        }
        writer.flush().await?;
        Ok(())
    }

    /// Thumbnail bytes of a media file, following the same priority as
    /// [`MediaLibrary::write_thumbnail`].
    pub async fn thumbnail_bytes(&self, relative_path: &str) -> Result<Vec<u8>, MediaError> {
        match self.resolve_thumbnail(relative_path).await? {
            ThumbnailSource::Embedded(bytes) => Ok(bytes),
            ThumbnailSource::Cached(path) => Ok(tokio::fs::read(&path).await?),
        }
    }

    pub(crate) async fn resolve_thumbnail(&self, relative_path: &str) -> Result<ThumbnailSource, MediaError> {
        let (_, file_name) = paths::split_relative(relative_path);
        if catalog::file_kind(file_name).is_none() {
            return Err(MediaError::UnsupportedType(relative_path.to_string()));
        }

        if !self.config().ignore_exif_thumbs
            && let Some(bytes) = self.embedded_thumbnail(relative_path).await?
        {
            trace!("Serving embedded EXIF thumbnail for {}", relative_path);
            return Ok(ThumbnailSource::Embedded(bytes));
        }

        if !self.config().enable_thumb_cache {
            return Err(MediaError::Disabled("Thumbnail cache"));
        }

        let path = self.cache().generate_thumbnail(relative_path).await?;
        Ok(ThumbnailSource::Cached(path))
    }

    /// The oriented EXIF thumbnail of a JPEG, if it carries one.
    pub async fn embedded_thumbnail(&self, relative_path: &str) -> Result<Option<Vec<u8>>, MediaError> {
        let (_, file_name) = paths::split_relative(relative_path);
        if !catalog::is_jpeg(file_name) {
            return Ok(None);
        }

        let full_path = self.full_media_path(relative_path)?;
        let quality = self.config().jpeg_quality;
        let thumbnail = tokio::task::spawn_blocking(move || {
            orientation::oriented_embedded_thumbnail(&full_path, quality)
        })
        .await?;
        Ok(thumbnail)
    }

    /// Whether a file carries an embedded EXIF thumbnail.
    pub async fn has_embedded_thumbnail(&self, relative_path: &str) -> bool {
        let (_, file_name) = paths::split_relative(relative_path);
        if !catalog::is_jpeg(file_name) {
            return false;
        }
        let Ok(full_path) = self.full_media_path(relative_path) else {
            return false;
        };
        tokio::task::spawn_blocking(move || {
            orientation::read_exif(&full_path)
                .map(|info| info.thumbnail.is_some())
                .unwrap_or(false)
        })
        .await
        .unwrap_or(false)
    }

    /// Write the preview of an image to `writer`, generating it on a miss.
    pub async fn write_preview<W>(&self, writer: &mut W, relative_path: &str) -> Result<(), MediaError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let (_, file_name) = paths::split_relative(relative_path);
        if !catalog::is_image(file_name) {
            return Err(MediaError::UnsupportedType(format!(
                "{} (only images support preview)",
                relative_path
            )));
        }
        if !self.config().enable_preview {
            return Err(MediaError::Disabled("Preview"));
        }

        match self.cache().generate_preview(relative_path).await? {
            PreviewOutcome::Ready(path) => copy_file(&path, writer).await?,
            PreviewOutcome::TooSmall => {
                return Err(MediaError::TooSmallForPreview(relative_path.to_string()));
            }
        }
        writer.flush().await?;
        Ok(())
    }

    /// Write a full-size image or video to `writer`. JPEGs that need rotation
    /// are re-encoded upright when auto-rotate is on.
    pub async fn write_image<W>(&self, writer: &mut W, relative_path: &str) -> Result<(), MediaError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let full_path = self.full_media_path(relative_path)?;
        let (_, file_name) = paths::split_relative(relative_path);

        if self.config().auto_rotate && catalog::is_jpeg(file_name) {
            let quality = self.config().jpeg_quality;
            let source = full_path.clone();
            let rotated = tokio::task::spawn_blocking(move || -> Result<Option<Vec<u8>>, MediaError> {
                if !orientation::needs_rotation(&source) {
                    return Ok(None);
                }
                let img = orientation::open_oriented(&source)?;
                crate::cache::encode_jpeg(&img, quality).map(Some)
            })
            .await??;

            if let Some(bytes) = rotated {
                debug!("Serving rotated {}", relative_path);
                writer.write_all(&bytes).await?;
                writer.flush().await?;
                return Ok(());
            }
        }

        copy_file(&full_path, writer).await?;
        writer.flush().await?;
        Ok(())
    }
}

async fn copy_file<W>(path: &std::path::Path, writer: &mut W) -> Result<(), MediaError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| MediaError::from_open(path, e))?;
    tokio::io::copy(&mut file, writer).await?;
    Ok(())
}
