use crate::Config;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StartupCheckError {
    #[error("Failed to create cache directory: {0}")]
    CacheDirectoryCreationFailed(#[from] std::io::Error),

    #[error("Media source directory does not exist: {0}")]
    SourceDirectoryMissing(String),

    #[error("Media source directory is not accessible: {0}")]
    SourceDirectoryUnreadable(String),

    #[error("Cache directory must differ from the source directory: {0}")]
    CacheIsSource(String),

    #[error("Video frame extractor not found: {0}")]
    FfmpegMissing(String),
}

impl StartupCheckError {
    /// Critical failures stop the program; the rest only degrade features.
    pub fn is_critical(&self) -> bool {
        !matches!(self, StartupCheckError::FfmpegMissing(_))
    }
}

pub async fn perform_startup_checks(config: &Config) -> Result<(), Vec<StartupCheckError>> {
    let mut errors = Vec::new();

    info!("Performing startup checks...");

    let source_dir = Path::new(&config.media.source_directory);
    if !source_dir.is_dir() {
        error!("Media source directory does not exist: {:?}", source_dir);
        errors.push(StartupCheckError::SourceDirectoryMissing(
            source_dir.display().to_string(),
        ));
    } else {
        info!("Media source directory exists: {:?}", source_dir);
        if let Err(e) = tokio::fs::read_dir(source_dir).await {
            error!("Media source directory is not accessible: {}", e);
            errors.push(StartupCheckError::SourceDirectoryUnreadable(
                source_dir.display().to_string(),
            ));
        }
    }

    let cache_dir = Path::new(&config.media.cache_directory);
    if !cache_dir.exists() {
        info!("Cache directory does not exist, creating: {:?}", cache_dir);
        if let Err(e) = tokio::fs::create_dir_all(cache_dir).await {
            error!("Failed to create cache directory: {}", e);
            errors.push(StartupCheckError::CacheDirectoryCreationFailed(e));
        } else {
            info!("Cache directory created successfully");
        }
    } else {
        info!("Cache directory exists: {:?}", cache_dir);
    }

    if same_directory(source_dir, cache_dir).await {
        error!("Cache directory {:?} is the media source directory", cache_dir);
        errors.push(StartupCheckError::CacheIsSource(
            cache_dir.display().to_string(),
        ));
    }

    let ffmpeg = &config.video.ffmpeg_command;
    match which::which(ffmpeg) {
        Ok(path) => info!("Video thumbnails use {:?}", path),
        Err(_) => {
            warn!(
                "{} not found, video thumbnails will fail until it is installed",
                ffmpeg
            );
            errors.push(StartupCheckError::FfmpegMissing(ffmpeg.clone()));
        }
    }

    if errors.is_empty() {
        info!("All startup checks passed");
        Ok(())
    } else {
        error!("Startup checks failed with {} errors", errors.len());
        Err(errors)
    }
}

async fn same_directory(a: &Path, b: &Path) -> bool {
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
