use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub mod cache;
pub mod composite;
pub mod media;
pub mod startup_checks;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_support;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub media: MediaConfig,
    pub video: VideoConfig,
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "mediacache".to_string(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MediaConfig {
    pub source_directory: PathBuf,
    pub cache_directory: PathBuf,
    pub enable_thumb_cache: bool,
    pub ignore_exif_thumbs: bool,
    pub gen_thumbs_on_startup: bool,
    pub gen_thumbs_on_add: bool,
    pub auto_rotate: bool,
    pub enable_preview: bool,
    pub preview_max_side: u32,
    pub gen_preview_for_small_images: bool,
    pub gen_preview_on_startup: bool,
    pub gen_preview_on_add: bool,
    pub enable_cache_cleanup: bool,
    pub gen_album_thumbs: bool,
    pub jpeg_quality: u8,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            source_directory: PathBuf::from("media"),
            cache_directory: std::env::temp_dir().join("mediacache"),
            enable_thumb_cache: true,
            ignore_exif_thumbs: false,
            gen_thumbs_on_startup: false,
            gen_thumbs_on_add: true,
            auto_rotate: true,
            enable_preview: false,
            preview_max_side: 1280,
            gen_preview_for_small_images: false,
            gen_preview_on_startup: false,
            gen_preview_on_add: true,
            enable_cache_cleanup: false,
            gen_album_thumbs: true,
            jpeg_quality: 85,
        }
    }
}

impl MediaConfig {
    /// Whether files appearing in the media tree should get artifacts built.
    pub fn generates_on_add(&self) -> bool {
        (self.enable_thumb_cache && self.gen_thumbs_on_add)
            || (self.enable_preview && self.gen_preview_on_add)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VideoConfig {
    pub ffmpeg_command: String,
    /// Position of the extracted frame, in any form ffmpeg accepts for `-ss`.
    pub seek: String,
    pub timeout_seconds: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            ffmpeg_command: "ffmpeg".to_string(),
            seek: "00:00:05".to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Quiet period after the last event for a file before it is processed.
    pub settle_millis: u64,
    pub max_retries: u32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            settle_millis: 500,
            max_retries: 20,
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, toml_edit::de::Error> {
        toml_edit::de::from_str(content)
    }
}

pub fn create_library(config: &Config) -> media::SharedLibrary {
    Arc::new(media::MediaLibrary::new(
        config.media.clone(),
        &config.video,
    ))
}
