use serde::Serialize;
use std::ops::AddAssign;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Folder,
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Folder => "folder",
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One entry of a directory listing. `path` always uses `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaEntry {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub name: String,
    pub path: String,
}

impl MediaEntry {
    pub fn is_folder(&self) -> bool {
        self.kind == MediaKind::Folder
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrecacheStatistics {
    pub folders: usize,
    pub images: usize,
    pub videos: usize,
    pub exif_thumbnails: usize,
    pub image_thumbnails: usize,
    pub video_thumbnails: usize,
    pub image_previews: usize,
    /// Folders whose contents could not be listed
    pub failed_folders: usize,
    pub failed_image_thumbnails: usize,
    pub failed_video_thumbnails: usize,
    pub failed_image_previews: usize,
    /// Images within the preview size that need no preview
    pub small_images: usize,
    pub removed_cache_files: usize,
}

impl AddAssign for PrecacheStatistics {
    fn add_assign(&mut self, other: Self) {
        self.folders += other.folders;
        self.images += other.images;
        self.videos += other.videos;
        self.exif_thumbnails += other.exif_thumbnails;
        self.image_thumbnails += other.image_thumbnails;
        self.video_thumbnails += other.video_thumbnails;
        self.image_previews += other.image_previews;
        self.failed_folders += other.failed_folders;
        self.failed_image_thumbnails += other.failed_image_thumbnails;
        self.failed_video_thumbnails += other.failed_video_thumbnails;
        self.failed_image_previews += other.failed_image_previews;
        self.small_images += other.small_images;
        self.removed_cache_files += other.removed_cache_files;
    }
}

impl std::fmt::Display for PrecacheStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Number of folders: {}", self.folders)?;
        writeln!(f, "Number of images: {}", self.images)?;
        writeln!(f, "Number of videos: {}", self.videos)?;
        writeln!(f, "Number of images with embedded EXIF: {}", self.exif_thumbnails)?;
        writeln!(f, "Number of generated image thumbnails: {}", self.image_thumbnails)?;
        writeln!(f, "Number of generated video thumbnails: {}", self.video_thumbnails)?;
        writeln!(f, "Number of generated image previews: {}", self.image_previews)?;
        writeln!(f, "Number of failed folders: {}", self.failed_folders)?;
        writeln!(f, "Number of failed image thumbnails: {}", self.failed_image_thumbnails)?;
        writeln!(f, "Number of failed video thumbnails: {}", self.failed_video_thumbnails)?;
        writeln!(f, "Number of failed image previews: {}", self.failed_image_previews)?;
        writeln!(f, "Number of small images not requiring preview: {}", self.small_images)?;
        write!(f, "Number of removed cache files: {}", self.removed_cache_files)
    }
}

/// Result of asking the cache for a preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewOutcome {
    Ready(std::path::PathBuf),
    /// The source already fits within the preview size and previews for
    /// small images are switched off. Not memoized.
    TooSmall,
}
