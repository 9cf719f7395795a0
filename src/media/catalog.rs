use super::{MediaEntry, MediaError, MediaKind, paths};
use std::path::Path;
use tracing::debug;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tif", "tiff", "gif"];
const VIDEO_EXTENSIONS: [&str; 5] = ["avi", "mov", "vid", "mkv", "mp4"];

fn extension(file_name: &str) -> Option<&str> {
    Path::new(file_name).extension().and_then(|ext| ext.to_str())
}

pub fn is_image(file_name: &str) -> bool {
    extension(file_name)
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

pub fn is_video(file_name: &str) -> bool {
    extension(file_name)
        .map(|ext| VIDEO_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

pub fn is_jpeg(file_name: &str) -> bool {
    extension(file_name)
        .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

/// Classify a file by extension. Folders are decided by the caller.
pub fn file_kind(file_name: &str) -> Option<MediaKind> {
    if is_image(file_name) {
        Some(MediaKind::Image)
    } else if is_video(file_name) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// List one directory level below `root`. Directories and symbolic links are
/// folders; files are kept only if they are a supported image or video.
///
/// Entries are sorted by file name so collage names and sweeps are stable
/// across platforms.
pub async fn list(root: &Path, relative_path: &str) -> Result<Vec<MediaEntry>, MediaError> {
    let full_path = paths::resolve(root, relative_path)?;

    let mut entries = match tokio::fs::read_dir(&full_path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MediaError::NotFound(relative_path.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut items = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        let file_type = entry.file_type().await?;

        let kind = if file_type.is_dir() || file_type.is_symlink() {
            Some(MediaKind::Folder)
        } else {
            file_kind(&name)
        };

        match kind {
            Some(kind) => items.push(MediaEntry {
                kind,
                path: paths::join_relative(relative_path, &name),
                name,
            }),
            None => debug!("Omitting unsupported file: {}", name),
        }
    }

    items.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(items)
}
