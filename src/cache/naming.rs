use crate::media::{MediaError, paths};
use std::path::Path;

pub const THUMBNAIL_SUFFIX: &str = ".thumb.jpg";
pub const PREVIEW_SUFFIX: &str = ".preview.jpg";
pub const ERROR_MARKER_SUFFIX: &str = ".err.txt";
/// Appended to an artifact path while it is being written.
pub const PARTIAL_SUFFIX: &str = ".part";
/// Appended to a video thumbnail path for the extracted frame.
pub const FRAME_SUFFIX: &str = ".sh.jpg";

const FNV64_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1 (multiply, then xor).
pub fn fnv1_64(data: &[u8]) -> u64 {
    data.iter().fold(FNV64_OFFSET_BASIS, |hash, byte| {
        hash.wrapping_mul(FNV64_PRIME) ^ u64::from(*byte)
    })
}

fn replace_extension(relative: &str, suffix: &str) -> Result<String, MediaError> {
    let (dir, file) = paths::split_relative(relative);
    let ext = Path::new(file)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| MediaError::NoExtension(file.to_string()))?;
    let stem = &file[..file.len() - ext.len() - 1];
    Ok(paths::join_relative(dir, &format!("{}{}", stem, suffix)))
}

/// `2021/img.png` -> `2021/img.thumb.jpg`
pub fn thumbnail_key(relative_media_path: &str) -> Result<String, MediaError> {
    replace_extension(relative_media_path, THUMBNAIL_SUFFIX)
}

/// `2021/img.png` -> `2021/img.preview.jpg`
pub fn preview_key(relative_media_path: &str) -> Result<String, MediaError> {
    replace_extension(relative_media_path, PREVIEW_SUFFIX)
}

/// `2021/img.thumb.jpg` -> `2021/img.thumb.err.txt`
pub fn error_marker_key(artifact_key: &str) -> String {
    replace_extension(artifact_key, ERROR_MARKER_SUFFIX)
        .unwrap_or_else(|_| format!("{}{}", artifact_key, ERROR_MARKER_SUFFIX))
}

/// Collage name for an album: the FNV-1 hash of the folder name followed by
/// the file names in order, written in decimal.
pub fn album_thumbnail_name<S: AsRef<str>>(relative_album_path: &str, files: &[S]) -> String {
    let (_, folder) = paths::split_relative(relative_album_path.trim_end_matches('/'));
    let mut data = folder.as_bytes().to_vec();
    for file in files {
        data.extend_from_slice(file.as_ref().as_bytes());
    }
    format!("{}.jpg", fnv1_64(&data))
}

pub fn album_thumbnail_key<S: AsRef<str>>(relative_album_path: &str, files: &[S]) -> String {
    paths::join_relative(
        relative_album_path,
        &album_thumbnail_name(relative_album_path, files),
    )
}

/// Scratch files of a generation that may still be running.
pub fn is_temporary_name(name: &str) -> bool {
    name.ends_with(PARTIAL_SUFFIX) || name.ends_with(FRAME_SUFFIX)
}

pub fn is_album_thumbnail_name(name: &str) -> bool {
    name.strip_suffix(".jpg")
        .map(|stem| !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}
