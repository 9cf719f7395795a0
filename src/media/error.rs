use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Path escapes root: {0}")]
    PathEscape(String),

    #[error("{path} is not a sub-path of {root}")]
    NotASubpath { path: String, root: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File has no extension: {0}")]
    NoExtension(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedType(String),

    #[error("Unable to decode {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("External tool failed: {0}")]
    ExternalTool(String),

    #[error("Image {0} too small to generate preview")]
    TooSmallForPreview(String),

    #[error("Skipping {key} since it has failed before: {reason}")]
    PermanentlyFailed { key: String, reason: String },

    #[error("File is locked by another process: {0}")]
    FileLocked(String),

    #[error("{0} disabled")]
    Disabled(&'static str),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

impl MediaError {
    pub(crate) fn decode(path: impl AsRef<std::path::Path>, reason: impl std::fmt::Display) -> Self {
        MediaError::Decode {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Failures that will not go away by retrying the same source file.
    /// These get an error marker so the work is never repeated.
    pub fn is_memoizable(&self) -> bool {
        matches!(
            self,
            MediaError::Decode { .. } | MediaError::ExternalTool(_) | MediaError::ImageError(_)
        )
    }

    /// Conditions that may clear up on their own, e.g. a file that is still
    /// being copied into the media tree.
    pub fn is_transient(&self) -> bool {
        matches!(self, MediaError::FileLocked(_) | MediaError::NotFound(_))
    }

    /// The serving layer reports path escapes the same way as missing files.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MediaError::NotFound(_) | MediaError::PathEscape(_))
    }

    /// Map an error from opening a source file. Sharing violations on
    /// Windows and permission errors while a copy is in progress are
    /// reported as locked rather than broken.
    pub(crate) fn from_open(path: &std::path::Path, err: std::io::Error) -> Self {
        const ERROR_SHARING_VIOLATION: i32 = 32;
        const ERROR_LOCK_VIOLATION: i32 = 33;

        match err.kind() {
            std::io::ErrorKind::NotFound => MediaError::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => {
                MediaError::FileLocked(path.display().to_string())
            }
            _ if cfg!(windows)
                && matches!(
                    err.raw_os_error(),
                    Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
                ) =>
            {
                MediaError::FileLocked(path.display().to_string())
            }
            _ => MediaError::IoError(err),
        }
    }
}
