use super::MediaError;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Join `relative` onto `root` and verify the result is still inside `root`.
///
/// The check is purely lexical: `..` segments and absolute overrides are
/// resolved against the path text, symlink targets are not followed.
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf, MediaError> {
    let root = normalize(root);
    let joined = normalize(&root.join(relative));

    match joined.strip_prefix(&root) {
        Ok(offset) if !escapes(offset) => Ok(joined),
        _ => {
            warn!(
                target: "security",
                "Rejected path {:?} escaping root {}",
                relative,
                root.display()
            );
            Err(MediaError::PathEscape(relative.to_string()))
        }
    }
}

/// Inverse of [`resolve`]: turn a path below `root` back into a relative key
/// using forward slashes.
pub fn relativize(root: &Path, full_path: &Path) -> Result<String, MediaError> {
    let root = normalize(root);
    let full = normalize(full_path);

    match full.strip_prefix(&root) {
        Ok(offset) if !escapes(offset) => Ok(to_slash(offset)),
        _ => Err(MediaError::NotASubpath {
            path: full_path.display().to_string(),
            root: root.display().to_string(),
        }),
    }
}

/// Render a path with `/` separators regardless of platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a relative directory key and an entry name.
pub fn join_relative(relative_dir: &str, name: &str) -> String {
    let dir = relative_dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Split a relative key into its directory part and file name.
pub fn split_relative(relative: &str) -> (&str, &str) {
    match relative.rfind('/') {
        Some(idx) => (&relative[..idx], &relative[idx + 1..]),
        None => ("", relative),
    }
}

fn escapes(offset: &Path) -> bool {
    matches!(
        offset.components().next(),
        Some(Component::ParentDir) | Some(Component::RootDir) | Some(Component::Prefix(_))
    )
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // Cannot climb above the filesystem root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
