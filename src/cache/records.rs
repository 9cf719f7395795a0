use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::sync::{OwnedMutexGuard, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Thumbnail,
    Preview,
    AlbumThumbnail,
}

/// In-memory index of artifacts known to exist under the cache root,
/// keyed by cache-relative path. Advisory only: the file system decides
/// whether something has to be generated.
#[derive(Default)]
pub struct ArtifactRecords {
    thumbnails: RwLock<HashMap<String, SystemTime>>,
    previews: RwLock<HashMap<String, SystemTime>>,
    album_thumbnails: RwLock<HashMap<String, SystemTime>>,
}

impl ArtifactRecords {
    fn map(&self, kind: ArtifactKind) -> &RwLock<HashMap<String, SystemTime>> {
        match kind {
            ArtifactKind::Thumbnail => &self.thumbnails,
            ArtifactKind::Preview => &self.previews,
            ArtifactKind::AlbumThumbnail => &self.album_thumbnails,
        }
    }

    pub async fn insert(&self, kind: ArtifactKind, key: &str) {
        self.map(kind)
            .write()
            .await
            .insert(key.to_string(), SystemTime::now());
    }

    pub async fn remove(&self, kind: ArtifactKind, key: &str) -> bool {
        self.map(kind).write().await.remove(key).is_some()
    }

    pub async fn contains(&self, kind: ArtifactKind, key: &str) -> bool {
        self.map(kind).read().await.contains_key(key)
    }

    pub async fn updated_at(&self, kind: ArtifactKind, key: &str) -> Option<SystemTime> {
        self.map(kind).read().await.get(key).copied()
    }

    pub async fn len(&self, kind: ArtifactKind) -> usize {
        self.map(kind).read().await.len()
    }

    /// Drop every record that lives below `relative_dir`.
    pub async fn remove_under(&self, relative_dir: &str) -> usize {
        let prefix = format!("{}/", relative_dir.trim_end_matches('/'));
        let mut removed = 0;
        for kind in [
            ArtifactKind::Thumbnail,
            ArtifactKind::Preview,
            ArtifactKind::AlbumThumbnail,
        ] {
            let mut map = self.map(kind).write().await;
            let before = map.len();
            map.retain(|key, _| !key.starts_with(&prefix));
            removed += before - map.len();
        }
        removed
    }

    /// Build the index from keys found while scanning the cache tree.
    pub(crate) fn from_scan(
        thumbnails: Vec<String>,
        previews: Vec<String>,
        album_thumbnails: Vec<String>,
    ) -> Self {
        let now = SystemTime::now();
        let to_map = |keys: Vec<String>| -> RwLock<HashMap<String, SystemTime>> {
            RwLock::new(keys.into_iter().map(|key| (key, now)).collect())
        };
        Self {
            thumbnails: to_map(thumbnails),
            previews: to_map(previews),
            album_thumbnails: to_map(album_thumbnails),
        }
    }
}

/// One async mutex per artifact key, so concurrent callers asking for the
/// same artifact wait for a single generation instead of duplicating it.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

pub struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub async fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        KeyGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    pub fn active(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.owner.locks.lock().unwrap_or_else(|e| e.into_inner());
        self.guard.take();
        // Only the map still holds the mutex: nobody is waiting for this key
        if let Some(lock) = locks.get(&self.key)
            && Arc::strong_count(lock) == 1
        {
            locks.remove(&self.key);
        }
    }
}
