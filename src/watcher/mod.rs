// Watcher module - keeps the cache in step with the live media tree
mod pending;
mod tree;

pub use pending::{FileSnapshot, PendingFile, PendingFiles};
pub use tree::WatchTree;

use crate::media::{MediaError, SharedLibrary, catalog, paths};
use notify::event::{ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Handle to the background task watching the media tree.
pub struct DirectoryWatcher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl DirectoryWatcher {
    /// Register watches on the media root and every directory below it, then
    /// start the event loop. Must be called from within a Tokio runtime.
    pub fn start(library: SharedLibrary, config: &crate::WatcherConfig) -> Result<Self, WatcherError> {
        let root = std::fs::canonicalize(library.media_root())?;
        let (tx, rx) = unbounded_channel();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;

        // A cache nested inside the media tree must not feed its own writes back
        let cache_root = std::fs::canonicalize(library.cache().cache_root()).ok();

        let mut state = WatchLoop {
            library,
            root: root.clone(),
            cache_root,
            watcher,
            tree: WatchTree::default(),
            pending: PendingFiles::new(Duration::from_millis(config.settle_millis)),
            max_retries: config.max_retries,
        };
        state.watch_directory(&root);
        info!(
            "Watching {} ({} directories)",
            root.display(),
            state.tree.len()
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(state.run(rx, cancel.clone()));
        Ok(Self { cancel, handle })
    }

    /// Stop the event loop and wait for it to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!("Watcher task failed: {}", e);
        }
        info!("Watcher stopped");
    }
}

struct WatchLoop {
    library: SharedLibrary,
    root: PathBuf,
    cache_root: Option<PathBuf>,
    watcher: RecommendedWatcher,
    tree: WatchTree,
    pending: PendingFiles,
    max_retries: u32,
}

impl WatchLoop {
    async fn run(
        mut self,
        mut rx: UnboundedReceiver<notify::Result<Event>>,
        cancel: CancellationToken,
    ) {
        loop {
            let next_due = self.pending.next_due();
            let deadline = next_due.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(e)) => warn!("Watch error: {}", e),
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline), if next_due.is_some() => {
                    self.process_due().await;
                }
            }
        }
        debug!(
            "Watcher loop finished with {} files still pending",
            self.pending.len()
        );
    }

    fn handle_event(&mut self, event: Event) {
        trace!("Watch event {:?}", event);
        match event.kind {
            EventKind::Create(_) => {
                for path in &event.paths {
                    self.path_appeared(path, false);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in &event.paths {
                    self.path_removed(path, false);
                }
            }
            // A file renamed over an existing one replaces its content
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
                self.path_removed(&event.paths[0], false);
                self.path_appeared(&event.paths[1], true);
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                for path in &event.paths {
                    if path.exists() {
                        self.path_appeared(path, true);
                    } else {
                        self.path_removed(path, false);
                    }
                }
            }
            EventKind::Modify(ModifyKind::Metadata(_)) => {}
            EventKind::Modify(_) => {
                for path in &event.paths {
                    if path.is_file() {
                        self.schedule_file(path, true);
                    }
                }
            }
            EventKind::Remove(kind) => {
                for path in &event.paths {
                    self.path_removed(path, kind == RemoveKind::Folder);
                }
            }
            _ => {}
        }
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.cache_root
            .as_ref()
            .map(|cache| path.starts_with(cache))
            .unwrap_or(false)
    }

    fn path_appeared(&mut self, path: &Path, changed: bool) {
        if self.is_ignored(path) {
            return;
        }
        if path.is_dir() {
            info!("Directory added: {}", path.display());
            for file in self.watch_directory(path) {
                self.schedule_file(&file, changed);
            }
        } else {
            self.schedule_file(path, changed);
        }
    }

    /// Queue a media file for processing once its writes settle. `changed`
    /// marks content that replaced an earlier version of the file.
    fn schedule_file(&mut self, path: &Path, changed: bool) {
        if self.is_ignored(path) || !is_media_file(path) {
            return;
        }
        trace!("Scheduling {} (changed: {})", path.display(), changed);
        self.pending.schedule(
            path.to_path_buf(),
            FileSnapshot::of(path),
            changed,
            Instant::now(),
        );
    }

    /// Watch `dir` and every directory below it. Returns the media files
    /// found on the way.
    fn watch_directory(&mut self, dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if self.is_ignored(path) {
                continue;
            }
            if entry.file_type().is_dir() {
                if !self.tree.insert(path.to_path_buf()) {
                    continue;
                }
                if let Err(e) = self.watcher.watch(path, RecursiveMode::NonRecursive) {
                    warn!("Unable to watch {}: {}", path.display(), e);
                    self.tree.remove(path);
                } else {
                    debug!("Watching {}", path.display());
                }
            } else if is_media_file(path) {
                files.push(path.to_path_buf());
            }
        }
        files
    }

    fn path_removed(&mut self, path: &Path, is_dir: bool) {
        if self.is_ignored(path) {
            return;
        }

        let relative = match paths::relativize(&self.root, path) {
            Ok(relative) => relative,
            Err(e) => {
                debug!("Ignoring removal outside the media tree: {}", e);
                return;
            }
        };

        if is_dir || self.tree.contains(path) {
            for dir in self.tree.remove_subtree(path) {
                // The OS usually drops the watch of a deleted directory itself
                if let Err(e) = self.watcher.unwatch(&dir) {
                    trace!("Unwatch {}: {}", dir.display(), e);
                }
            }
            self.pending.remove_under(path);
            if relative.is_empty() {
                warn!("Media root {} was removed", path.display());
                return;
            }

            let library = self.library.clone();
            info!("Directory removed: {}", relative);
            tokio::spawn(async move {
                if let Err(e) = library.cache().remove_directory(&relative).await {
                    warn!("Unable to remove cache for {}: {}", relative, e);
                }
            });
        } else if is_media_file(path) {
            self.pending.remove(path);
            let library = self.library.clone();
            info!("File removed: {}", relative);
            tokio::spawn(async move {
                if let Err(e) = library.cache().remove_artifacts(&relative).await {
                    warn!("Unable to remove cached artifacts for {}: {}", relative, e);
                }
            });
        }
    }

    async fn process_due(&mut self) {
        for (path, pending) in self.pending.take_due(Instant::now()) {
            let current = FileSnapshot::of(&path);
            if current.is_none() {
                debug!("{} disappeared before processing", path.display());
                continue;
            }
            if current != pending.snapshot {
                // Still being written
                self.pending
                    .schedule(path, current, pending.changed, Instant::now());
                continue;
            }

            let relative = match paths::relativize(&self.root, &path) {
                Ok(relative) => relative,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            let result = if pending.changed {
                self.library.process_changed_file(&relative).await
            } else {
                self.library.process_added_file(&relative).await
            };
            match result {
                Ok(()) => debug!("Processed added file {}", relative),
                Err(MediaError::FileLocked(_)) => {
                    if self
                        .pending
                        .retry(path, pending, self.max_retries, Instant::now())
                    {
                        debug!("{} is locked, retrying later", relative);
                    } else {
                        error!("Giving up on {}, still locked", relative);
                    }
                }
                Err(e) => warn!("Unable to process added file {}: {}", relative, e),
            }
        }
    }
}

fn is_media_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(catalog::file_kind)
        .is_some()
}
