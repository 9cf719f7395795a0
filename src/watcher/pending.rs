use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Size and modification time of a file, used to notice ongoing writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSnapshot {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileSnapshot {
    pub fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        if !meta.is_file() {
            return None;
        }
        Some(Self {
            size: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PendingFile {
    pub due: Instant,
    pub snapshot: Option<FileSnapshot>,
    pub retries: u32,
    /// Content was rewritten, existing artifacts are stale
    pub changed: bool,
}

/// Files waiting for their writes to settle before artifacts are built.
#[derive(Debug)]
pub struct PendingFiles {
    settle: Duration,
    files: HashMap<PathBuf, PendingFile>,
}

impl PendingFiles {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            files: HashMap::new(),
        }
    }

    /// (Re)start the settle window of a file. Retry counts and the changed
    /// flag survive.
    pub fn schedule(
        &mut self,
        path: PathBuf,
        snapshot: Option<FileSnapshot>,
        changed: bool,
        now: Instant,
    ) {
        let due = now + self.settle;
        self.files
            .entry(path)
            .and_modify(|pending| {
                pending.due = due;
                pending.snapshot = snapshot;
                pending.changed |= changed;
            })
            .or_insert(PendingFile {
                due,
                snapshot,
                retries: 0,
                changed,
            });
    }

    /// Put a file back after a transient failure. Returns false once
    /// `max_retries` is used up.
    pub fn retry(&mut self, path: PathBuf, mut pending: PendingFile, max_retries: u32, now: Instant) -> bool {
        if pending.retries >= max_retries {
            return false;
        }
        pending.retries += 1;
        pending.due = now + self.settle;
        self.files.insert(path, pending);
        true
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        self.files.remove(path).is_some()
    }

    pub fn remove_under(&mut self, dir: &Path) -> usize {
        let before = self.files.len();
        self.files.retain(|path, _| !path.starts_with(dir));
        before - self.files.len()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.files.values().map(|pending| pending.due).min()
    }

    /// Take every file whose settle window has passed.
    pub fn take_due(&mut self, now: Instant) -> Vec<(PathBuf, PendingFile)> {
        let due: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|(_, pending)| pending.due <= now)
            .map(|(path, _)| path.clone())
            .collect();

        let mut taken: Vec<(PathBuf, PendingFile)> = due
            .into_iter()
            .filter_map(|path| self.files.remove(&path).map(|pending| (path, pending)))
            .collect();
        taken.sort_by(|a, b| a.0.cmp(&b.0));
        taken
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTLE: Duration = Duration::from_millis(500);

    #[test]
    fn test_new_events_push_the_deadline_back() {
        let mut pending = PendingFiles::new(SETTLE);
        let start = Instant::now();
        pending.schedule(PathBuf::from("/m/a.jpg"), None, false, start);
        assert_eq!(pending.next_due(), Some(start + SETTLE));

        let later = start + Duration::from_millis(300);
        pending.schedule(PathBuf::from("/m/a.jpg"), None, false, later);
        assert_eq!(pending.len(), 1);
        assert!(pending.take_due(start + SETTLE).is_empty());
        assert_eq!(pending.take_due(later + SETTLE).len(), 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_take_due_only_returns_settled_files() {
        let mut pending = PendingFiles::new(SETTLE);
        let start = Instant::now();
        pending.schedule(PathBuf::from("/m/b.jpg"), None, false, start);
        pending.schedule(PathBuf::from("/m/a.jpg"), None, false, start);
        pending.schedule(PathBuf::from("/m/c.jpg"), None, false, start + SETTLE);

        let due = pending.take_due(start + SETTLE);
        let names: Vec<_> = due.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(names, vec![PathBuf::from("/m/a.jpg"), PathBuf::from("/m/b.jpg")]);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_retry_limit() {
        let mut pending = PendingFiles::new(SETTLE);
        let now = Instant::now();
        let path = PathBuf::from("/m/locked.jpg");
        pending.schedule(path.clone(), None, false, now);

        let mut retries = 0;
        loop {
            let mut due = pending.take_due(now + SETTLE * (retries + 2));
            let Some((path, file)) = due.pop() else {
                break;
            };
            if !pending.retry(path, file, 3, now) {
                break;
            }
            retries += 1;
        }
        assert_eq!(retries, 3);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_changed_flag_sticks_across_reschedules() {
        let mut pending = PendingFiles::new(SETTLE);
        let now = Instant::now();
        let path = PathBuf::from("/m/edited.jpg");
        pending.schedule(path.clone(), None, true, now);
        pending.schedule(path.clone(), None, false, now);

        let (_, file) = pending.take_due(now + SETTLE).pop().unwrap();
        assert!(file.changed);
        assert!(pending.retry(path, file, 1, now));
        let (_, file) = pending.take_due(now + SETTLE).pop().unwrap();
        assert!(file.changed);
    }

    #[test]
    fn test_remove_under_directory() {
        let mut pending = PendingFiles::new(SETTLE);
        let now = Instant::now();
        pending.schedule(PathBuf::from("/m/trip/a.jpg"), None, false, now);
        pending.schedule(PathBuf::from("/m/trip/day/b.jpg"), None, false, now);
        pending.schedule(PathBuf::from("/m/tripod.jpg"), None, false, now);

        assert_eq!(pending.remove_under(Path::new("/m/trip")), 2);
        assert!(pending.remove(Path::new("/m/tripod.jpg")));
        assert!(!pending.remove(Path::new("/m/tripod.jpg")));
    }
}
