use std::collections::BTreeSet;
use std::ops::Bound;
use std::path::{Path, PathBuf};

/// Directories that currently have an OS watch registered.
///
/// Paths order component by component, so a directory and all of its
/// descendants form one contiguous range.
#[derive(Debug, Default)]
pub struct WatchTree {
    dirs: BTreeSet<PathBuf>,
}

impl WatchTree {
    /// Returns false if the directory was already watched.
    pub fn insert(&mut self, dir: PathBuf) -> bool {
        self.dirs.insert(dir)
    }

    pub fn remove(&mut self, dir: &Path) -> bool {
        self.dirs.remove(dir)
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.dirs.contains(dir)
    }

    /// Remove `dir` and every watched directory below it, deepest first.
    pub fn remove_subtree(&mut self, dir: &Path) -> Vec<PathBuf> {
        let mut removed: Vec<PathBuf> = self
            .dirs
            .range::<Path, _>((Bound::Included(dir), Bound::Unbounded))
            .take_while(|candidate| candidate.starts_with(dir))
            .cloned()
            .collect();
        for path in &removed {
            self.dirs.remove(path);
        }
        removed.reverse();
        removed
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}
