//! File-system watcher.
//!
//! Tracks a set of paths as `(mtime, size, content-hash)` snapshots and
//! answers "which of these changed since last time?". The mtime/size pair
//! is the cheap first-line check; the content hash breaks ties so a
//! touched-but-identical file does not count as changed.
//!
//! An unreadable tracked path is reported as removed (its snapshot is
//! cleared); if it reappears later it is reported as changed.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Snapshot of one file's identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    /// Modification time as (seconds, nanos) since the epoch.
    pub mtime: (u64, u32),
    pub size: u64,
    /// Hex SHA-256 of the contents.
    pub hash: String,
}

pub fn hash_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn snapshot(path: &Path) -> Option<FileData> {
    let meta = fs::metadata(path).ok()?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or((0, 0), |d| (d.as_secs(), d.subsec_nanos()));
    let contents = fs::read(path).ok()?;
    Some(FileData {
        mtime,
        size: meta.len(),
        hash: hash_digest(&contents),
    })
}

/// Watcher over an explicit set of paths.
///
/// `None` in the snapshot table means "tracked but currently missing".
#[derive(Debug, Default)]
pub struct FileSystemWatcher {
    file_data: FxHashMap<PathBuf, Option<FileData>>,
}

impl FileSystemWatcher {
    pub fn new() -> Self {
        FileSystemWatcher::default()
    }

    /// Start tracking paths. Records the current snapshot without
    /// reporting a change.
    pub fn add_watched_paths(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        for path in paths {
            if !self.file_data.contains_key(&path) {
                let snap = snapshot(&path);
                self.file_data.insert(path, snap);
            }
        }
    }

    /// Stop tracking paths.
    pub fn remove_watched_paths(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        for path in paths {
            self.file_data.remove(&path);
        }
    }

    /// Record an externally known snapshot (e.g. from a warm cache) so
    /// the next `find_changed` compares against it.
    pub fn set_file_data(&mut self, path: &Path, data: FileData) {
        self.file_data.insert(path.to_owned(), Some(data));
    }

    /// Stat every tracked path and return those that changed since the
    /// last call. Modified, newly missing, and reappeared paths all
    /// count; a touch that leaves the content hash intact does not.
    pub fn find_changed(&mut self) -> BTreeSet<PathBuf> {
        let paths: Vec<PathBuf> = self.file_data.keys().cloned().collect();
        self.check_paths(paths)
    }

    /// Update state from the caller's authoritative lists instead of
    /// statting the world: `remove` paths stop being tracked (and count
    /// as changed), `update` paths are re-stat'd and count as changed
    /// when their identity actually differs.
    pub fn update_changed(
        &mut self,
        remove: impl IntoIterator<Item = PathBuf>,
        update: impl IntoIterator<Item = PathBuf>,
    ) -> BTreeSet<PathBuf> {
        let mut changed = BTreeSet::new();
        for path in remove {
            self.file_data.remove(&path);
            changed.insert(path);
        }
        let updates: Vec<PathBuf> = update.into_iter().collect();
        changed.extend(self.check_paths(updates));
        changed
    }

    /// Expose the current snapshot table for debugging.
    pub fn dump_file_data(&self) -> Vec<(String, Option<FileData>)> {
        let mut entries: Vec<(String, Option<FileData>)> = self
            .file_data
            .iter()
            .map(|(path, data)| (path.display().to_string(), data.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn check_paths(&mut self, paths: Vec<PathBuf>) -> BTreeSet<PathBuf> {
        let mut changed = BTreeSet::new();
        for path in paths {
            let old = self.file_data.get(&path).cloned().flatten();
            let new = snapshot(&path);
            match (&old, &new) {
                (Some(old_data), Some(new_data)) => {
                    if old_data.mtime != new_data.mtime || old_data.size != new_data.size {
                        // The hash is the tiebreaker: a no-op touch moves
                        // the mtime but not the contents.
                        if old_data.hash != new_data.hash {
                            changed.insert(path.clone());
                        }
                        self.file_data.insert(path, new);
                    }
                }
                (Some(_), None) => {
                    // Tracked file became unreadable: report as removed
                    // (changed set membership; state cleared).
                    tracing::debug!(path = %path.display(), "tracked file disappeared");
                    self.file_data.insert(path.clone(), None);
                    changed.insert(path);
                }
                (None, Some(_)) => {
                    // Reappeared (or tracked while missing).
                    self.file_data.insert(path.clone(), new);
                    changed.insert(path);
                }
                (None, None) => {}
            }
        }
        changed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_file(path: &Path, contents: &str) {
        let mut f = fs::File::create(path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn adding_paths_does_not_report_change() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        write_file(&file, "X = 1\n");
        let mut watcher = FileSystemWatcher::new();
        watcher.add_watched_paths([file]);
        assert!(watcher.find_changed().is_empty());
    }

    #[test]
    fn modification_is_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        write_file(&file, "X = 1\n");
        let mut watcher = FileSystemWatcher::new();
        watcher.add_watched_paths([file.clone()]);

        write_file(&file, "X = 2  # changed\n");
        let changed = watcher.find_changed();
        assert_eq!(changed, BTreeSet::from([file]));
        // Idempotence: nothing external happened since, so nothing is
        // reported.
        assert!(watcher.find_changed().is_empty());
        assert!(watcher.find_changed().is_empty());
    }

    #[test]
    fn touch_without_content_change_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        write_file(&file, "X = 1\n");
        let mut watcher = FileSystemWatcher::new();
        watcher.add_watched_paths([file.clone()]);

        // Same contents, new mtime.
        write_file(&file, "X = 1\n");
        assert!(watcher.find_changed().is_empty());
    }

    #[test]
    fn deletion_and_reappearance_are_both_reported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        write_file(&file, "X = 1\n");
        let mut watcher = FileSystemWatcher::new();
        watcher.add_watched_paths([file.clone()]);

        fs::remove_file(&file).unwrap();
        assert_eq!(watcher.find_changed(), BTreeSet::from([file.clone()]));
        assert!(watcher.find_changed().is_empty());

        write_file(&file, "X = 2\n");
        assert_eq!(watcher.find_changed(), BTreeSet::from([file]));
    }

    #[test]
    fn update_changed_uses_caller_lists() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone.py");
        let stays = dir.path().join("stays.py");
        let edited = dir.path().join("edited.py");
        for (path, text) in [(&gone, "1"), (&stays, "2"), (&edited, "3")] {
            write_file(path, text);
        }
        let mut watcher = FileSystemWatcher::new();
        watcher.add_watched_paths([gone.clone(), stays.clone(), edited.clone()]);

        write_file(&edited, "3 edited");
        fs::remove_file(&gone).unwrap();

        let changed = watcher.update_changed([gone.clone()], [edited.clone(), stays.clone()]);
        // The unchanged path is validated out of the result.
        assert_eq!(changed, BTreeSet::from([gone, edited]));
    }

    #[test]
    fn dump_exposes_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        write_file(&file, "X = 1\n");
        let mut watcher = FileSystemWatcher::new();
        watcher.add_watched_paths([file]);
        let dump = watcher.dump_file_data();
        assert_eq!(dump.len(), 1);
        let (_, data) = &dump[0];
        let data = data.as_ref().unwrap();
        assert_eq!(data.size, 6);
        assert_eq!(data.hash.len(), 64);
    }
}
