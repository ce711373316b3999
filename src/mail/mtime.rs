//! Modification time bookkeeping: the last-seen mtime and per-file snapshots.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use super::maildir::unique_id;
use crate::error::{Error, Result};

fn modified(path: &Path) -> Result<Duration> {
    let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    let mtime = metadata.modified().map_err(|e| Error::io(path, e))?;
    Ok(mtime
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default())
}

/// Get file modification time in seconds since epoch
pub fn file_mtime(path: &Path) -> Result<i64> {
    Ok(i64::try_from(modified(path)?.as_secs()).unwrap_or(i64::MAX))
}

/// Reads the last-seen mtime. A missing or unreadable file counts as 0.
pub fn load_last_mtime(path: &Path) -> i64 {
    match fs::read_to_string(path) {
        Ok(content) => content.trim().parse().unwrap_or_else(|_| {
            warn!(path = %path.display(), "Ignoring malformed mtime file");
            0
        }),
        Err(_) => 0,
    }
}

pub fn save_last_mtime(path: &Path, mtime: i64) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::write(path, mtime.to_string()).map_err(|e| Error::io(path, e))
}

/// Modification times of a set of message files, keyed by path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    entries: BTreeMap<PathBuf, f64>,
}

impl Snapshot {
    pub fn capture(files: &[PathBuf]) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for path in files {
            entries.insert(path.clone(), modified(path)?.as_secs_f64());
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loads a snapshot written by [`Snapshot::save`]. A missing file is an empty snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

        let mut entries = BTreeMap::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let parsed = line
                .split_once(' ')
                .and_then(|(mtime, file)| Some((mtime.parse::<f64>().ok()?, file)));
            match parsed {
                Some((mtime, file)) => {
                    entries.insert(PathBuf::from(file), mtime);
                }
                None => warn!(line, "Skipping malformed snapshot line"),
            }
        }
        Ok(Self { entries })
    }

    /// One `<mtime> <path>` line per file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = BufWriter::new(file);
        for (file, mtime) in &self.entries {
            writeln!(writer, "{} {}", mtime, file.display()).map_err(|e| Error::io(path, e))?;
        }
        writer.flush().map_err(|e| Error::io(path, e))
    }

    /// Recorded mtimes keyed by folder and unique id, so files that were
    /// renamed for flags or moved from `new/` to `cur/` still match.
    fn by_identity(&self) -> HashMap<(PathBuf, String), f64> {
        self.entries
            .iter()
            .map(|(path, &mtime)| (identity(path), mtime))
            .collect()
    }

    /// Files in `files` that are new since the snapshot or whose mtime changed.
    pub fn changed(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let known = self.by_identity();
        let mut changed = Vec::new();
        for path in files {
            let current = modified(path)?.as_secs_f64();
            match known.get(&identity(path)) {
                Some(&mtime) if mtime == current => {}
                _ => changed.push(path.clone()),
            }
        }
        Ok(changed)
    }

    /// Sets the recorded mtime back on every file in `files` that the
    /// snapshot knows about. Returns how many files were touched.
    pub fn restore(&self, files: &[PathBuf]) -> Result<usize> {
        let known = self.by_identity();
        let mut restored = 0;
        for path in files {
            let Some(&mtime) = known.get(&identity(path)) else {
                continue;
            };
            if modified(path)?.as_secs_f64() == mtime {
                continue;
            }
            let time = SystemTime::UNIX_EPOCH + Duration::from_secs_f64(mtime.max(0.0));
            let file = File::options()
                .write(true)
                .open(path)
                .map_err(|e| Error::io(path, e))?;
            file.set_modified(time).map_err(|e| Error::io(path, e))?;
            debug!(path = %path.display(), mtime, "Restored mtime");
            restored += 1;
        }
        Ok(restored)
    }
}

/// Folder (the parent of `cur`/`new`) plus the unique part of the filename.
fn identity(path: &Path) -> (PathBuf, String) {
    let folder = path
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    (folder, unique_id(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_mtime(path: &Path, secs: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn test_last_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/last.mtime");
        assert_eq!(load_last_mtime(&path), 0);

        save_last_mtime(&path, 1_700_000_000).unwrap();
        assert_eq!(load_last_mtime(&path), 1_700_000_000);

        fs::write(&path, "garbage").unwrap();
        assert_eq!(load_last_mtime(&path), 0);
    }

    #[test]
    fn test_file_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, "x").unwrap();
        set_mtime(&path, 1_000_000);
        assert_eq!(file_mtime(&path).unwrap(), 1_000_000);
    }

    #[test]
    fn test_snapshot_changed_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let cur = dir.path().join("INBOX/cur");
        fs::create_dir_all(&cur).unwrap();
        let a = cur.join("a.host:2,");
        let b = cur.join("b.host:2,S");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();
        set_mtime(&a, 1_000);
        set_mtime(&b, 2_000);

        let snap_path = dir.path().join("snapshot");
        Snapshot::capture(&[a.clone(), b.clone()])
            .unwrap()
            .save(&snap_path)
            .unwrap();
        let snap = Snapshot::load(&snap_path).unwrap();
        assert_eq!(snap.len(), 2);

        // a is renamed for a flag change and touched, c is new
        let a2 = cur.join("a.host:2,S");
        fs::rename(&a, &a2).unwrap();
        set_mtime(&a2, 5_000);
        let c = cur.join("c.host:2,");
        fs::write(&c, "c").unwrap();

        let files = vec![a2.clone(), b.clone(), c.clone()];
        assert_eq!(snap.changed(&files).unwrap(), vec![a2.clone(), c.clone()]);

        assert_eq!(snap.restore(&files).unwrap(), 1);
        assert_eq!(file_mtime(&a2).unwrap(), 1_000);
        assert_eq!(snap.changed(&files).unwrap(), vec![c]);
    }

    #[test]
    fn test_snapshot_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Snapshot::load(&dir.path().join("none")).unwrap().is_empty());
    }
}
