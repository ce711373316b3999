//! Maildir naming conventions: `<root>/<folder>/(cur|new|tmp)/<unique>:2,<flags>`.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use super::types::{Flag, Flags};
use crate::error::{Error, Result};

/// Separator between the unique part of a filename and its flag letters.
pub const INFO_SEP: &str = ":2,";

/// Folder marker files that exclude a folder from tagging and expiry.
const IGNORE_MARKERS: [&str; 2] = [".noindex", ".notag"];

/// Splits a filename into its unique part and its flag letters.
pub fn split_filename(filename: &str) -> (&str, &str) {
    match filename.rfind(INFO_SEP) {
        Some(pos) => (&filename[..pos], &filename[pos + INFO_SEP.len()..]),
        None => (filename, ""),
    }
}

/// Parse flags from the filename suffix (e.g. `:2,RS` -> replied, seen).
pub fn parse_flags(path: &Path) -> Flags {
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if !filename.contains(INFO_SEP) {
        return Flags::new();
    }
    split_filename(filename)
        .1
        .chars()
        .filter_map(Flag::from_letter)
        .collect()
}

pub fn unique_id(path: &Path) -> String {
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    split_filename(filename).0.to_string()
}

/// Rebuilds a filename so its info section encodes exactly `flags`.
///
/// Letters that are not standard maildir flags are kept, and the whole
/// suffix is written in ASCII order (`DFPRST`) as the maildir convention
/// requires. Listings that give the flags as D, F, S, P, R, T name the
/// same set; that order is not what ends up in the filename.
pub fn filename_with_flags(filename: &str, flags: &Flags) -> String {
    let (unique, letters) = split_filename(filename);
    let mut new_letters: Vec<char> = letters
        .chars()
        .filter(|&c| Flag::from_letter(c).is_none())
        .chain(flags.iter().map(|f| f.letter()))
        .collect();
    new_letters.sort_unstable();
    new_letters.dedup();

    let new_letters: String = new_letters.into_iter().collect();
    format!("{unique}{INFO_SEP}{new_letters}")
}

/// Folder of `path` relative to `root`, written like `/All Mail`.
///
/// Returns `None` when the path does not follow the
/// `<folder>/(cur|new|tmp)/<file>` layout below `root`.
pub fn folder_of(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;

    if parts.len() < 2 || !matches!(parts[parts.len() - 2], "cur" | "new" | "tmp") {
        return None;
    }
    Some(format!("/{}", parts[..parts.len() - 2].join("/")))
}

/// The `tmp` directory sitting next to the `cur`/`new` directory holding `path`.
pub fn tmp_dir_for(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let in_subdir = parent
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| matches!(n, "cur" | "new" | "tmp"));
    match parent.parent() {
        Some(folder) if in_subdir => folder.join("tmp"),
        _ => parent.to_path_buf(),
    }
}

pub fn should_ignore(folder: &Path) -> bool {
    IGNORE_MARKERS.iter().any(|m| folder.join(m).exists())
}

/// Whether the folder named like `/All Mail` below `root` is ignored.
pub fn should_ignore_folder(root: &Path, folder: &str) -> bool {
    should_ignore(&root.join(folder.trim_start_matches('/')))
}

/// All message files in `cur/` and `new/` of every non-ignored top level folder.
pub fn maildir_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = fs::read_dir(root).map_err(|e| Error::io(root, e))?;

    let mut folders: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir() && !should_ignore(p))
        .collect();
    folders.sort();

    for folder in folders {
        for sub in ["cur", "new"] {
            let dir = folder.join(sub);
            if !dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
                let entry = entry.map_err(|e| Error::io(&dir, io::Error::from(e)))?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        }
    }

    Ok(files)
}

/// Moves a message file into `<folder>/cur/`, keeping its filename.
pub fn move_to_folder(path: &Path, folder: &Path) -> Result<PathBuf> {
    let cur = folder.join("cur");
    fs::create_dir_all(&cur).map_err(|e| Error::io(&cur, e))?;

    let filename = path
        .file_name()
        .ok_or_else(|| Error::io(path, io::Error::other("path has no file name")))?;
    let target = cur.join(filename);
    fs::rename(path, &target).map_err(|e| Error::io(path, e))?;
    Ok(target)
}
