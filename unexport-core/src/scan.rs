//! Parallel, deterministic discovery of Go source files with directory pruning.
//!
//! Follows the `go` tool's conventions for what is *not* part of a module:
//! - `vendor/` and `testdata/` directories
//! - directories whose name starts with `.` or `_`
//! - nested modules (a subdirectory with its own `go.mod`)

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories to exclude by default.
const EXCLUDED_DIRS: &[&str] = &["vendor", "testdata", "node_modules", ".git"];

/// Checks if a directory entry should be pruned (excluded from traversal).
///
/// Called by `WalkDir::filter_entry`, so a pruned directory skips its whole
/// subtree. The walk root itself is never pruned.
#[inline]
fn is_excluded_dir(entry: &walkdir::DirEntry, excludes: &HashSet<&str>) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let Some(name) = entry.file_name().to_str() else {
        return true;
    };
    excludes.contains(name)
        || name.starts_with('.')
        || name.starts_with('_')
        || entry.path().join("go.mod").is_file()
}

/// Gathers all `.go` files below `root`, sorted by path.
///
/// `extra_excludes` are directory names pruned in addition to the defaults.
pub fn gather_go_files(root: &Path, extra_excludes: &[String]) -> Result<Vec<PathBuf>> {
    let all_excludes: HashSet<&str> = EXCLUDED_DIRS
        .iter()
        .copied()
        .chain(extra_excludes.iter().map(String::as_str))
        .collect();

    let mut files = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_excluded_dir(e, &all_excludes))
        .par_bridge()
        .filter_map(|entry| match entry {
            Ok(e) => {
                let path = e.path();
                if e.file_type().is_file() && path.extension().is_some_and(|ext| ext == "go") {
                    Some(Ok(path.to_path_buf()))
                } else {
                    None
                }
            }
            Err(e) => Some(Err(e.into())),
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Failed to gather .go files from {}", root.display()))?;

    files.sort();
    Ok(files)
}

/// Groups files by their containing directory.
pub fn group_by_dir(files: Vec<PathBuf>) -> BTreeMap<PathBuf, Vec<PathBuf>> {
    let mut dirs: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for file in files {
        if let Some(parent) = file.parent() {
            dirs.entry(parent.to_path_buf()).or_default().push(file);
        }
    }
    for files in dirs.values_mut() {
        files.sort();
    }
    dirs
}

/// True for `_test.go` files.
pub fn is_test_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with("_test.go"))
}
