//! Go module discovery and import-path mapping.
//!
//! A workspace is one Go module: the directory holding `go.mod` and every
//! package directory below it that is not pruned by [`crate::scan`].
//! Import paths are `module-path/relative-dir`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::constraint::BuildContext;
use crate::error::{IoResultExt, UnexportError, UnexportResult};
use crate::scan::{gather_go_files, group_by_dir};

fn module_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    // SAFETY: hardcoded pattern.
    REGEX.get_or_init(|| {
        Regex::new(r#"(?m)^\s*module\s+"?([^\s"]+)"?\s*(?://.*)?$"#)
            .expect("Hardcoded regex pattern is valid")
    })
}

/// Extracts the module path from `go.mod` content.
pub fn parse_module_path(go_mod: &str) -> Option<String> {
    module_regex()
        .captures(go_mod)
        .map(|caps| caps[1].to_string())
}

/// Walks up from `start` to the nearest directory holding `go.mod`.
pub fn find_module_root(start: &Path) -> Option<PathBuf> {
    let canonical = start.canonicalize().ok()?;
    let mut current = Some(canonical.as_path());
    while let Some(dir) = current {
        if dir.join("go.mod").is_file() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

/// A Go module on disk plus the settings that decide which files are in it.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    module_path: String,
    excludes: Vec<String>,
    build: BuildContext,
}

impl Workspace {
    /// Locates the enclosing module of `start` and reads its module path.
    pub fn discover(start: &Path) -> UnexportResult<Self> {
        let root = find_module_root(start).ok_or_else(|| {
            UnexportError::workspace(start, "no go.mod found in this directory or any parent")
        })?;
        let go_mod = root.join("go.mod");
        let content = fs::read_to_string(&go_mod).with_path(&go_mod)?;
        let module_path = parse_module_path(&content)
            .ok_or_else(|| UnexportError::workspace(&go_mod, "missing module directive"))?;
        Ok(Self::new(root, module_path))
    }

    pub fn new(root: impl Into<PathBuf>, module_path: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            module_path: module_path.into(),
            excludes: Vec::new(),
            build: BuildContext::default(),
        }
    }

    pub fn with_excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }

    pub fn with_build_context(mut self, build: BuildContext) -> Self {
        self.build = build;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn build(&self) -> &BuildContext {
        &self.build
    }

    /// Whether an import path names a package inside this module.
    pub fn contains_import_path(&self, path: &str) -> bool {
        path == self.module_path
            || path
                .strip_prefix(self.module_path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Import path of a package directory, if it lies inside the module.
    pub fn import_path_for_dir(&self, dir: &Path) -> Option<String> {
        let rel = dir.strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?.to_string()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if parts.is_empty() {
            Some(self.module_path.clone())
        } else {
            Some(format!("{}/{}", self.module_path, parts.join("/")))
        }
    }

    /// Directory of an in-module import path. Does not check existence.
    pub fn dir_for_import_path(&self, path: &str) -> Option<PathBuf> {
        if !self.contains_import_path(path) {
            return None;
        }
        let rest = path[self.module_path.len()..].trim_start_matches('/');
        let mut dir = self.root.clone();
        for part in rest.split('/').filter(|p| !p.is_empty()) {
            if part == "." || part == ".." {
                return None;
            }
            dir.push(part);
        }
        Some(dir)
    }

    /// Every package directory of the module, keyed by import path, with all
    /// of its `.go` files (build constraints are applied later, per load).
    pub fn package_dirs(&self) -> UnexportResult<BTreeMap<String, Vec<PathBuf>>> {
        let files = gather_go_files(&self.root, &self.excludes)
            .map_err(|e| UnexportError::workspace(&self.root, format!("{:#}", e)))?;

        Ok(group_by_dir(files)
            .into_iter()
            .filter_map(|(dir, files)| self.import_path_for_dir(&dir).map(|p| (p, files)))
            .collect())
    }

    /// The `.go` files of one package directory (non-recursive, sorted).
    pub fn files_in_dir(&self, dir: &Path) -> UnexportResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).with_path(dir)? {
            let path = entry.with_path(dir)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "go") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}
