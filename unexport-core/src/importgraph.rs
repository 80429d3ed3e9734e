//! Whole-module import graph, kept reversed: an edge runs from an imported
//! package to each package importing it.
//!
//! Imports of `_test.go` files count for the directory's package, external
//! test package included, so a package used only from another package's
//! tests still shows up as a dependent.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::common::GraphTraversal;
use crate::error::{IoResultExt, UnexportError, UnexportResult};
use crate::gosrc::decl_extractor::extract_imports;
use crate::gosrc::syntax::parse_go;
use crate::workspace::Workspace;

/// Builds the reverse import graph of a workspace.
pub trait ImportGraphIndex {
    /// Scans every package. A package whose files cannot be read or parsed
    /// is left out of the graph and reported in [`GraphScan::errors`].
    fn build_reverse_graph(&self) -> GraphScan;
}

/// Outcome of an import graph scan.
#[derive(Debug, Default)]
pub struct GraphScan {
    pub graph: ReverseImportGraph,
    /// Package path → why it was left out.
    pub errors: BTreeMap<String, UnexportError>,
}

/// Reverse import graph over package import paths.
#[derive(Debug, Default, Clone)]
pub struct ReverseImportGraph {
    graph: DiGraphMap<u32, ()>,
    names: Vec<String>,
    index: HashMap<String, u32>,
}

impl ReverseImportGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, path: &str) -> u32 {
        if let Some(&id) = self.index.get(path) {
            return id;
        }
        let id = self.names.len() as u32;
        self.names.push(path.to_string());
        self.index.insert(path.to_string(), id);
        self.graph.add_node(id);
        id
    }

    pub fn add_package(&mut self, path: &str) {
        self.node(path);
    }

    /// Records that `importer` imports `imported`.
    pub fn add_import(&mut self, importer: &str, imported: &str) {
        if importer == imported {
            return;
        }
        let from = self.node(imported);
        let to = self.node(importer);
        self.graph.add_edge(from, to, ());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn package_count(&self) -> usize {
        self.names.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Packages importing `path` directly.
    pub fn importers(&self, path: &str) -> BTreeSet<String> {
        self.index
            .get(path)
            .map(|&id| {
                self.graph
                    .neighbors_directed(id, Direction::Outgoing)
                    .map(|n| self.names[n as usize].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `path` plus every package importing it, directly or transitively.
    /// A package absent from the graph yields just itself.
    pub fn reverse_dependents(&self, path: &str) -> BTreeSet<String> {
        let mut out = self.closure_from([path.to_string()]);
        out.insert(path.to_string());
        out
    }
}

impl GraphTraversal for ReverseImportGraph {
    type Node = String;

    fn neighbors(&self, node: &String) -> Vec<String> {
        self.importers(node).into_iter().collect()
    }

    fn contains_node(&self, node: &String) -> bool {
        self.contains(node)
    }
}

/// Import graph scanner for a Go module.
#[derive(Debug, Clone)]
pub struct GoImportGraph {
    workspace: Workspace,
}

impl GoImportGraph {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    /// In-module imports of one package directory, test files included.
    fn scan_package(&self, files: &[PathBuf]) -> UnexportResult<BTreeSet<String>> {
        let build = self.workspace.build();
        let mut imports = BTreeSet::new();
        for file in files {
            let text = fs::read_to_string(file).with_path(file)?;
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            if !build
                .matches_file(name, &text)
                .map_err(|msg| UnexportError::parse(file, msg))?
            {
                continue;
            }
            let tree = parse_go(file, &text)?;
            let decls =
                extract_imports(tree.root_node(), text.as_bytes()).map_err(|e| e.into_error(file))?;
            imports.extend(
                decls
                    .imports
                    .into_iter()
                    .map(|spec| spec.path)
                    .filter(|p| self.workspace.contains_import_path(p)),
            );
        }
        Ok(imports)
    }
}

impl ImportGraphIndex for GoImportGraph {
    fn build_reverse_graph(&self) -> GraphScan {
        let mut scan = GraphScan::default();
        let packages = match self.workspace.package_dirs() {
            Ok(packages) => packages,
            Err(e) => {
                warn!(error = %e, "import graph scan failed");
                scan.errors.insert(self.workspace.module_path().to_string(), e);
                return scan;
            }
        };

        let results: Vec<(String, UnexportResult<BTreeSet<String>>)> = packages
            .par_iter()
            .map(|(path, files)| (path.clone(), self.scan_package(files)))
            .collect();

        for (path, result) in results {
            match result {
                Ok(imports) => {
                    scan.graph.add_package(&path);
                    for imported in &imports {
                        scan.graph.add_import(&path, imported);
                    }
                }
                Err(e) => {
                    warn!(package = %path, error = %e, "excluding package from import graph");
                    scan.errors.insert(path, e);
                }
            }
        }

        debug!(
            packages = scan.graph.package_count(),
            edges = scan.graph.edge_count(),
            errors = scan.errors.len(),
            "built reverse import graph"
        );
        scan
    }
}
