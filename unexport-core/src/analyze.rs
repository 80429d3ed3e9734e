//! Export safety analysis.
//!
//! Proves, for each exported symbol of a target package, that nothing
//! outside the package refers to it:
//!
//! 1. scoped load of the target, candidates from that load;
//! 2. affected set = target plus everything transitively importing it;
//! 3. full load of the affected set, candidates derived again (symbol ids
//!    never cross loads, keys do);
//! 4. reference scan over every scanned package of the full load.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{UnexportError, UnexportResult};
use crate::gosrc::{
    Program, SourceToolkit, Symbol, SymbolId, SymbolKey, SymbolKind, UnresolvedRef,
};
use crate::importgraph::ImportGraphIndex;

/// Outcome of the reference scan for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verdict {
    /// No reference outside the defining package.
    Safe,
    /// Referenced, or possibly referenced, from `package`.
    Unsafe { package: String, location: String },
    /// Kept exported: an occurrence in its own package could not be bound,
    /// so a rename could not be applied consistently.
    Blocked { location: String },
}

impl Verdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Verdict::Safe)
    }
}

/// Which exported symbols are considered at all.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    /// Names (`Foo`) or qualified names (`T.Foo`) to restrict to; empty = all.
    pub allowlist: BTreeSet<String>,
    /// Names never unexported.
    pub protected: BTreeSet<String>,
    /// Keep struct fields that carry a tag.
    pub protect_tagged_fields: bool,
}

impl CandidateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allowlist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist = names
            .into_iter()
            .map(Into::into)
            .filter(|n: &String| !n.is_empty())
            .collect();
        self
    }

    pub fn with_protected<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_protect_tagged_fields(mut self, protect: bool) -> Self {
        self.protect_tagged_fields = protect;
        self
    }

    fn allows(&self, symbol: &Symbol) -> bool {
        let listed = |set: &BTreeSet<String>| {
            set.contains(&symbol.name) || set.contains(&symbol.key.qualified_name)
        };
        (self.allowlist.is_empty() || listed(&self.allowlist))
            && !listed(&self.protected)
            && !(self.protect_tagged_fields && symbol.tagged)
    }
}

/// Exported symbols of `target` that pass `filter`, in id order.
///
/// Functions the test driver calls by name stay exported.
pub fn candidates(program: &Program, target: &str, filter: &CandidateFilter) -> Vec<SymbolId> {
    program
        .symbols()
        .filter(|(_, s)| {
            s.package() == target && s.exported && !s.is_test_entry_point() && filter.allows(s)
        })
        .map(|(id, _)| id)
        .collect()
}

fn site_location(program: &Program, package: &str, file: usize, line: usize, column: usize) -> String {
    let path = program
        .package(package)
        .map(|p| p.file_path(file).display().to_string())
        .unwrap_or_default();
    format!("{}:{}:{}", path, line, column)
}

/// Scans every scanned package of `program` for references to `candidates`.
pub fn scan_references(program: &Program, candidates: &[SymbolId]) -> BTreeMap<SymbolId, Verdict> {
    let mut verdicts: BTreeMap<SymbolId, Verdict> =
        candidates.iter().map(|&id| (id, Verdict::Safe)).collect();

    // Bound uses from another package.
    for package in program.scanned_packages() {
        for site in &package.uses {
            let Some(verdict) = verdicts.get_mut(&site.symbol) else {
                continue;
            };
            if !verdict.is_safe() || program.symbol(site.symbol).package() == package.path {
                continue;
            }
            *verdict = Verdict::Unsafe {
                package: package.path.clone(),
                location: site_location(program, &package.path, site.file, site.line, site.column),
            };
        }
    }

    // Occurrences the resolver could not bind, by name.
    let mut unresolved: HashMap<&str, Vec<(&str, &UnresolvedRef)>> = HashMap::new();
    for package in program.scanned_packages() {
        for r in &package.unresolved {
            unresolved
                .entry(r.name.as_str())
                .or_default()
                .push((package.path.as_str(), r));
        }
    }

    // Methods declared anywhere in the load, by name.
    let mut methods: HashMap<&str, Vec<&Symbol>> = HashMap::new();
    for (_, symbol) in program.symbols() {
        if symbol.kind == SymbolKind::Method {
            methods.entry(symbol.name.as_str()).or_default().push(symbol);
        }
    }

    for (&id, verdict) in verdicts.iter_mut() {
        if !verdict.is_safe() {
            continue;
        }
        let symbol = program.symbol(id);
        let home = symbol.package();
        let member = symbol.kind.is_member();

        if symbol.kind == SymbolKind::Method {
            if let Some(other) = methods
                .get(symbol.name.as_str())
                .and_then(|ms| ms.iter().find(|m| m.package() != home))
            {
                *verdict = Verdict::Unsafe {
                    package: other.package().to_string(),
                    location: other.location(),
                };
                continue;
            }
        }

        let Some(refs) = unresolved.get(symbol.name.as_str()) else {
            continue;
        };
        // A package-level name can only turn up unbound as a literal key.
        let relevant = |r: &&(&str, &UnresolvedRef)| member || r.1.is_key;
        if member {
            if let Some((package, r)) = refs.iter().filter(relevant).find(|(p, _)| *p != home) {
                *verdict = Verdict::Unsafe {
                    package: package.to_string(),
                    location: site_location(program, package, r.file, r.line, r.column),
                };
                continue;
            }
        }
        if let Some((package, r)) = refs.iter().filter(relevant).find(|(p, _)| *p == home) {
            *verdict = Verdict::Blocked {
                location: site_location(program, package, r.file, r.line, r.column),
            };
        }
    }

    // Same-named methods rename together: one held back holds back all.
    let mut held: BTreeMap<&str, (String, String)> = BTreeMap::new();
    for (&id, verdict) in &verdicts {
        let symbol = program.symbol(id);
        if symbol.kind != SymbolKind::Method {
            continue;
        }
        match verdict {
            Verdict::Safe => {}
            Verdict::Unsafe { package, location } => {
                held.entry(symbol.name.as_str())
                    .or_insert_with(|| (package.clone(), location.clone()));
            }
            Verdict::Blocked { location } => {
                held.entry(symbol.name.as_str())
                    .or_insert_with(|| (symbol.package().to_string(), location.clone()));
            }
        }
    }
    for (&id, verdict) in verdicts.iter_mut() {
        let symbol = program.symbol(id);
        if symbol.kind != SymbolKind::Method || !verdict.is_safe() {
            continue;
        }
        if let Some((package, location)) = held.get(symbol.name.as_str()) {
            *verdict = Verdict::Unsafe {
                package: package.clone(),
                location: location.clone(),
            };
        }
    }

    verdicts
}

/// Everything the analysis learned. Owns the full-load program, which the
/// rewriter works from.
#[derive(Debug)]
pub struct Analysis {
    pub target: String,
    pub program: Program,
    /// Candidates of the full load, sorted by key.
    pub exported: Vec<SymbolKey>,
    pub verdicts: BTreeMap<SymbolKey, Verdict>,
    pub safe: BTreeSet<SymbolKey>,
    pub affected: BTreeSet<String>,
    /// Packages left out of the import graph, with the reason.
    pub graph_errors: BTreeMap<String, String>,
}

impl Analysis {
    /// Candidates kept exported, unsafe or blocked.
    pub fn unsafe_count(&self) -> usize {
        self.verdicts.values().filter(|v| !v.is_safe()).count()
    }
}

/// Drives the two loads and the reference scan.
pub struct ExportAnalyzer<'a> {
    toolkit: &'a dyn SourceToolkit,
    index: &'a dyn ImportGraphIndex,
    filter: CandidateFilter,
}

impl<'a> ExportAnalyzer<'a> {
    pub fn new(toolkit: &'a dyn SourceToolkit, index: &'a dyn ImportGraphIndex) -> Self {
        Self {
            toolkit,
            index,
            filter: CandidateFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: CandidateFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn analyze(&self, target: &str) -> UnexportResult<Analysis> {
        if target.is_empty() {
            return Err(UnexportError::invalid_argument(
                "import path of the package must be given",
            ));
        }

        let scoped = self
            .toolkit
            .load_program(&BTreeSet::from([target.to_string()]), true)?;
        if scoped.package(target).is_none() {
            return Err(UnexportError::load(target, "package not found in load"));
        }
        let first = candidates(&scoped, target, &self.filter);
        debug!(target, candidates = first.len(), "scoped load done");

        let mut graph_errors = BTreeMap::new();
        let affected = if first.is_empty() {
            BTreeSet::from([target.to_string()])
        } else {
            let scan = self.index.build_reverse_graph();
            for (package, err) in &scan.errors {
                warn!(package = %package, error = %err, "package skipped while scanning workspace");
                graph_errors.insert(package.clone(), err.to_string());
            }
            scan.graph.reverse_dependents(target)
        };
        info!(count = affected.len(), "possible affected packages");
        for package in &affected {
            info!(package = %package, "affected");
        }
        drop(scoped);

        let program = self.toolkit.load_program(&affected, true)?;
        let ids = candidates(&program, target, &self.filter);
        for &id in &ids {
            info!(symbol = %program.symbol(id).key, kind = %program.symbol(id).kind, "exported");
        }

        let verdicts: BTreeMap<SymbolKey, Verdict> = scan_references(&program, &ids)
            .into_iter()
            .map(|(id, v)| (program.symbol(id).key.clone(), v))
            .collect();
        let safe: BTreeSet<SymbolKey> = verdicts
            .iter()
            .filter(|(_, v)| v.is_safe())
            .map(|(k, _)| k.clone())
            .collect();

        for (key, verdict) in &verdicts {
            match verdict {
                Verdict::Safe => info!(symbol = %key, "safe to unexport"),
                Verdict::Unsafe { package, location } => {
                    info!(symbol = %key, package = %package, location = %location, "used outside its package")
                }
                Verdict::Blocked { location } => {
                    warn!(symbol = %key, location = %location, "kept exported: unresolved reference in its own package")
                }
            }
        }

        let mut exported: Vec<SymbolKey> = verdicts.keys().cloned().collect();
        exported.sort();
        Ok(Analysis {
            target: target.to_string(),
            program,
            exported,
            verdicts,
            safe,
            affected,
            graph_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gosrc::GoToolkit;
    use crate::importgraph::{GoImportGraph, GraphScan, ReverseImportGraph};
    use crate::workspace::Workspace;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_module(name: &str, files: &[(&str, &str)]) -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("unexport_analyze_test")
            .join(format!("{}_{}_{}", name, std::process::id(), id));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("go.mod"), "module m\n\ngo 1.21\n").unwrap();
        for (rel, content) in files {
            let path = dir.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    fn analyze(root: &Path, target: &str, filter: CandidateFilter) -> Analysis {
        let ws = Workspace::discover(root).unwrap();
        let toolkit = GoToolkit::new(ws.clone());
        let index = GoImportGraph::new(ws);
        ExportAnalyzer::new(&toolkit, &index)
            .with_filter(filter)
            .analyze(target)
            .unwrap()
    }

    fn safe_names(a: &Analysis) -> Vec<&str> {
        a.safe.iter().map(|k| k.qualified_name.as_str()).collect()
    }

    fn verdict<'a>(a: &'a Analysis, qualified: &str) -> &'a Verdict {
        a.verdicts
            .iter()
            .find(|(k, _)| k.qualified_name == qualified)
            .map(|(_, v)| v)
            .unwrap()
    }

    /// Counts loads and hands out a fixed graph.
    struct Recording<'a> {
        inner: GoToolkit,
        loads: &'a Mutex<Vec<BTreeSet<String>>>,
    }

    impl SourceToolkit for Recording<'_> {
        fn load_program(&self, paths: &BTreeSet<String>, tests: bool) -> UnexportResult<Program> {
            self.loads.lock().unwrap().push(paths.clone());
            self.inner.load_program(paths, tests)
        }
    }

    struct FixedGraph(ReverseImportGraph);

    impl ImportGraphIndex for FixedGraph {
        fn build_reverse_graph(&self) -> GraphScan {
            let mut errors = BTreeMap::new();
            errors.insert("m/broken".to_string(), UnexportError::parse("broken.go", "bad"));
            GraphScan {
                graph: self.0.clone(),
                errors,
            }
        }
    }

    #[test]
    fn test_internal_only_use_is_safe() {
        let root = create_module(
            "internal_only",
            &[
                ("a/a.go", "package a\n\nfunc Foo() int { return 1 }\n\nfunc Use() int { return Foo() }\n"),
                (
                    "a/a_test.go",
                    "package a\n\nimport \"testing\"\n\nfunc TestFoo(t *testing.T) { _ = Foo() }\n",
                ),
                ("b/b.go", "package b\n\nimport \"m/a\"\n\nvar X = a.Use()\n"),
            ],
        );
        let a = analyze(&root, "m/a", CandidateFilter::new());
        assert_eq!(safe_names(&a), vec!["Foo"]);
        assert!(matches!(verdict(&a, "Use"), Verdict::Unsafe { package, .. } if package == "m/b"));
        assert_eq!(a.unsafe_count(), 1);
        assert_eq!(a.affected, BTreeSet::from(["m/a".to_string(), "m/b".to_string()]));
        // test entry points are never candidates
        assert!(a.exported.iter().all(|k| k.qualified_name != "TestFoo"));
    }

    #[test]
    fn test_two_hop_use_is_found() {
        let root = create_module(
            "two_hop",
            &[
                ("a/a.go", "package a\n\ntype T struct{ N int }\n\nfunc New() T { return T{} }\n"),
                ("b/b.go", "package b\n\nimport \"m/a\"\n\nfunc Make() a.T { return a.New() }\n"),
                ("c/c.go", "package c\n\nimport \"m/b\"\n\nvar N = b.Make().N\n"),
            ],
        );
        let a = analyze(&root, "m/a", CandidateFilter::new());
        assert!(a.affected.contains("m/c"));
        assert!(matches!(verdict(&a, "T.N"), Verdict::Unsafe { package, .. } if package == "m/c"));
        assert!(safe_names(&a).is_empty());
    }

    #[test]
    fn test_external_test_use_counts() {
        let root = create_module(
            "xtest",
            &[
                ("a/a.go", "package a\n\nfunc Foo() {}\n\nfunc Bar() {}\n"),
                (
                    "a/a_test.go",
                    "package a_test\n\nimport (\n\t\"testing\"\n\t\"m/a\"\n)\n\nfunc TestFoo(t *testing.T) { a.Foo() }\n",
                ),
            ],
        );
        let a = analyze(&root, "m/a", CandidateFilter::new());
        assert!(matches!(verdict(&a, "Foo"), Verdict::Unsafe { package, .. } if package == "m/a_test"));
        assert_eq!(safe_names(&a), vec!["Bar"]);
    }

    #[test]
    fn test_allowlist_and_protected() {
        let root = create_module(
            "filters",
            &[(
                "a/a.go",
                "package a\n\ntype T struct {\n\tName string `json:\"name\"`\n\tAge  int\n}\n\nfunc Foo() {}\n\nfunc Bar() {}\n",
            )],
        );
        let a = analyze(&root, "m/a", CandidateFilter::new().with_allowlist(["Foo", "T.Age", ""]));
        assert_eq!(safe_names(&a), vec!["Foo", "T.Age"]);

        let a = analyze(
            &root,
            "m/a",
            CandidateFilter::new()
                .with_protected(["Bar"])
                .with_protect_tagged_fields(true),
        );
        assert_eq!(safe_names(&a), vec!["Foo", "T", "T.Age"]);
    }

    #[test]
    fn test_no_exports_skips_graph() {
        let root = create_module(
            "no_exports",
            &[
                ("a/a.go", "package a\n\nfunc foo() {}\n"),
                ("b/b.go", "package b\n\nimport _ \"m/a\"\n"),
            ],
        );
        let a = analyze(&root, "m/a", CandidateFilter::new());
        assert!(a.exported.is_empty());
        assert!(a.safe.is_empty());
        assert_eq!(a.affected, BTreeSet::from(["m/a".to_string()]));
    }

    #[test]
    fn test_method_name_shared_with_other_package_is_unsafe() {
        let root = create_module(
            "method_coupling",
            &[
                ("a/a.go", "package a\n\ntype T struct{}\n\nfunc (T) Run() {}\n\nfunc (T) Stop() {}\n"),
                (
                    "b/b.go",
                    "package b\n\nimport _ \"m/a\"\n\ntype Runner interface{ Run() }\n",
                ),
            ],
        );
        let a = analyze(&root, "m/a", CandidateFilter::new());
        assert!(matches!(verdict(&a, "T.Run"), Verdict::Unsafe { package, .. } if package == "m/b"));
        assert!(verdict(&a, "T.Stop").is_safe());
    }

    #[test]
    fn test_unresolved_member_in_own_package_blocks() {
        let root = create_module(
            "blocked",
            &[(
                "a/a.go",
                "package a\n\ntype T struct{ Path string }\n\nfunc F(get func() *T) string {\n\treturn get().Path\n}\n",
            )],
        );
        let a = analyze(&root, "m/a", CandidateFilter::new());
        assert!(matches!(verdict(&a, "T.Path"), Verdict::Blocked { .. }));
        assert!(!a.safe.iter().any(|k| k.qualified_name == "T.Path"));
        assert_eq!(a.unsafe_count(), 1);
    }

    #[test]
    fn test_phases_and_graph_errors() {
        let root = create_module(
            "phases",
            &[
                ("a/a.go", "package a\n\nfunc Foo() {}\n"),
                ("b/b.go", "package b\n\nimport \"m/a\"\n\nfunc B() { a.Foo() }\n"),
            ],
        );
        let ws = Workspace::discover(&root).unwrap();
        let loads = Mutex::new(Vec::new());
        let toolkit = Recording {
            inner: GoToolkit::new(ws),
            loads: &loads,
        };
        let mut graph = ReverseImportGraph::new();
        graph.add_import("m/b", "m/a");
        let index = FixedGraph(graph);

        let a = ExportAnalyzer::new(&toolkit, &index).analyze("m/a").unwrap();
        let loads = loads.lock().unwrap();
        assert_eq!(loads.len(), 2);
        assert_eq!(loads[0], BTreeSet::from(["m/a".to_string()]));
        assert_eq!(loads[1], a.affected);
        assert!(a.graph_errors.contains_key("m/broken"));
        assert!(!a.verdicts.values().next().unwrap().is_safe());
    }

    #[test]
    fn test_empty_target_is_argument_error() {
        let toolkit = GoToolkit::new(Workspace::new("/nonexistent", "m"));
        let index = FixedGraph(ReverseImportGraph::new());
        let err = ExportAnalyzer::new(&toolkit, &index).analyze("").unwrap_err();
        assert!(matches!(err, UnexportError::InvalidArgument { .. }));
    }
}
