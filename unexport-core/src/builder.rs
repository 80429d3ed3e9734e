//! Builder pattern API for running unexport.
//!
//! ```rust,ignore
//! use unexport_core::prelude::*;
//!
//! let report = Unexport::new(".", "example.com/m/internal/store")
//!     .identifiers(["Open", "Close"])
//!     .tags(["integration"])
//!     .dry_run(true)
//!     .run()?;
//!
//! println!("{}", report.summary());
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::analyze::{Analysis, CandidateFilter, ExportAnalyzer, Verdict};
use crate::config::UnexportConfig;
use crate::constraint::BuildContext;
use crate::error::UnexportResult;
use crate::gosrc::GoToolkit;
use crate::importgraph::GoImportGraph;
use crate::plan::{collisions, plan};
use crate::report::{KeptSymbol, RenamedSymbol, RunReport};
use crate::rewrite::{persist, rewrite, CommandPrinter, Printer, SplicePrinter};
use crate::workspace::Workspace;

/// Builder for one unexport run over one target package.
#[derive(Debug, Clone)]
pub struct Unexport {
    /// Any directory inside the Go module
    root: PathBuf,

    /// Import path of the target package
    package: String,

    /// Restrict candidates to these names (empty = all)
    identifiers: Vec<String>,

    /// Extra active build tags
    tags: Vec<String>,

    /// Extra directory names to prune
    excluded_dirs: Vec<String>,

    /// Names that are never unexported
    protected: Vec<String>,

    protect_tagged_fields: bool,

    /// External formatter; the spliced text is written as is when unset
    printer_command: Option<Vec<String>>,

    /// Dry-run mode (don't modify files)
    dry_run: bool,
}

impl Unexport {
    pub fn new(root: impl Into<PathBuf>, package: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            package: package.into(),
            identifiers: Vec::new(),
            tags: Vec::new(),
            excluded_dirs: Vec::new(),
            protected: Vec::new(),
            protect_tagged_fields: false,
            printer_command: None,
            dry_run: false,
        }
    }

    /// Only consider these identifiers. Empty entries are ignored.
    pub fn identifiers(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.identifiers.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn exclude_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.excluded_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    pub fn protected(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.protected.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn protect_tagged_fields(mut self, enabled: bool) -> Self {
        self.protect_tagged_fields = enabled;
        self
    }

    pub fn printer_command(mut self, command: Vec<String>) -> Self {
        self.printer_command = Some(command).filter(|c| !c.is_empty());
        self
    }

    /// Enable dry-run mode (no file modifications).
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Folds in settings from `unexport.toml`. Explicit builder settings
    /// are kept; lists are merged.
    pub fn with_config(mut self, config: &UnexportConfig) -> Self {
        self.tags.extend(config.tags().iter().cloned());
        self.excluded_dirs.extend(config.excludes().iter().cloned());
        self.protected.extend(config.protected().iter().cloned());
        self.protect_tagged_fields |= config.protect_tagged_fields;
        if self.printer_command.is_none() {
            self.printer_command = config.printer_command().map(<[String]>::to_vec);
        }
        self
    }

    /// The module the run operates on.
    pub fn workspace(&self) -> UnexportResult<Workspace> {
        Ok(Workspace::discover(&self.root)?
            .with_excludes(self.excluded_dirs.clone())
            .with_build_context(BuildContext::new(self.tags.iter().cloned())))
    }

    fn filter(&self) -> CandidateFilter {
        CandidateFilter::new()
            .with_allowlist(self.identifiers.iter().cloned())
            .with_protected(self.protected.iter().cloned())
            .with_protect_tagged_fields(self.protect_tagged_fields)
    }

    /// Runs the analysis only.
    pub fn analyze(&self) -> UnexportResult<Analysis> {
        let workspace = self.workspace()?;
        let toolkit = GoToolkit::new(workspace.clone());
        let index = GoImportGraph::new(workspace);
        ExportAnalyzer::new(&toolkit, &index)
            .with_filter(self.filter())
            .analyze(&self.package)
    }

    /// Analyzes, plans, rewrites and persists.
    ///
    /// Load and argument errors are returned as `Err` before any file is
    /// touched. Write failures do not abort: they are listed in
    /// [`RunReport::errors`] after every file was attempted.
    pub fn run(&self) -> UnexportResult<RunReport> {
        let printer: Box<dyn Printer> = match &self.printer_command {
            Some(command) => Box::new(CommandPrinter::new(command)?),
            None => Box::new(SplicePrinter),
        };

        let analysis = self.analyze()?;
        info!(
            exported = analysis.exported.len(),
            safe = analysis.safe.len(),
            kept = analysis.unsafe_count(),
            "analysis finished"
        );
        let plan = plan(&analysis);
        let clashes = collisions(&plan, &analysis.program);
        for c in &clashes {
            warn!(symbol = %c.symbol, new_name = %c.new_name, existing = %c.existing, "rename collides with an existing identifier");
        }

        let rewritten = rewrite(&analysis.program, &plan);
        let outcome = persist(&rewritten, printer.as_ref(), self.dry_run);
        info!(
            occurrences = rewritten.occurrences(),
            files = rewritten.touched_files(),
            failed = outcome.errors.len(),
            dry_run = self.dry_run,
            "rewrite finished"
        );

        let renamed = plan
            .iter()
            .filter_map(|(key, new_name)| {
                let id = analysis.program.find_by_key(key)?;
                Some(RenamedSymbol {
                    symbol: key.clone(),
                    kind: analysis.program.symbol(id).kind,
                    new_name: new_name.to_string(),
                })
            })
            .collect();
        let kept = analysis
            .verdicts
            .iter()
            .filter(|(_, v)| !matches!(v, Verdict::Safe))
            .map(|(key, v)| KeptSymbol {
                symbol: key.clone(),
                verdict: v.clone(),
            })
            .collect();
        let packages: BTreeSet<&str> = rewritten.touched_packages();

        Ok(RunReport {
            package: analysis.target.clone(),
            dry_run: self.dry_run,
            occurrences: rewritten.occurrences(),
            files: rewritten
                .files
                .iter()
                .map(|f| f.path.display().to_string())
                .collect(),
            packages: packages.into_iter().map(str::to_string).collect(),
            affected: analysis.affected.iter().cloned().collect(),
            renamed,
            kept,
            collisions: clashes,
            scan_errors: analysis.graph_errors.clone(),
            errors: outcome.errors.iter().map(|e| e.to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnexportError;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_module(files: &[(&str, &str)]) -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("unexport_builder_test")
            .join(format!("{}_{}", std::process::id(), id));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("go.mod"), "module example.com/m\n\ngo 1.21\n").unwrap();
        for (rel, content) in files {
            let path = dir.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn test_builder_defaults() {
        let b = Unexport::new("/tmp", "example.com/m/a");
        assert!(!b.dry_run);
        assert!(b.identifiers.is_empty());
        assert!(b.printer_command.is_none());
    }

    #[test]
    fn test_builder_chaining_and_config() {
        let config: UnexportConfig = toml::from_str(
            "tags = [\"integration\"]\nprotected = [\"String\"]\nprotect_tagged_fields = true\n\n[printer]\ncommand = [\"gofmt\"]\n",
        )
        .unwrap();
        let b = Unexport::new("/tmp", "example.com/m/a")
            .identifiers(["Foo"])
            .tags(["extra"])
            .dry_run(true)
            .with_config(&config);
        assert_eq!(b.tags, vec!["extra".to_string(), "integration".to_string()]);
        assert_eq!(b.protected, vec!["String".to_string()]);
        assert!(b.protect_tagged_fields);
        assert_eq!(b.printer_command, Some(vec!["gofmt".to_string()]));

        let explicit = Unexport::new("/tmp", "example.com/m/a")
            .printer_command(vec!["goimports".to_string()])
            .with_config(&config);
        assert_eq!(explicit.printer_command, Some(vec!["goimports".to_string()]));
    }

    #[test]
    fn test_run_from_subdirectory() {
        let root = create_module(&[
            ("a/a.go", "package a\n\nfunc Helper() {}\n\nfunc Run() { Helper() }\n"),
            ("cmd/main.go", "package main\n\nimport \"example.com/m/a\"\n\nfunc main() { a.Run() }\n"),
        ]);
        let report = Unexport::new(root.join("cmd"), "example.com/m/a").run().unwrap();
        assert_eq!(report.occurrences, 2);
        assert_eq!(report.touched_files(), 1);
        assert_eq!(report.renamed.len(), 1);
        assert_eq!(report.renamed[0].new_name, "helper");
        assert_eq!(report.kept.len(), 1);
        assert!(!report.has_errors());
        assert_eq!(
            fs::read_to_string(root.join("a/a.go")).unwrap(),
            "package a\n\nfunc helper() {}\n\nfunc Run() { helper() }\n"
        );
    }

    #[test]
    fn test_run_rejects_foreign_package() {
        let root = create_module(&[("a/a.go", "package a\n")]);
        let err = Unexport::new(&root, "github.com/other/x").run().unwrap_err();
        assert!(matches!(err, UnexportError::InvalidArgument { .. }));
    }

    #[test]
    fn test_run_load_error_touches_nothing() {
        let root = create_module(&[
            ("a/a.go", "package a\n\nfunc Foo() {}\n"),
            ("a/bad.go", "package a\n\nfunc Bar( {\n"),
        ]);
        let err = Unexport::new(&root, "example.com/m/a").run().unwrap_err();
        assert!(matches!(err, UnexportError::Parse { .. }));
        assert_eq!(
            fs::read_to_string(root.join("a/a.go")).unwrap(),
            "package a\n\nfunc Foo() {}\n"
        );
    }
}
