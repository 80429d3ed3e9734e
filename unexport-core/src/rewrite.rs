//! Applying a rename plan to source text, and writing the result.
//!
//! [`rewrite`] is pure: it splices planned names into copies of the loaded
//! text. [`persist`] runs each copy through a [`Printer`] and overwrites the
//! file, one file at a time in path order. A failing file is logged and
//! counted; the remaining files are still attempted.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, error};

use crate::error::{IoResultExt, UnexportError, UnexportResult};
use crate::gosrc::program::digest;
use crate::gosrc::Program;
use crate::plan::RenamePlan;

/// Rewritten copy of one file.
#[derive(Debug, Clone)]
pub struct FileEdit {
    pub path: PathBuf,
    pub package: String,
    pub text: String,
    pub occurrences: usize,
    /// Digest of the bytes the load read.
    pub(crate) loaded_sha256: [u8; 32],
}

/// Every rewritten file of a run, sorted by path.
#[derive(Debug, Clone, Default)]
pub struct Rewrite {
    pub files: Vec<FileEdit>,
}

impl Rewrite {
    pub fn occurrences(&self) -> usize {
        self.files.iter().map(|f| f.occurrences).sum()
    }

    pub fn touched_files(&self) -> usize {
        self.files.len()
    }

    pub fn touched_packages(&self) -> BTreeSet<&str> {
        self.files.iter().map(|f| f.package.as_str()).collect()
    }
}

/// Substitutes planned names at every def and use site bound to a planned
/// symbol, in every scanned package of `program`.
pub fn rewrite(program: &Program, plan: &RenamePlan) -> Rewrite {
    let resolved = plan.resolve(program);
    let mut files = Vec::new();
    if resolved.is_empty() {
        return Rewrite { files };
    }

    for package in program.scanned_packages() {
        let mut per_file: BTreeMap<usize, Vec<(usize, usize, &str)>> = BTreeMap::new();
        for site in package.sites() {
            if let Some(&name) = resolved.get(&site.symbol) {
                per_file
                    .entry(site.file)
                    .or_default()
                    .push((site.span.start, site.span.end, name));
            }
        }

        for (index, mut edits) in per_file {
            let source = &package.files[index];
            edits.sort_unstable_by_key(|&(start, _, _)| start);
            edits.dedup_by_key(|e| e.0);

            let mut text = String::with_capacity(source.text.len());
            let mut cursor = 0;
            for &(start, end, name) in &edits {
                text.push_str(&source.text[cursor..start]);
                text.push_str(name);
                cursor = end;
            }
            text.push_str(&source.text[cursor..]);

            debug!(file = %source.path.display(), occurrences = edits.len(), "rewrote file");
            files.push(FileEdit {
                path: source.path.clone(),
                package: package.path.clone(),
                text,
                occurrences: edits.len(),
                loaded_sha256: source.sha256,
            });
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Rewrite { files }
}

/// Turns rewritten text into the bytes written to disk.
pub trait Printer {
    fn print(&self, path: &Path, text: &str) -> UnexportResult<Vec<u8>>;
}

/// Writes the spliced text as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplicePrinter;

impl Printer for SplicePrinter {
    fn print(&self, _path: &Path, text: &str) -> UnexportResult<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }
}

/// Pipes the text through an external formatter such as `gofmt`.
#[derive(Debug, Clone)]
pub struct CommandPrinter {
    program: String,
    args: Vec<String>,
}

impl CommandPrinter {
    /// `command[0]` is the program, the rest its arguments.
    pub fn new(command: &[String]) -> UnexportResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| UnexportError::invalid_argument("empty printer command"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Printer for CommandPrinter {
    fn print(&self, path: &Path, text: &str) -> UnexportResult<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| UnexportError::printer(path, format!("cannot run {}: {}", self.program, e)))?;

        // Feed stdin from its own thread so a large file cannot fill both pipes.
        let stdin = child.stdin.take();
        let (output, fed) = std::thread::scope(|s| {
            let feeder = s.spawn(move || -> std::io::Result<()> {
                if let Some(mut stdin) = stdin {
                    stdin.write_all(text.as_bytes())?;
                }
                Ok(())
            });
            let output = child.wait_with_output();
            (output, feeder.join())
        });
        let output = output.map_err(|e| UnexportError::printer(path, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(UnexportError::printer(
                path,
                format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            ));
        }
        match fed {
            Ok(Ok(())) => Ok(output.stdout),
            Ok(Err(e)) => Err(UnexportError::printer(path, e.to_string())),
            Err(_) => Err(UnexportError::printer(path, "stdin writer panicked")),
        }
    }
}

/// Outcome of writing a [`Rewrite`].
#[derive(Debug, Default)]
pub struct PersistOutcome {
    /// Files written, or in dry-run mode the files that would have been.
    pub written: Vec<PathBuf>,
    pub errors: Vec<UnexportError>,
}

impl PersistOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

fn persist_file(edit: &FileEdit, printer: &dyn Printer, dry_run: bool) -> UnexportResult<()> {
    let on_disk = fs::read(&edit.path).with_path(&edit.path)?;
    if digest(&on_disk) != edit.loaded_sha256 {
        return Err(UnexportError::StaleFile {
            path: edit.path.clone(),
        });
    }

    let bytes = printer.print(&edit.path, &edit.text)?;

    if dry_run {
        eprintln!(
            "[DRY-RUN] Would rewrite {} occurrence(s) in: {}",
            edit.occurrences,
            edit.path.display()
        );
        return Ok(());
    }

    fs::write(&edit.path, bytes).map_err(|e| UnexportError::write(&edit.path, e.to_string()))?;
    eprintln!(
        "[FIX] Rewrote {} occurrence(s) in: {}",
        edit.occurrences,
        edit.path.display()
    );
    Ok(())
}

/// Writes every file of `rewrite`, in path order. In dry-run mode nothing is
/// written but files are still checked and printed.
pub fn persist(rewrite: &Rewrite, printer: &dyn Printer, dry_run: bool) -> PersistOutcome {
    let mut outcome = PersistOutcome::default();
    for edit in &rewrite.files {
        match persist_file(edit, printer, dry_run) {
            Ok(()) => outcome.written.push(edit.path.clone()),
            Err(e) => {
                error!(file = %edit.path.display(), error = %e, "failed to rewrite file");
                outcome.errors.push(e);
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{CandidateFilter, ExportAnalyzer};
    use crate::gosrc::GoToolkit;
    use crate::importgraph::GoImportGraph;
    use crate::plan::plan;
    use crate::workspace::Workspace;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_module(files: &[(&str, &str)]) -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("unexport_rewrite_test")
            .join(format!("{}_{}", std::process::id(), id));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("go.mod"), "module m\n").unwrap();
        for (rel, content) in files {
            let path = dir.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    fn rewrite_module(root: &Path) -> Rewrite {
        let ws = Workspace::discover(root).unwrap();
        let toolkit = GoToolkit::new(ws.clone());
        let index = GoImportGraph::new(ws);
        let analysis = ExportAnalyzer::new(&toolkit, &index)
            .with_filter(CandidateFilter::new())
            .analyze("m/a")
            .unwrap();
        let plan = plan(&analysis);
        rewrite(&analysis.program, &plan)
    }

    struct Upper;

    impl Printer for Upper {
        fn print(&self, _path: &Path, text: &str) -> UnexportResult<Vec<u8>> {
            Ok(text.to_uppercase().into_bytes())
        }
    }

    struct Failing;

    impl Printer for Failing {
        fn print(&self, path: &Path, _text: &str) -> UnexportResult<Vec<u8>> {
            Err(UnexportError::printer(path, "refused"))
        }
    }

    #[test]
    fn test_rewrite_splices_only_planned_sites() {
        let root = create_module(&[(
            "a/a.go",
            "package a\n\n// Foo is documented.\nfunc Foo() string { return \"Foo\" }\n\nvar X = Foo()\n",
        )]);
        let rw = rewrite_module(&root);
        assert_eq!(rw.touched_files(), 1);
        assert_eq!(
            rw.files[0].text,
            "package a\n\n// Foo is documented.\nfunc foo() string { return \"Foo\" }\n\nvar x = foo()\n"
        );
        assert_eq!(rw.occurrences(), 3);
        assert_eq!(rw.touched_packages().into_iter().collect::<Vec<_>>(), vec!["m/a"]);
    }

    #[test]
    fn test_persist_dry_run_leaves_bytes() {
        let root = create_module(&[("a/a.go", "package a\n\nfunc Foo() {}\n")]);
        let file = root.join("a/a.go");
        let before = fs::read(&file).unwrap();
        let rw = rewrite_module(&root);

        let outcome = persist(&rw, &SplicePrinter, true);
        assert!(outcome.is_ok());
        assert_eq!(outcome.written, vec![file.clone()]);
        assert_eq!(fs::read(&file).unwrap(), before);

        let outcome = persist(&rw, &SplicePrinter, false);
        assert!(outcome.is_ok());
        assert_eq!(fs::read_to_string(&file).unwrap(), "package a\n\nfunc foo() {}\n");
    }

    #[test]
    fn test_persist_uses_printer() {
        let root = create_module(&[("a/a.go", "package a\n\nfunc Foo() {}\n")]);
        let rw = rewrite_module(&root);
        assert!(persist(&rw, &Upper, false).is_ok());
        assert_eq!(
            fs::read_to_string(root.join("a/a.go")).unwrap(),
            "PACKAGE A\n\nFUNC FOO() {}\n"
        );
    }

    #[test]
    fn test_persist_continues_past_stale_file() {
        let root = create_module(&[
            ("a/a.go", "package a\n\nfunc Foo() {}\n"),
            ("a/b.go", "package a\n\nfunc g() { Foo() }\n"),
        ]);
        let rw = rewrite_module(&root);
        assert_eq!(rw.touched_files(), 2);
        fs::write(root.join("a/a.go"), "package a\n\nfunc Foo() {}\n\n// edited\n").unwrap();

        let outcome = persist(&rw, &SplicePrinter, false);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(&outcome.errors[0], UnexportError::StaleFile { .. }));
        assert_eq!(outcome.written, vec![root.join("a/b.go")]);
        assert_eq!(
            fs::read_to_string(root.join("a/b.go")).unwrap(),
            "package a\n\nfunc g() { foo() }\n"
        );
    }

    #[test]
    fn test_persist_printer_failure_is_per_file() {
        let root = create_module(&[("a/a.go", "package a\n\nfunc Foo() {}\n")]);
        let rw = rewrite_module(&root);
        let outcome = persist(&rw, &Failing, false);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].is_recoverable());
        assert_eq!(
            fs::read_to_string(root.join("a/a.go")).unwrap(),
            "package a\n\nfunc Foo() {}\n"
        );
    }

    #[test]
    fn test_command_printer_rejects_empty() {
        assert!(CommandPrinter::new(&[]).is_err());
        assert!(CommandPrinter::new(&["gofmt".to_string()]).is_ok());
    }

    #[test]
    fn test_empty_plan_rewrites_nothing() {
        let rw = rewrite(&Program::default(), &RenamePlan::default());
        assert_eq!(rw.touched_files(), 0);
        assert_eq!(rw.occurrences(), 0);
    }
}
