//! Output formatting - plaintext and JSON.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::analyze::Verdict;
use crate::gosrc::{SymbolKey, SymbolKind};
use crate::plan::Collision;

/// One planned rename.
#[derive(Debug, Clone, Serialize)]
pub struct RenamedSymbol {
    pub symbol: SymbolKey,
    pub kind: SymbolKind,
    pub new_name: String,
}

/// A candidate that stays exported, and why.
#[derive(Debug, Clone, Serialize)]
pub struct KeptSymbol {
    pub symbol: SymbolKey,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Everything a run did, in a printable shape.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub package: String,
    pub dry_run: bool,
    pub occurrences: usize,
    pub files: Vec<String>,
    pub packages: Vec<String>,
    pub affected: Vec<String>,
    pub renamed: Vec<RenamedSymbol>,
    pub kept: Vec<KeptSymbol>,
    pub collisions: Vec<Collision>,
    /// Packages the import graph scan had to leave out.
    pub scan_errors: BTreeMap<String, String>,
    /// Per-file write failures.
    pub errors: Vec<String>,
}

impl RunReport {
    pub fn touched_files(&self) -> usize {
        self.files.len()
    }

    pub fn touched_packages(&self) -> usize {
        self.packages.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn summary(&self) -> String {
        summary_line(self.occurrences, self.touched_files(), self.touched_packages())
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// `Unexported 3 occurrences in 1 file in 1 package.`
pub fn summary_line(occurrences: usize, files: usize, packages: usize) -> String {
    format!(
        "Unexported {} occurrence{} in {} file{} in {} package{}.",
        occurrences,
        plural(occurrences),
        files,
        plural(files),
        packages,
        plural(packages)
    )
}

/// Prints renames, kept symbols and the summary line in plain text.
pub fn print_plain(report: &RunReport) {
    if report.renamed.is_empty() {
        println!("No identifiers to unexport in {}.", report.package);
    } else {
        println!("UNEXPORTED ({}):", report.renamed.len());
        for r in &report.renamed {
            println!("- {} -> {}", r.symbol, r.new_name);
        }
    }

    if !report.kept.is_empty() {
        println!("KEPT ({}):", report.kept.len());
        for k in &report.kept {
            match &k.verdict {
                Verdict::Unsafe { package, location } => {
                    println!("- {} (used by {} at {})", k.symbol, package, location)
                }
                Verdict::Blocked { location } => {
                    println!("- {} (unresolved reference at {})", k.symbol, location)
                }
                Verdict::Safe => {}
            }
        }
    }

    println!("{}", report.summary());
}

/// Prints the whole report as JSON, plus the summary line under `summary`.
///
/// Falls back to the summary line alone if serialization fails.
pub fn print_json(report: &RunReport) {
    let value = serde_json::to_value(report).map(|mut v| {
        if let Some(obj) = v.as_object_mut() {
            obj.insert("summary".to_string(), serde_json::Value::String(report.summary()));
        }
        v
    });
    match value.and_then(|v| serde_json::to_string_pretty(&v)) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("[WARN] JSON serialization failed: {}", e);
            println!("{{\"summary\": {:?}}}", report.summary());
        }
    }
}
