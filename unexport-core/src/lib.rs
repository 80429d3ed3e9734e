//! unexport-core: unexport Go identifiers nothing outside their package uses
//!
//! Given one package of a Go module, this library proves which of its
//! exported identifiers are referenced only from inside the package, and
//! rewrites every occurrence of those identifiers to the lower-case
//! spelling, across all files of the module that mention them.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use unexport_core::prelude::*;
//!
//! let report = Unexport::new(".", "example.com/m/store")
//!     .dry_run(true)
//!     .run()?;
//!
//! println!("{}", report.summary());
//! ```
//!
//! # Module Organization
//!
//! - [`workspace`], [`scan`], [`constraint`]: module discovery, directory
//!   walk, build constraints
//! - [`gosrc`]: Go syntax trees (tree-sitter), declaration and reference passes, program loader
//! - [`importgraph`]: whole-module reverse import graph
//! - [`analyze`]: two-phase load and reference scan
//! - [`plan`]: rename planning
//! - [`rewrite`]: text splicing, printers, persistence
//! - [`report`]: summary line, plain and JSON output
//! - [`builder`]: fluent API running the whole pipeline
//! - [`error`]: typed error handling

pub mod analyze;
pub mod builder;
pub mod common;
pub mod config;
pub mod constraint;
pub mod error;
pub mod gosrc;
pub mod importgraph;
pub mod logging;
pub mod plan;
pub mod prelude;
pub mod report;
pub mod rewrite;
pub mod scan;
pub mod workspace;

// Common trait re-exports
pub use common::GraphTraversal;

// ============================================================================
// Explicit Re-exports (avoiding glob imports for clear API surface)
// ============================================================================

// Error types
pub use error::{IoResultExt, UnexportError, UnexportResult};

// Builder API
pub use builder::Unexport;

// Configuration
pub use config::{load_config, OutputConfig, PrinterConfig, UnexportConfig, CONFIG_FILE};

// Logging
pub use logging::{init_logging, init_structured_logging};

// Workspace
pub use constraint::BuildContext;
pub use scan::{gather_go_files, is_test_file};
pub use workspace::{find_module_root, parse_module_path, Workspace};

// Source toolkit
pub use gosrc::{
    GoToolkit, Package, PackageKind, Program, Site, SourceToolkit, Symbol, SymbolId, SymbolKey,
    SymbolKind,
};

// Import graph
pub use importgraph::{GoImportGraph, GraphScan, ImportGraphIndex, ReverseImportGraph};

// Analysis, planning, rewriting
pub use analyze::{candidates, scan_references, Analysis, CandidateFilter, ExportAnalyzer, Verdict};
pub use plan::{collisions, plan, unexported_name, Collision, RenamePlan};
pub use rewrite::{
    persist, rewrite, CommandPrinter, FileEdit, PersistOutcome, Printer, Rewrite, SplicePrinter,
};

// Reporting
pub use report::{print_json, print_plain, summary_line, KeptSymbol, RenamedSymbol, RunReport};
