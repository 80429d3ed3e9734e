//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use unexport_core::prelude::*;
//! ```

// Errors
pub use crate::error::{UnexportError, UnexportResult};

// Builder API
pub use crate::builder::Unexport;

// Configuration
pub use crate::config::{load_config, UnexportConfig};

// Workspace and loading
pub use crate::gosrc::{GoToolkit, Program, SourceToolkit, SymbolKey, SymbolKind};
pub use crate::workspace::Workspace;

// Analysis pipeline
pub use crate::analyze::{Analysis, CandidateFilter, ExportAnalyzer, Verdict};
pub use crate::importgraph::{GoImportGraph, ImportGraphIndex, ReverseImportGraph};
pub use crate::plan::{plan, RenamePlan};
pub use crate::rewrite::{persist, rewrite, Printer};

// Reporting
pub use crate::report::{print_json, print_plain, RunReport};
