//! Go source front end: tree-sitter syntax, declaration pass, reference pass, loader.
//!
//! The loader produces a [`Program`]: every declared symbol with a stable
//! [`SymbolKey`], plus, for scanned packages, every identifier occurrence
//! that resolves to one of those symbols and every one that does not.

pub mod decl_extractor;
pub mod loader;
pub mod program;
pub mod ref_resolver;
pub mod syntax;

use std::collections::BTreeSet;

use crate::error::UnexportResult;

pub use loader::GoToolkit;
pub use program::{
    Package, PackageKind, Program, Site, SourceFile, Span, Symbol, SymbolId, SymbolKey,
    SymbolKind, UnresolvedRef,
};

/// Loads Go packages into a [`Program`].
///
/// `paths` are import paths of the module. Every in-module package they
/// import is loaded too, declarations only. With `include_tests`, the
/// requested packages also bring their `_test.go` files and `_test` packages.
pub trait SourceToolkit: Send + Sync {
    fn load_program(&self, paths: &BTreeSet<String>, include_tests: bool)
        -> UnexportResult<Program>;
}
