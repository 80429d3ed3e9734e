//! The result of one load: packages, files, symbols and their sites.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Index of a symbol inside one [`Program`]. Meaningless across loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub(crate) u32);

impl SymbolId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Const,
    Var,
    Type,
    Func,
    Field,
    Method,
    Label,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Const => "const",
            SymbolKind::Var => "var",
            SymbolKind::Type => "type",
            SymbolKind::Func => "func",
            SymbolKind::Field => "field",
            SymbolKind::Method => "method",
            SymbolKind::Label => "label",
        }
    }

    /// Fields and methods: reached through a selector, not a scope.
    pub fn is_member(&self) -> bool {
        matches!(self, SymbolKind::Field | SymbolKind::Method)
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load-independent identity of a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SymbolKey {
    pub package: String,
    /// `Name` for package-level symbols, `Type.Name` for members,
    /// `Func.Name` or `Type.Method.Name` for locals.
    pub qualified_name: String,
    pub file: PathBuf,
    pub offset: usize,
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.package, self.qualified_name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Symbol {
    pub key: SymbolKey,
    pub name: String,
    pub kind: SymbolKind,
    pub exported: bool,
    #[serde(skip)]
    pub owner: Option<SymbolId>,
    pub line: usize,
    pub column: usize,
    /// Struct field with a tag literal.
    pub tagged: bool,
    /// Declared in a `_test.go` file.
    pub in_test_file: bool,
    /// Declared inside a function body.
    pub local: bool,
}

impl Symbol {
    pub fn package(&self) -> &str {
        &self.key.package
    }

    /// `file:line:column` of the declaration.
    pub fn location(&self) -> String {
        format!("{}:{}:{}", self.key.file.display(), self.line, self.column)
    }

    /// Functions the `go test` driver calls by name.
    pub fn is_test_entry_point(&self) -> bool {
        const PREFIXES: &[&str] = &["Test", "Benchmark", "Example", "Fuzz"];
        self.in_test_file
            && self.kind == SymbolKind::Func
            && PREFIXES.iter().any(|p| {
                self.name.strip_prefix(p).is_some_and(|rest| {
                    rest.chars().next().map_or(true, |c| !c.is_lowercase())
                })
            })
    }
}

/// Whether a Go identifier is exported.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Byte range in a file's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// One occurrence of an identifier bound to a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    /// Index into the owning package's `files`.
    pub file: usize,
    pub span: Span,
    pub line: usize,
    pub column: usize,
    pub symbol: SymbolId,
}

/// A member selector or composite-literal key whose receiver type is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedRef {
    pub name: String,
    pub file: usize,
    pub line: usize,
    pub column: usize,
    /// `Name:` in a literal of unknown type, which may also be a map key
    /// expression naming a package-level symbol.
    pub is_key: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    /// Requested package, including its in-package test files.
    Primary,
    /// The `_test` package of a requested directory.
    ExternalTest,
    /// Loaded for its declarations only.
    Dependency,
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
    pub sha256: [u8; 32],
    pub is_test: bool,
}

impl SourceFile {
    pub fn new(path: PathBuf, text: String, is_test: bool) -> Self {
        let sha256 = digest(text.as_bytes());
        Self {
            path,
            text,
            sha256,
            is_test,
        }
    }
}

/// SHA-256 of a byte buffer.
pub fn digest(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

#[derive(Debug, Clone)]
pub struct Package {
    pub path: String,
    pub name: String,
    pub dir: PathBuf,
    pub kind: PackageKind,
    pub files: Vec<SourceFile>,
    pub defs: Vec<Site>,
    pub uses: Vec<Site>,
    pub unresolved: Vec<UnresolvedRef>,
}

impl Package {
    /// Primary and external-test packages are scanned for uses and rewritten.
    pub fn is_scanned(&self) -> bool {
        self.kind != PackageKind::Dependency
    }

    /// Definitions followed by uses.
    pub fn sites(&self) -> impl Iterator<Item = &Site> {
        self.defs.iter().chain(self.uses.iter())
    }

    pub fn file_path(&self, file: usize) -> &Path {
        &self.files[file].path
    }
}

/// Selector-resolution facts shared by every package of a load.
#[derive(Debug, Default)]
pub(crate) struct TypeTable {
    /// Type → member name → field, method, or embedded type.
    pub members: HashMap<SymbolId, HashMap<String, SymbolId>>,
    /// Type → embedded (or underlying) types whose members are promoted.
    pub embedded: HashMap<SymbolId, Vec<SymbolId>>,
    /// Var, const, field → its type; func, method → its first result.
    pub value_type: HashMap<SymbolId, Ty>,
    /// Types whose composite literals take field keys.
    pub struct_types: HashSet<SymbolId>,
    /// Types embedding something declared outside the load.
    pub opaque_embedded: HashSet<SymbolId>,
}

/// A statically known type: one of ours, or something outside the load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ty {
    Known(SymbolId),
    Opaque,
}

const MAX_EMBED_DEPTH: usize = 8;

impl TypeTable {
    /// Finds `name` on `ty` or on anything it embeds, shallowest first.
    pub fn lookup_member(&self, ty: SymbolId, name: &str) -> Option<SymbolId> {
        let mut queue = VecDeque::from([(ty, 0usize)]);
        let mut seen = HashSet::from([ty]);
        while let Some((current, depth)) = queue.pop_front() {
            if let Some(&member) = self.members.get(&current).and_then(|m| m.get(name)) {
                return Some(member);
            }
            if depth >= MAX_EMBED_DEPTH {
                continue;
            }
            for &inner in self.embedded.get(&current).into_iter().flatten() {
                if seen.insert(inner) {
                    queue.push_back((inner, depth + 1));
                }
            }
        }
        None
    }

    /// Whether `ty` or anything it embeds has a member set we cannot see.
    pub fn embeds_opaque(&self, ty: SymbolId) -> bool {
        let mut stack = vec![ty];
        let mut seen = HashSet::from([ty]);
        while let Some(current) = stack.pop() {
            if self.opaque_embedded.contains(&current) {
                return true;
            }
            for &inner in self.embedded.get(&current).into_iter().flatten() {
                if seen.insert(inner) {
                    stack.push(inner);
                }
            }
        }
        false
    }
}

/// Everything one load produced.
#[derive(Debug, Default)]
pub struct Program {
    pub(crate) packages: Vec<Package>,
    pub(crate) symbols: Vec<Symbol>,
    pub(crate) scopes: HashMap<String, HashMap<String, SymbolId>>,
    pub(crate) types: TypeTable,
    /// Local symbol → identifiers spelled in its enclosing declaration.
    pub(crate) local_names: HashMap<SymbolId, Arc<BTreeSet<String>>>,
}

impl Program {
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn scanned_packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter().filter(|p| p.is_scanned())
    }

    pub fn package(&self, path: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.path == path)
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn find_by_key(&self, key: &SymbolKey) -> Option<SymbolId> {
        self.symbols().find(|(_, s)| &s.key == key).map(|(id, _)| id)
    }

    /// Package-level names of a loaded package.
    pub fn package_scope(&self, path: &str) -> Option<&HashMap<String, SymbolId>> {
        self.scopes.get(path)
    }

    /// Names a renamed local could collide with, if `id` is a local.
    pub fn names_near(&self, id: SymbolId) -> Option<&BTreeSet<String>> {
        self.local_names.get(&id).map(|names| names.as_ref())
    }

    /// Direct members (fields, methods, embedded types) declared on a type.
    pub fn members_of(&self, ty: SymbolId) -> BTreeMap<&str, SymbolId> {
        self.types
            .members
            .get(&ty)
            .map(|m| m.iter().map(|(k, v)| (k.as_str(), *v)).collect())
            .unwrap_or_default()
    }

    /// Total number of bound occurrences in scanned packages.
    pub fn site_count(&self) -> usize {
        self.scanned_packages().map(|p| p.defs.len() + p.uses.len()).sum()
    }
}
