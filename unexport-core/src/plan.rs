//! Rename planning: safe symbol → lower-case name.
//!
//! Planning is pure. Nothing checks that the new names are free; see
//! [`collisions`] for the warnings the CLI prints instead.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::analyze::Analysis;
use crate::gosrc::{Program, SymbolId, SymbolKey};

/// Immutable symbol → new identifier mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenamePlan {
    renames: BTreeMap<SymbolKey, String>,
}

impl RenamePlan {
    pub fn new(renames: BTreeMap<SymbolKey, String>) -> Self {
        Self { renames }
    }

    pub fn get(&self, key: &SymbolKey) -> Option<&str> {
        self.renames.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &SymbolKey) -> bool {
        self.renames.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.renames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SymbolKey, &str)> {
        self.renames.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Plan entries resolved against one load, by symbol id.
    pub fn resolve(&self, program: &Program) -> HashMap<SymbolId, &str> {
        program
            .symbols()
            .filter_map(|(id, s)| self.get(&s.key).map(|name| (id, name)))
            .collect()
    }
}

/// The unexported spelling of `name`.
pub fn unexported_name(name: &str) -> String {
    name.to_lowercase()
}

/// Maps every safe symbol of `analysis` to its lower-case name.
pub fn plan(analysis: &Analysis) -> RenamePlan {
    let names: HashMap<&SymbolKey, &str> = analysis
        .program
        .symbols()
        .map(|(_, s)| (&s.key, s.name.as_str()))
        .collect();
    RenamePlan::new(
        analysis
            .safe
            .iter()
            .filter_map(|key| names.get(key).map(|name| (key.clone(), unexported_name(name))))
            .collect(),
    )
}

/// Go keywords; none can be an identifier.
const GO_KEYWORDS: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
    "for", "func", "go", "goto", "if", "import", "interface", "map", "package", "range", "return",
    "select", "struct", "switch", "type", "var",
];

/// Universe-scope names a package-level declaration or local would shadow.
const PREDECLARED: &[&str] = &[
    "any", "bool", "byte", "comparable", "complex64", "complex128", "error", "float32", "float64",
    "int", "int8", "int16", "int32", "int64", "rune", "string", "uint", "uint8", "uint16", "uint32",
    "uint64", "uintptr", "true", "false", "iota", "nil", "append", "cap", "clear", "close",
    "complex", "copy", "delete", "imag", "len", "make", "max", "min", "new", "panic", "print",
    "println", "real", "recover",
];

/// What a new name is reserved as, if anything. Members only clash with
/// keywords: `x.len` is fine, `x.type` is not.
fn reserved(new_name: &str, member: bool) -> Option<String> {
    if GO_KEYWORDS.contains(&new_name) {
        return Some(format!("keyword {}", new_name));
    }
    (!member && PREDECLARED.contains(&new_name)).then(|| format!("predeclared {}", new_name))
}

/// A planned name that clashes with an existing or another planned one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub symbol: SymbolKey,
    pub new_name: String,
    /// `pkg.name`, `pkg.T.name` or `pkg.Func.name` of what it clashes
    /// with, or `keyword name` / `predeclared name`.
    pub existing: String,
}

/// Planned names that are reserved, or already taken in the package scope,
/// on the owner type, or in the declaration enclosing a local.
pub fn collisions(plan: &RenamePlan, program: &Program) -> Vec<Collision> {
    let resolved = plan.resolve(program);
    let final_name = |id: SymbolId| -> String {
        resolved
            .get(&id)
            .map(|n| n.to_string())
            .unwrap_or_else(|| program.symbol(id).name.clone())
    };

    let mut out = Vec::new();
    let mut planned: Vec<(SymbolId, &str)> = resolved.iter().map(|(&id, &n)| (id, n)).collect();
    planned.sort_by(|a, b| program.symbol(a.0).key.cmp(&program.symbol(b.0).key));

    for (id, new_name) in planned {
        let symbol = program.symbol(id);
        let clash = reserved(new_name, symbol.kind.is_member()).or_else(|| match symbol.owner {
            Some(owner) => program
                .members_of(owner)
                .into_iter()
                .find(|&(_, other)| other != id && final_name(other) == new_name)
                .map(|(_, other)| {
                    let o = program.symbol(other);
                    format!("{}.{}.{}", symbol.package(), program.symbol(owner).name, o.name)
                }),
            None if symbol.local => local_clash(program, &resolved, id, new_name),
            None => program.package_scope(symbol.package()).and_then(|scope| {
                let mut clashing: Vec<SymbolId> = scope
                    .values()
                    .copied()
                    .filter(|&other| other != id && final_name(other) == new_name)
                    .collect();
                clashing.sort();
                clashing
                    .first()
                    .map(|&other| format!("{}.{}", symbol.package(), program.symbol(other).name))
            }),
        });
        if let Some(existing) = clash {
            out.push(Collision {
                symbol: symbol.key.clone(),
                new_name: new_name.to_string(),
                existing,
            });
        }
    }
    out
}

/// A local's new name against every identifier spelled in its enclosing
/// declaration and against sibling locals planned to the same name.
fn local_clash(
    program: &Program,
    resolved: &HashMap<SymbolId, &str>,
    id: SymbolId,
    new_name: &str,
) -> Option<String> {
    let symbol = program.symbol(id);
    let names = program.names_near(id)?;
    let sibling = || {
        let mut others: Vec<SymbolId> = resolved
            .iter()
            .filter(|&(&other, &n)| {
                other != id
                    && n == new_name
                    && program
                        .names_near(other)
                        .is_some_and(|o| std::ptr::eq(o, names))
            })
            .map(|(&other, _)| other)
            .collect();
        others.sort();
        others.first().map(|&other| program.symbol(other).name.clone())
    };
    let taken = names
        .contains(new_name)
        .then(|| new_name.to_string())
        .or_else(sibling)?;
    let scope = symbol
        .key
        .qualified_name
        .rsplit_once('.')
        .map_or("", |(scope, _)| scope);
    Some(format!("{}.{}.{}", symbol.package(), scope, taken))
}
