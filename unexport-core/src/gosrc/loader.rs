//! `GoToolkit`: loads a closed set of packages of one module.
//!
//! 1. Requested packages (plus their `_test` packages when tests are on) and,
//!    transitively, every in-module package they import are read, filtered by
//!    build constraints, parsed and run through pass 1, in parallel.
//! 2. Symbols get ids in a fixed order (packages by path, files by path,
//!    declarations in source order), so two loads of the same tree agree.
//! 3. The type table is filled from the declarations.
//! 4. Pass 2 reparses every file of a scanned package and walks it over the
//!    finished tables, in parallel. Exported locals it finds get ids last.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

use super::decl_extractor::{extract_decls, DeclKind, FileDecls, TypeExpr, TypeShape};
use super::program::{
    is_exported, Package, PackageKind, Program, Site, SourceFile, Symbol, SymbolId, SymbolKey,
    SymbolKind, Ty,
};
use super::ref_resolver::{resolve_file, resolve_type_expr, FileEnv, FileRefs, ImportTarget};
use super::syntax::{parse_go, Ident};
use super::SourceToolkit;
use crate::error::{IoResultExt, UnexportError, UnexportResult};
use crate::scan::is_test_file;
use crate::workspace::Workspace;

/// Source toolkit for Go modules.
#[derive(Debug, Clone)]
pub struct GoToolkit {
    workspace: Workspace,
}

struct ParsedFile {
    source: SourceFile,
    decls: FileDecls,
}

/// One package before symbols exist.
struct Unit {
    path: String,
    name: String,
    dir: PathBuf,
    kind: PackageKind,
    files: Vec<ParsedFile>,
}

impl Unit {
    fn imports(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .flat_map(|f| f.decls.imports.iter().map(|i| i.path.as_str()))
    }
}

/// Parses one file and runs pass 1 over it.
pub(crate) fn parse_file(path: &Path, text: &str) -> UnexportResult<FileDecls> {
    let tree = parse_go(path, text)?;
    extract_decls(tree.root_node(), text.as_bytes()).map_err(|e| e.into_error(path))
}

/// Local name an import is referred to by when it has no alias and its
/// package clause is not known: `gopkg.in/yaml.v3` → `yaml`,
/// `example.com/x/v2` → `x`, `github.com/a/go-thing` → `thing`.
pub(crate) fn guess_package_name(path: &str) -> String {
    let mut parts: Vec<&str> = path.split('/').collect();
    if parts.len() > 1 {
        if let Some(last) = parts.last() {
            let is_major = last.len() > 1
                && last.starts_with('v')
                && last[1..].chars().all(|c| c.is_ascii_digit());
            if is_major {
                parts.pop();
            }
        }
    }
    let last = parts.last().copied().unwrap_or(path);
    let last = match last.rsplit_once(".v") {
        Some((base, major)) if !major.is_empty() && major.chars().all(|c| c.is_ascii_digit()) => base,
        _ => last,
    };
    let last = last.strip_prefix("go-").unwrap_or(last);
    last.replace(['-', '.'], "_")
}

impl GoToolkit {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Reads one package directory. With `tests` set, internal test files
    /// join the package and `_test` package files form a second unit.
    fn read_dir(&self, path: &str, kind: PackageKind, tests: bool) -> UnexportResult<Vec<Unit>> {
        let dir = self
            .workspace
            .dir_for_import_path(path)
            .filter(|d| d.is_dir())
            .ok_or_else(|| UnexportError::load(path, "cannot find package directory"))?;
        let build = self.workspace.build();

        let parsed: Vec<Option<ParsedFile>> = self
            .workspace
            .files_in_dir(&dir)?
            .into_par_iter()
            .map(|file| -> UnexportResult<Option<ParsedFile>> {
                let is_test = is_test_file(&file);
                if is_test && !tests {
                    return Ok(None);
                }
                let text = fs::read_to_string(&file).with_path(&file)?;
                let name = file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default();
                let included = build
                    .matches_file(name, &text)
                    .map_err(|msg| UnexportError::parse(&file, msg))?;
                if !included {
                    return Ok(None);
                }
                let decls = parse_file(&file, &text)?;
                Ok(Some(ParsedFile {
                    source: SourceFile::new(file, text, is_test),
                    decls,
                }))
            })
            .collect::<UnexportResult<_>>()?;

        let mut main = Vec::new();
        let mut external = Vec::new();
        let mut name: Option<(String, PathBuf)> = None;
        for file in parsed.into_iter().flatten() {
            let clause = file.decls.package_name.clone();
            if file.source.is_test && clause.ends_with("_test") {
                let base = &clause[..clause.len() - "_test".len()];
                if name.as_ref().map_or(true, |(n, _)| n == base) {
                    external.push(file);
                    continue;
                }
            }
            match &name {
                Some((expected, first)) if *expected != clause => {
                    return Err(UnexportError::load(
                        path,
                        format!(
                            "found packages {} ({}) and {} ({}) in {}",
                            expected,
                            first.display(),
                            clause,
                            file.source.path.display(),
                            dir.display()
                        ),
                    ));
                }
                Some(_) => {}
                None => name = Some((clause, file.source.path.clone())),
            }
            main.push(file);
        }

        if main.is_empty() && external.is_empty() {
            return Err(UnexportError::load(
                path,
                format!("no buildable Go source files in {}", dir.display()),
            ));
        }

        let base_name = name
            .map(|(n, _)| n)
            .unwrap_or_else(|| guess_package_name(path));
        let mut units = Vec::new();
        if !main.is_empty() {
            units.push(Unit {
                path: path.to_string(),
                name: base_name.clone(),
                dir: dir.clone(),
                kind,
                files: main,
            });
        }
        if !external.is_empty() {
            units.push(Unit {
                path: format!("{}_test", path),
                name: format!("{}_test", base_name),
                dir,
                kind: PackageKind::ExternalTest,
                files: external,
            });
        }
        Ok(units)
    }

    /// Reads the requested packages and the in-module closure of their imports.
    fn read_closure(
        &self,
        paths: &BTreeSet<String>,
        include_tests: bool,
    ) -> UnexportResult<BTreeMap<String, Unit>> {
        for path in paths {
            if !self.workspace.contains_import_path(path) {
                return Err(UnexportError::invalid_argument(format!(
                    "package {} is not in module {}",
                    path,
                    self.workspace.module_path()
                )));
            }
        }

        let mut units: BTreeMap<String, Unit> = BTreeMap::new();
        let mut seen: BTreeSet<String> = paths.clone();
        let mut frontier: Vec<(String, PackageKind)> = paths
            .iter()
            .map(|p| (p.clone(), PackageKind::Primary))
            .collect();

        while !frontier.is_empty() {
            let wave: Vec<Vec<Unit>> = frontier
                .par_iter()
                .map(|(path, kind)| {
                    let tests = include_tests && *kind == PackageKind::Primary;
                    self.read_dir(path, *kind, tests)
                })
                .collect::<UnexportResult<_>>()?;

            let mut next = Vec::new();
            for unit in wave.into_iter().flatten() {
                for import in unit.imports() {
                    if self.workspace.contains_import_path(import) && seen.insert(import.to_string()) {
                        next.push((import.to_string(), PackageKind::Dependency));
                    }
                }
                units.insert(unit.path.clone(), unit);
            }
            frontier = next;
        }
        Ok(units)
    }
}

/// Symbol and environment tables built between pass 1 and pass 2.
struct Tables {
    program: Program,
    envs: Vec<Vec<FileEnv>>,
    decls: Vec<Vec<FileDecls>>,
}

/// Where new symbols of one file come from.
struct FileOrigin<'a> {
    package: &'a str,
    path: &'a Path,
    is_test: bool,
}

impl FileOrigin<'_> {
    fn declare(
        &self,
        program: &mut Program,
        ident: &Ident,
        qualified_name: String,
        kind: SymbolKind,
        owner: Option<SymbolId>,
    ) -> SymbolId {
        let id = SymbolId(program.symbols.len() as u32);
        program.symbols.push(Symbol {
            key: SymbolKey {
                package: self.package.to_string(),
                qualified_name,
                file: self.path.to_path_buf(),
                offset: ident.span.start,
            },
            name: ident.name.clone(),
            kind,
            exported: is_exported(&ident.name),
            owner,
            line: ident.line,
            column: ident.column,
            tagged: false,
            in_test_file: self.is_test,
            local: false,
        });
        id
    }

    fn position(&self, ident: &Ident) -> String {
        format!("{}:{}:{}", self.path.display(), ident.line, ident.column)
    }
}

fn build_tables(units: BTreeMap<String, Unit>) -> UnexportResult<Tables> {
    let mut program = Program::default();
    let mut all_decls: Vec<Vec<FileDecls>> = Vec::new();

    for unit in units.into_values() {
        let mut files = Vec::with_capacity(unit.files.len());
        let mut decls = Vec::with_capacity(unit.files.len());
        for parsed in unit.files {
            files.push(parsed.source);
            decls.push(parsed.decls);
        }
        program.packages.push(Package {
            path: unit.path,
            name: unit.name,
            dir: unit.dir,
            kind: unit.kind,
            files,
            defs: Vec::new(),
            uses: Vec::new(),
            unresolved: Vec::new(),
        });
        all_decls.push(decls);
    }

    let origins: Vec<Vec<(PathBuf, bool)>> = program
        .packages
        .iter()
        .map(|p| p.files.iter().map(|f| (f.path.clone(), f.is_test)).collect())
        .collect();
    let package_paths: Vec<String> = program.packages.iter().map(|p| p.path.clone()).collect();
    let origin = |p: usize, f: usize| FileOrigin {
        package: &package_paths[p],
        path: &origins[p][f].0,
        is_test: origins[p][f].1,
    };

    let mut envs: Vec<Vec<FileEnv>> = all_decls
        .iter()
        .map(|files| files.iter().map(|_| FileEnv::default()).collect())
        .collect();
    // (package, file, decl) → the type a declaration introduces
    let mut type_ids: HashMap<(usize, usize, usize), SymbolId> = HashMap::new();

    // Package-level symbols. `init` never enters scope.
    for (p, file_decls) in all_decls.iter().enumerate() {
        let mut scope: HashMap<String, SymbolId> = HashMap::new();
        for (f, fd) in file_decls.iter().enumerate() {
            let origin = origin(p, f);
            for (d, decl) in fd.decls.iter().enumerate() {
                let kind = match decl.kind {
                    DeclKind::Const { .. } => SymbolKind::Const,
                    DeclKind::Var { .. } => SymbolKind::Var,
                    DeclKind::Func { .. } => SymbolKind::Func,
                    DeclKind::Type { .. } => SymbolKind::Type,
                    DeclKind::Method { .. } => continue,
                };
                let name = &decl.name.name;
                if name == "_" {
                    continue;
                }
                let id = origin.declare(&mut program, &decl.name, name.clone(), kind, None);
                envs[p][f].def_offsets.insert(decl.name.span.start, id);
                if kind == SymbolKind::Type {
                    type_ids.insert((p, f, d), id);
                }
                if kind == SymbolKind::Func && name == "init" {
                    continue;
                }
                if let Some(previous) = scope.insert(name.clone(), id) {
                    return Err(UnexportError::load(
                        origin.package,
                        format!(
                            "{}: {} redeclared in this block (previous declaration at {})",
                            origin.position(&decl.name),
                            name,
                            program.symbol(previous).location()
                        ),
                    ));
                }
            }
        }
        program.scopes.insert(package_paths[p].clone(), scope);
    }

    // Members: struct fields, interface methods, methods.
    for (p, file_decls) in all_decls.iter().enumerate() {
        for (f, fd) in file_decls.iter().enumerate() {
            let origin = origin(p, f);
            for (d, decl) in fd.decls.iter().enumerate() {
                match &decl.kind {
                    DeclKind::Type {
                        shape: TypeShape::Struct(fields),
                    } => {
                        let Some(&owner) = type_ids.get(&(p, f, d)) else {
                            continue;
                        };
                        for field in fields.iter().filter(|fd| !fd.embedded && fd.name.name != "_") {
                            let id = origin.declare(
                                &mut program,
                                &field.name,
                                format!("{}.{}", decl.name.name, field.name.name),
                                SymbolKind::Field,
                                Some(owner),
                            );
                            program.symbols[id.index()].tagged = field.tagged;
                            envs[p][f].def_offsets.insert(field.name.span.start, id);
                        }
                    }
                    DeclKind::Type {
                        shape: TypeShape::Interface { methods, .. },
                    } => {
                        let Some(&owner) = type_ids.get(&(p, f, d)) else {
                            continue;
                        };
                        for method in methods.iter().filter(|m| m.name.name != "_") {
                            let id = origin.declare(
                                &mut program,
                                &method.name,
                                format!("{}.{}", decl.name.name, method.name.name),
                                SymbolKind::Method,
                                Some(owner),
                            );
                            envs[p][f].def_offsets.insert(method.name.span.start, id);
                        }
                    }
                    DeclKind::Method { receiver, .. } => {
                        let owner = program
                            .scopes
                            .get(origin.package)
                            .and_then(|s| s.get(&receiver.name.name))
                            .copied()
                            .filter(|id| program.symbol(*id).kind == SymbolKind::Type)
                            .ok_or_else(|| {
                                UnexportError::load(
                                    origin.package,
                                    format!(
                                        "{}: undefined receiver type {}",
                                        origin.position(&receiver.name),
                                        receiver.name.name
                                    ),
                                )
                            })?;
                        if decl.name.name == "_" {
                            continue;
                        }
                        let id = origin.declare(
                            &mut program,
                            &decl.name,
                            format!("{}.{}", receiver.name.name, decl.name.name),
                            SymbolKind::Method,
                            Some(owner),
                        );
                        envs[p][f].def_offsets.insert(decl.name.span.start, id);
                    }
                    _ => {}
                }
            }
        }
    }

    // Import environments.
    let loaded: HashMap<&str, &str> = program
        .packages
        .iter()
        .map(|p| (p.path.as_str(), p.name.as_str()))
        .collect();
    for (p, file_decls) in all_decls.iter().enumerate() {
        for (f, fd) in file_decls.iter().enumerate() {
            let env = &mut envs[p][f];
            for import in &fd.imports {
                let known = loaded.get(import.path.as_str()).copied();
                let target = match known {
                    Some(_) => ImportTarget::Loaded(import.path.clone()),
                    None => ImportTarget::Opaque,
                };
                match import.alias.as_deref() {
                    Some("_") => {}
                    Some(".") => {
                        if let ImportTarget::Loaded(path) = target {
                            env.dot_imports.push(path);
                        }
                    }
                    Some(alias) => {
                        env.imports.insert(alias.to_string(), target);
                    }
                    None => {
                        let name = known
                            .map(str::to_string)
                            .unwrap_or_else(|| guess_package_name(&import.path));
                        env.imports.insert(name, target);
                    }
                }
            }
        }
    }

    debug!(symbols = program.symbols.len(), "declared symbols");
    Ok(Tables {
        program,
        envs,
        decls: all_decls,
    })
}

/// Fills the type table from the declarations.
fn build_types(tables: &mut Tables) {
    let mut types = std::mem::take(&mut tables.program.types);
    let program = &tables.program;
    let mut named_bases: Vec<(SymbolId, SymbolId)> = Vec::new();

    for (p, file_decls) in tables.decls.iter().enumerate() {
        let pkg = program.packages[p].path.as_str();
        for (f, fd) in file_decls.iter().enumerate() {
            let env = &tables.envs[p][f];
            let resolve = |ty: &Option<TypeExpr>| {
                ty.as_ref().and_then(|t| resolve_type_expr(program, pkg, env, t))
            };
            let id_of = |ident: &Ident| env.def_offsets.get(&ident.span.start).copied();

            for decl in &fd.decls {
                let Some(id) = id_of(&decl.name) else {
                    continue;
                };
                match &decl.kind {
                    DeclKind::Const { ty } | DeclKind::Var { ty } => {
                        if let Some(t) = resolve(ty) {
                            types.value_type.insert(id, t);
                        }
                    }
                    DeclKind::Func { result } => {
                        if let Some(t) = resolve(result) {
                            types.value_type.insert(id, t);
                        }
                    }
                    DeclKind::Method { result, .. } => {
                        if let Some(t) = resolve(result) {
                            types.value_type.insert(id, t);
                        }
                        if let Some(owner) = program.symbol(id).owner {
                            types
                                .members
                                .entry(owner)
                                .or_default()
                                .insert(decl.name.name.clone(), id);
                        }
                    }
                    DeclKind::Type { shape } => match shape {
                        TypeShape::Struct(fields) => {
                            types.struct_types.insert(id);
                            for field in fields {
                                let ty = resolve(&field.ty);
                                if field.embedded {
                                    match ty {
                                        Some(Ty::Known(inner)) => {
                                            types
                                                .members
                                                .entry(id)
                                                .or_default()
                                                .insert(field.name.name.clone(), inner);
                                            types.embedded.entry(id).or_default().push(inner);
                                        }
                                        _ => {
                                            types.opaque_embedded.insert(id);
                                        }
                                    }
                                    continue;
                                }
                                let Some(field_id) = id_of(&field.name) else {
                                    continue;
                                };
                                types
                                    .members
                                    .entry(id)
                                    .or_default()
                                    .insert(field.name.name.clone(), field_id);
                                if let Some(t) = ty {
                                    types.value_type.insert(field_id, t);
                                }
                            }
                        }
                        TypeShape::Interface { methods, embedded } => {
                            for method in methods {
                                let Some(method_id) = id_of(&method.name) else {
                                    continue;
                                };
                                types
                                    .members
                                    .entry(id)
                                    .or_default()
                                    .insert(method.name.name.clone(), method_id);
                                if let Some(t) = resolve(&method.result) {
                                    types.value_type.insert(method_id, t);
                                }
                            }
                            for inner in embedded {
                                match resolve_type_expr(program, pkg, env, inner) {
                                    Some(Ty::Known(inner)) => {
                                        types.embedded.entry(id).or_default().push(inner)
                                    }
                                    _ => {
                                        types.opaque_embedded.insert(id);
                                    }
                                }
                            }
                        }
                        TypeShape::Named(base) => match resolve(base) {
                            Some(Ty::Known(base)) => {
                                types.embedded.entry(id).or_default().push(base);
                                named_bases.push((id, base));
                            }
                            Some(Ty::Opaque) => {
                                types.opaque_embedded.insert(id);
                            }
                            None => {}
                        },
                    },
                }
            }
        }
    }

    // `type A B` with B a struct takes field keys too, transitively.
    loop {
        let before = types.struct_types.len();
        for (named, base) in &named_bases {
            if types.struct_types.contains(base) {
                types.struct_types.insert(*named);
            }
        }
        if types.struct_types.len() == before {
            break;
        }
    }

    tables.program.types = types;
}

/// Moves one file's sites into its package, giving its locals ids.
fn merge_file_refs(program: &mut Program, p: usize, f: usize, refs: FileRefs) {
    let (package_path, file_path, is_test) = {
        let package = &program.packages[p];
        let file = &package.files[f];
        (package.path.clone(), file.path.clone(), file.is_test)
    };
    let contexts: Vec<Arc<BTreeSet<String>>> = refs.contexts.into_iter().map(Arc::new).collect();
    let base = program.symbols.len();
    for local in &refs.locals {
        let id = SymbolId(program.symbols.len() as u32);
        program.symbols.push(Symbol {
            key: SymbolKey {
                package: package_path.clone(),
                qualified_name: local.qualified_name.clone(),
                file: file_path.clone(),
                offset: local.name.span.start,
            },
            name: local.name.name.clone(),
            kind: local.kind,
            exported: true,
            owner: None,
            line: local.name.line,
            column: local.name.column,
            tagged: false,
            in_test_file: is_test,
            local: true,
        });
        if let Some(names) = contexts.get(local.context) {
            program.local_names.insert(id, Arc::clone(names));
        }
    }

    let package = &mut program.packages[p];
    package.defs.extend(refs.defs);
    package.uses.extend(refs.uses);
    package.unresolved.extend(refs.unresolved);
    for site in refs.local_sites {
        let bound = Site {
            file: f,
            span: site.span,
            line: site.line,
            column: site.column,
            symbol: SymbolId((base + site.local) as u32),
        };
        if site.is_def {
            package.defs.push(bound);
        } else {
            package.uses.push(bound);
        }
    }
}

impl SourceToolkit for GoToolkit {
    fn load_program(
        &self,
        paths: &BTreeSet<String>,
        include_tests: bool,
    ) -> UnexportResult<Program> {
        let units = self.read_closure(paths, include_tests)?;
        debug!(packages = units.len(), "read package closure");

        let mut tables = build_tables(units)?;
        build_types(&mut tables);

        let program = &tables.program;
        let envs = &tables.envs;
        let scanned: Vec<usize> = program
            .packages
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_scanned())
            .map(|(i, _)| i)
            .collect();

        let resolved: Vec<(usize, Vec<FileRefs>)> = scanned
            .par_iter()
            .map(|&p| -> UnexportResult<(usize, Vec<FileRefs>)> {
                let package = &program.packages[p];
                let refs = package
                    .files
                    .iter()
                    .enumerate()
                    .map(|(f, file)| {
                        let tree = parse_go(&file.path, &file.text)?;
                        resolve_file(
                            program,
                            &package.path,
                            f,
                            &file.path,
                            tree.root_node(),
                            file.text.as_bytes(),
                            &envs[p][f],
                        )
                    })
                    .collect::<UnexportResult<Vec<_>>>()?;
                Ok((p, refs))
            })
            .collect::<UnexportResult<_>>()?;

        let mut program = tables.program;
        let package_symbols = program.symbols.len();
        for (p, refs) in resolved {
            for (f, file_refs) in refs.into_iter().enumerate() {
                merge_file_refs(&mut program, p, f, file_refs);
            }
        }
        debug!(
            locals = program.symbols.len() - package_symbols,
            "declared local symbols"
        );

        info!(
            packages = program.packages.len(),
            symbols = program.symbols.len(),
            sites = program.site_count(),
            "loaded program"
        );
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_package_name() {
        assert_eq!(guess_package_name("fmt"), "fmt");
        assert_eq!(guess_package_name("net/http"), "http");
        assert_eq!(guess_package_name("gopkg.in/yaml.v3"), "yaml");
        assert_eq!(guess_package_name("example.com/x/v2"), "x");
        assert_eq!(guess_package_name("github.com/a/go-thing"), "thing");
        assert_eq!(guess_package_name("github.com/a/foo-bar"), "foo_bar");
    }

    #[test]
    fn test_parse_file_reports_position() {
        let err = parse_file(Path::new("bad.go"), "package a\n\nfunc F( {\n}\n").unwrap_err();
        match err {
            UnexportError::Parse { line, .. } => assert!(line.is_some()),
            other => panic!("unexpected error: {other}"),
        }

        let err = parse_file(Path::new("stmt.go"), "package a\n\nx := 1\n").unwrap_err();
        assert!(matches!(err, UnexportError::Parse { line: Some(3), .. }));
    }

    #[test]
    fn test_locals_get_ids_after_package_symbols() {
        let root = std::env::temp_dir()
            .join("unexport_loader_tests")
            .join(format!("locals_{}", std::process::id()));
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(
            root.join("a/a.go"),
            "package a\n\nfunc Shadow() int {\n\tCount := 5\n\treturn Count\n}\n",
        )
        .unwrap();

        let toolkit = GoToolkit::new(Workspace::new(&root, "example.com/m"));
        let paths = BTreeSet::from(["example.com/m/a".to_string()]);
        let program = toolkit.load_program(&paths, false).unwrap();

        let (id, count) = program
            .symbols()
            .find(|(_, s)| s.name == "Count")
            .unwrap();
        assert!(count.local);
        assert_eq!(count.key.qualified_name, "Shadow.Count");
        assert_eq!((count.line, count.column), (4, 2));
        assert!(id.index() > 0);
        assert!(program.names_near(id).unwrap().contains("Shadow"));

        let package = program.package("example.com/m/a").unwrap();
        let sites = package.sites().filter(|s| s.symbol == id).count();
        assert_eq!(sites, 2);
        fs::remove_dir_all(&root).ok();
    }
}
