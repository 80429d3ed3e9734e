//! Pass 2: binds identifier occurrences of one file to symbols.
//!
//! Runs after every package of the load has its symbols, scopes and type
//! table, walking the syntax tree with a stack of block scopes. Local names
//! shadow package-level ones. Exported locals (variables, constants,
//! parameters, results, receivers, local types, labels) are collected as
//! [`LocalDecl`]s with their own sites; type parameters and the name bound
//! by a type switch are scoped but never collected.
//!
//! Member selectors `x.Name` are bound through a best-effort static type of
//! `x`: receivers and typed parameters, `var x T`, `x := T{}`, `&T{}`,
//! `new(T)`, calls of functions with a known first result, conversions,
//! type assertions, field chains and embedding. A selector or literal key
//! whose receiver type stays unknown is recorded as an [`UnresolvedRef`].

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use tree_sitter::Node;

use super::decl_extractor::{named_type, specs, TypeExpr};
use super::program::{is_exported, Program, Site, Span, SymbolId, SymbolKind, Ty, UnresolvedRef};
use super::syntax::{
    field_children, field_text, has_token, named_children, node_text, position, span, Ident,
};
use crate::error::{UnexportError, UnexportResult};

/// Predeclared type names; values of these types have no members of ours.
pub(crate) const PREDECLARED_TYPES: &[&str] = &[
    "any", "bool", "byte", "comparable", "complex64", "complex128", "error", "float32", "float64",
    "int", "int8", "int16", "int32", "int64", "rune", "string", "uint", "uint8", "uint16", "uint32",
    "uint64", "uintptr",
];

/// What an import's local name refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ImportTarget {
    /// A package of this load.
    Loaded(String),
    /// Anything else: standard library, other modules.
    Opaque,
}

/// Per-file resolution context built by the loader.
#[derive(Debug, Default)]
pub(crate) struct FileEnv {
    pub imports: HashMap<String, ImportTarget>,
    /// Loaded packages imported with `.`.
    pub dot_imports: Vec<String>,
    /// Start offsets of this file's declaring identifiers for package-level
    /// symbols and members.
    pub def_offsets: HashMap<usize, SymbolId>,
}

/// An exported name declared inside a function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocalDecl {
    pub name: Ident,
    pub kind: SymbolKind,
    /// `Func.Name` or `Type.Method.Name`.
    pub qualified_name: String,
    /// Index into [`FileRefs::contexts`].
    pub context: usize,
}

/// An occurrence of a [`LocalDecl`], by index into [`FileRefs::locals`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LocalSite {
    pub local: usize,
    pub span: Span,
    pub line: usize,
    pub column: usize,
    pub is_def: bool,
}

/// Sites found in one file.
#[derive(Debug, Default)]
pub(crate) struct FileRefs {
    pub defs: Vec<Site>,
    pub uses: Vec<Site>,
    pub unresolved: Vec<UnresolvedRef>,
    pub locals: Vec<LocalDecl>,
    pub local_sites: Vec<LocalSite>,
    /// Identifiers spelled anywhere in a top-level declaration with locals.
    pub contexts: Vec<BTreeSet<String>>,
}

/// Resolves a type expression against a package scope and a file's imports.
pub(crate) fn resolve_type_expr(
    program: &Program,
    pkg: &str,
    env: &FileEnv,
    ty: &TypeExpr,
) -> Option<Ty> {
    let is_type = |id: &SymbolId| program.symbol(*id).kind == SymbolKind::Type;
    let name = ty.name.name.as_str();
    match &ty.qualifier {
        Some(qualifier) => match env.imports.get(qualifier)? {
            ImportTarget::Loaded(path) => program
                .scopes
                .get(path)?
                .get(name)
                .filter(|id| is_type(id))
                .map(|id| Ty::Known(*id)),
            ImportTarget::Opaque => Some(Ty::Opaque),
        },
        None => {
            let local = program.scopes.get(pkg).and_then(|s| s.get(name));
            let dotted = || {
                env.dot_imports
                    .iter()
                    .find_map(|p| program.scopes.get(p).and_then(|s| s.get(name)))
            };
            match local.or_else(dotted) {
                Some(id) if is_type(id) => Some(Ty::Known(*id)),
                Some(_) => None,
                None if PREDECLARED_TYPES.contains(&name) => Some(Ty::Opaque),
                None => None,
            }
        }
    }
}

/// Static knowledge about an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    /// A value whose members live on the type.
    Value(Ty),
    /// A type name (conversion, method expression, literal type).
    TypeName(SymbolId),
    /// A function, or a local type; calling it yields the result type.
    Call(Option<Ty>),
}

/// How the keys of a composite literal are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lit {
    /// Keys are fields of this struct type.
    Struct(SymbolId),
    /// Keys are expressions; elided element literals have `elem` after
    /// `layers - 1` more levels of nesting.
    Collection { elem: Option<Ty>, layers: usize },
    /// Keys belong to a type that has no symbols of ours.
    Foreign,
    /// Type unknown; field-looking keys are recorded as unresolved.
    Unknown,
}

/// A name in a block scope.
#[derive(Debug, Clone, Copy)]
struct Binding {
    /// Value type of a variable; for a type name, the type it denotes.
    ty: Option<Ty>,
    local: Option<usize>,
    is_type: bool,
}

fn is_type_node(kind: &str) -> bool {
    matches!(
        kind,
        "type_identifier"
            | "qualified_type"
            | "pointer_type"
            | "generic_type"
            | "slice_type"
            | "array_type"
            | "implicit_length_array_type"
            | "map_type"
            | "channel_type"
            | "function_type"
            | "struct_type"
            | "interface_type"
            | "parenthesized_type"
            | "negated_type"
            | "type_elem"
    )
}

fn unwrap_element(node: Node) -> Node {
    if node.kind() == "literal_element" {
        named_children(node).into_iter().next().unwrap_or(node)
    } else {
        node
    }
}

/// Every identifier spelled under `node`.
fn identifiers(node: Node, src: &[u8]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        match n.kind() {
            "identifier" | "type_identifier" | "package_identifier" | "label_name" => {
                out.insert(node_text(n, src).to_string());
            }
            _ => stack.extend(named_children(n)),
        }
    }
    out
}

/// A type-parameter name inside `[...]` of a receiver type.
fn single_type_name(node: Node) -> Option<Node> {
    match node.kind() {
        "type_identifier" | "identifier" => Some(node),
        "type_elem" | "constraint_elem" => match named_children(node).as_slice() {
            [single] => single_type_name(*single),
            _ => None,
        },
        _ => None,
    }
}

struct Resolver<'r, 't> {
    program: &'r Program,
    pkg: &'r str,
    file: usize,
    path: &'r Path,
    src: &'r [u8],
    env: &'r FileEnv,
    scopes: Vec<HashMap<String, Binding>>,
    labels: Vec<HashMap<String, Option<usize>>>,
    /// Qualified prefix for locals of the current top-level declaration.
    owner: String,
    decl: Option<Node<'t>>,
    context: Option<usize>,
    out: FileRefs,
}

/// Runs pass 2 over one parsed file of a scanned package.
pub(crate) fn resolve_file(
    program: &Program,
    pkg: &str,
    file: usize,
    path: &Path,
    root: Node<'_>,
    src: &[u8],
    env: &FileEnv,
) -> UnexportResult<FileRefs> {
    Resolver {
        program,
        pkg,
        file,
        path,
        src,
        env,
        scopes: Vec::new(),
        labels: Vec::new(),
        owner: String::new(),
        decl: None,
        context: None,
        out: FileRefs::default(),
    }
    .run(root)
}

impl<'r, 't> Resolver<'r, 't> {
    fn run(mut self, root: Node<'t>) -> UnexportResult<FileRefs> {
        for node in named_children(root) {
            self.decl = Some(node);
            self.context = None;
            self.owner = self.owner_name(node);
            match node.kind() {
                "function_declaration" | "method_declaration" => {
                    if let Some(name) = node.child_by_field_name("name") {
                        self.def(name);
                    }
                    self.function(node)?;
                }
                "type_declaration" => self.type_declaration(node)?,
                "var_declaration" => self.value_declaration(node, SymbolKind::Var)?,
                "const_declaration" => self.value_declaration(node, SymbolKind::Const)?,
                _ => {}
            }
        }
        Ok(self.out)
    }

    fn owner_name(&self, node: Node) -> String {
        let text = |n: Option<Node>| n.map(|n| node_text(n, self.src)).unwrap_or_default();
        let first_spec = |kind: &str| {
            text(
                specs(node, kind)
                    .into_iter()
                    .find_map(|s| s.child_by_field_name("name")),
            )
        };
        match node.kind() {
            "function_declaration" => text(node.child_by_field_name("name")).to_string(),
            "method_declaration" => {
                let receiver = node
                    .child_by_field_name("receiver")
                    .and_then(|r| named_children(r).into_iter().next())
                    .and_then(|p| p.child_by_field_name("type"))
                    .and_then(|t| named_type(t, self.src))
                    .map(|t| t.name.name)
                    .unwrap_or_default();
                format!("{}.{}", receiver, text(node.child_by_field_name("name")))
            }
            "type_declaration" => text(
                named_children(node)
                    .into_iter()
                    .find_map(|s| s.child_by_field_name("name")),
            )
            .to_string(),
            "var_declaration" => first_spec("var_spec").to_string(),
            "const_declaration" => first_spec("const_spec").to_string(),
            _ => String::new(),
        }
    }

    // ---- scopes -------------------------------------------------------

    fn lookup_local(&self, name: &str) -> Option<Binding> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    fn lookup_package(&self, name: &str) -> Option<SymbolId> {
        let scopes = &self.program.scopes;
        scopes
            .get(self.pkg)
            .and_then(|s| s.get(name))
            .or_else(|| {
                self.env
                    .dot_imports
                    .iter()
                    .find_map(|p| scopes.get(p).and_then(|s| s.get(name)))
            })
            .copied()
    }

    /// The import a qualifier names, unless a local shadows it.
    fn import_target(&self, qualifier: &str) -> Option<ImportTarget> {
        if self.lookup_local(qualifier).is_some() {
            return None;
        }
        self.env.imports.get(qualifier).cloned()
    }

    fn bind(&mut self, name: Node<'t>, kind: SymbolKind, ty: Option<Ty>, is_type: bool) {
        let text = node_text(name, self.src);
        if text == "_" || self.scopes.is_empty() {
            return;
        }
        let local = is_exported(text).then(|| self.new_local(name, kind));
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(text.to_string(), Binding { ty, local, is_type });
        }
    }

    /// Scoped, never collected: type parameters, type switch names.
    fn bind_hidden(&mut self, name: Node<'t>, ty: Option<Ty>, is_type: bool) {
        let text = node_text(name, self.src);
        if text == "_" {
            return;
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                text.to_string(),
                Binding {
                    ty,
                    local: None,
                    is_type,
                },
            );
        }
    }

    /// `:=` target: new in the innermost scope, otherwise an assignment.
    fn bind_short(&mut self, name: Node<'t>, ty: Option<Ty>) -> UnexportResult<()> {
        if name.kind() != "identifier" {
            self.expr(name)?;
            return Ok(());
        }
        let text = node_text(name, self.src);
        let existing = self.scopes.last().and_then(|s| s.get(text).copied());
        match existing {
            Some(binding) => self.use_local(name, binding),
            None => self.bind(name, SymbolKind::Var, ty, false),
        }
        Ok(())
    }

    fn new_local(&mut self, name: Node<'t>, kind: SymbolKind) -> usize {
        let context = match self.context {
            Some(c) => c,
            None => {
                let set = self
                    .decl
                    .map(|d| identifiers(d, self.src))
                    .unwrap_or_default();
                self.out.contexts.push(set);
                let c = self.out.contexts.len() - 1;
                self.context = Some(c);
                c
            }
        };
        let name_ident = Ident::from_node(name, self.src);
        let index = self.out.locals.len();
        self.out.locals.push(LocalDecl {
            qualified_name: format!("{}.{}", self.owner, name_ident.name),
            name: name_ident,
            kind,
            context,
        });
        self.local_site(index, name, true);
        index
    }

    // ---- sites --------------------------------------------------------

    fn site(&self, node: Node, symbol: SymbolId) -> Site {
        let (line, column) = position(node);
        Site {
            file: self.file,
            span: span(node),
            line,
            column,
            symbol,
        }
    }

    fn push_use(&mut self, node: Node, symbol: SymbolId) {
        let site = self.site(node, symbol);
        self.out.uses.push(site);
    }

    /// Records a declaring identifier of a package-level symbol or member.
    fn def(&mut self, node: Node) {
        if let Some(&symbol) = self.env.def_offsets.get(&node.start_byte()) {
            let site = self.site(node, symbol);
            self.out.defs.push(site);
        }
    }

    fn local_site(&mut self, local: usize, node: Node, is_def: bool) {
        let (line, column) = position(node);
        self.out.local_sites.push(LocalSite {
            local,
            span: span(node),
            line,
            column,
            is_def,
        });
    }

    fn use_local(&mut self, node: Node, binding: Binding) {
        if let Some(local) = binding.local {
            self.local_site(local, node, false);
        }
    }

    fn record_unresolved(&mut self, node: Node, is_key: bool) {
        let name = node_text(node, self.src);
        if !is_exported(name) {
            return;
        }
        let (line, column) = position(node);
        self.out.unresolved.push(UnresolvedRef {
            name: name.to_string(),
            file: self.file,
            line,
            column,
            is_key,
        });
    }

    // ---- operands -----------------------------------------------------

    fn operand_of(&self, sym: SymbolId) -> Option<Operand> {
        let value_type = self.program.types.value_type.get(&sym).copied();
        match self.program.symbol(sym).kind {
            SymbolKind::Type => Some(Operand::TypeName(sym)),
            SymbolKind::Func | SymbolKind::Method => Some(Operand::Call(value_type)),
            SymbolKind::Var | SymbolKind::Const | SymbolKind::Field => value_type.map(Operand::Value),
            SymbolKind::Label => None,
        }
    }

    fn member_operand(&self, member: SymbolId) -> Option<Operand> {
        match self.program.symbol(member).kind {
            // embedded type reached as a field
            SymbolKind::Type => Some(Operand::Value(Ty::Known(member))),
            _ => self.operand_of(member),
        }
    }

    // ---- declarations -------------------------------------------------

    fn function(&mut self, node: Node<'t>) -> UnexportResult<Option<Ty>> {
        self.scopes.push(HashMap::new());
        self.labels.push(HashMap::new());
        let body = node.child_by_field_name("body");
        if let Some(body) = body {
            self.collect_labels(body);
        }
        if let Some(receiver) = node.child_by_field_name("receiver") {
            self.receiver(receiver)?;
        }
        if let Some(type_params) = node.child_by_field_name("type_parameters") {
            self.type_params(type_params)?;
        }
        if let Some(params) = node.child_by_field_name("parameters") {
            self.params(params)?;
        }
        let result = match node.child_by_field_name("result") {
            Some(list) if list.kind() == "parameter_list" => self.params(list)?,
            Some(ty) => self.type_node(ty)?,
            None => None,
        };
        // parameters and the body's outermost block share a scope
        if let Some(body) = body {
            self.statements(body)?;
        }
        self.labels.pop();
        self.scopes.pop();
        Ok(result)
    }

    /// Declares parameters; returns the type of the first one.
    fn params(&mut self, list: Node<'t>) -> UnexportResult<Option<Ty>> {
        let mut first = None;
        for (i, param) in named_children(list).into_iter().enumerate() {
            let ty = match param.child_by_field_name("type") {
                Some(t) => self.type_node(t)?,
                None => None,
            };
            let ty = if param.kind() == "variadic_parameter_declaration" {
                None
            } else {
                ty
            };
            if i == 0 {
                first = ty;
            }
            for name in field_children(param, "name") {
                self.bind(name, SymbolKind::Var, ty, false);
            }
        }
        Ok(first)
    }

    fn receiver(&mut self, list: Node<'t>) -> UnexportResult<()> {
        for param in named_children(list) {
            let mut ty_node = param.child_by_field_name("type");
            while let Some(t) = ty_node.filter(|t| matches!(t.kind(), "pointer_type" | "parenthesized_type")) {
                ty_node = named_children(t).into_iter().next();
            }
            let ty = match ty_node {
                Some(generic) if generic.kind() == "generic_type" => {
                    if let Some(args) = generic.child_by_field_name("type_arguments") {
                        for arg in named_children(args) {
                            if let Some(name) = single_type_name(arg) {
                                self.bind_hidden(name, None, true);
                            }
                        }
                    }
                    match generic.child_by_field_name("type") {
                        Some(base) => self.type_node(base)?,
                        None => None,
                    }
                }
                Some(t) => self.type_node(t)?,
                None => None,
            };
            for name in field_children(param, "name") {
                self.bind(name, SymbolKind::Var, ty, false);
            }
        }
        Ok(())
    }

    fn type_params(&mut self, list: Node<'t>) -> UnexportResult<()> {
        let decls = named_children(list);
        for decl in &decls {
            for name in field_children(*decl, "name") {
                self.bind_hidden(name, None, true);
            }
        }
        for decl in decls {
            if let Some(constraint) = decl.child_by_field_name("type") {
                self.type_node(constraint)?;
            }
        }
        Ok(())
    }

    fn collect_labels(&mut self, body: Node<'t>) {
        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "func_literal" => continue,
                "labeled_statement" | "empty_labeled_statement" => {
                    if let Some(label) = node.child_by_field_name("label") {
                        let text = node_text(label, self.src).to_string();
                        let local =
                            is_exported(&text).then(|| self.new_local(label, SymbolKind::Label));
                        if let Some(labels) = self.labels.last_mut() {
                            labels.insert(text, local);
                        }
                    }
                }
                _ => {}
            }
            let mut inner = named_children(node);
            inner.reverse();
            stack.extend(inner);
        }
    }

    fn label_use(&mut self, node: Node<'t>) {
        for label in named_children(node) {
            if label.kind() != "label_name" {
                continue;
            }
            let text = node_text(label, self.src);
            if let Some(Some(local)) = self.labels.last().and_then(|l| l.get(text)).copied() {
                self.local_site(local, label, false);
            }
        }
    }

    fn value_declaration(&mut self, node: Node<'t>, kind: SymbolKind) -> UnexportResult<()> {
        let spec_kind = if kind == SymbolKind::Const {
            "const_spec"
        } else {
            "var_spec"
        };
        let local = !self.scopes.is_empty();
        for spec in specs(node, spec_kind) {
            let declared = match spec.child_by_field_name("type") {
                Some(t) => Some(self.type_node(t)?),
                None => None,
            };
            let values = match spec.child_by_field_name("value") {
                Some(v) => self.expr_list(v)?,
                None => Vec::new(),
            };
            let names = field_children(spec, "name");
            if !local {
                for name in names {
                    self.def(name);
                }
                continue;
            }
            let paired = names.len() == values.len();
            for (i, name) in names.into_iter().enumerate() {
                let ty = match declared {
                    Some(ty) => ty,
                    None if paired => values[i].and_then(value_type),
                    None => None,
                };
                self.bind(name, kind, ty, false);
            }
        }
        Ok(())
    }

    fn type_declaration(&mut self, node: Node<'t>) -> UnexportResult<()> {
        let local = !self.scopes.is_empty();
        for spec in named_children(node) {
            if !matches!(spec.kind(), "type_spec" | "type_alias") {
                continue;
            }
            let (Some(name), Some(ty)) = (
                spec.child_by_field_name("name"),
                spec.child_by_field_name("type"),
            ) else {
                continue;
            };
            if local {
                let denotes = local_type_value(ty);
                self.bind(name, SymbolKind::Type, denotes, true);
            } else {
                self.def(name);
            }
            self.scopes.push(HashMap::new());
            if let Some(type_params) = spec.child_by_field_name("type_parameters") {
                self.type_params(type_params)?;
            }
            self.type_node(ty)?;
            self.scopes.pop();
        }
        Ok(())
    }

    // ---- statements ---------------------------------------------------

    fn statements(&mut self, block: Node<'t>) -> UnexportResult<()> {
        for stmt in named_children(block) {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn block(&mut self, block: Node<'t>) -> UnexportResult<()> {
        self.scoped(|this| this.statements(block))
    }

    fn scoped<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> UnexportResult<T>,
    ) -> UnexportResult<T> {
        self.scopes.push(HashMap::new());
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn statement(&mut self, node: Node<'t>) -> UnexportResult<()> {
        match node.kind() {
            "block" => self.block(node)?,
            "statement_list" => self.statements(node)?,
            "short_var_declaration" => self.short_var(node)?,
            "var_declaration" => self.value_declaration(node, SymbolKind::Var)?,
            "const_declaration" => self.value_declaration(node, SymbolKind::Const)?,
            "type_declaration" => self.type_declaration(node)?,
            "labeled_statement" | "empty_labeled_statement" => {
                for inner in named_children(node) {
                    if inner.kind() != "label_name" {
                        self.statement(inner)?;
                    }
                }
            }
            "break_statement" | "continue_statement" | "goto_statement" => self.label_use(node),
            "if_statement" => self.if_statement(node)?,
            "for_statement" => self.for_statement(node)?,
            "expression_switch_statement" | "select_statement" => self.cases(node)?,
            "type_switch_statement" => self.type_switch(node)?,
            "receive_statement" => self.receive(node)?,
            "fallthrough_statement" | "empty_statement" => {}
            _ => {
                self.expr(node)?;
            }
        }
        Ok(())
    }

    fn short_var(&mut self, node: Node<'t>) -> UnexportResult<()> {
        let values = match node.child_by_field_name("right") {
            Some(right) => self.expr_list(right)?,
            None => Vec::new(),
        };
        let names = node
            .child_by_field_name("left")
            .map(named_children)
            .unwrap_or_default();
        let paired = names.len() == values.len();
        for (i, name) in names.into_iter().enumerate() {
            let ty = if paired {
                values[i].and_then(value_type)
            } else {
                None
            };
            self.bind_short(name, ty)?;
        }
        Ok(())
    }

    fn receive(&mut self, node: Node<'t>) -> UnexportResult<()> {
        if let Some(right) = node.child_by_field_name("right") {
            self.expr(right)?;
        }
        if let Some(left) = node.child_by_field_name("left") {
            if has_token(node, ":=") {
                for name in named_children(left) {
                    self.bind_short(name, None)?;
                }
            } else {
                self.expr(left)?;
            }
        }
        Ok(())
    }

    /// `if` header names stay in scope through the whole `else` chain.
    fn if_statement(&mut self, node: Node<'t>) -> UnexportResult<()> {
        self.scoped(|this| {
            if let Some(init) = node.child_by_field_name("initializer") {
                this.statement(init)?;
            }
            if let Some(condition) = node.child_by_field_name("condition") {
                this.expr(condition)?;
            }
            if let Some(consequence) = node.child_by_field_name("consequence") {
                this.block(consequence)?;
            }
            match node.child_by_field_name("alternative") {
                Some(alt) if alt.kind() == "if_statement" => this.if_statement(alt),
                Some(alt) => this.block(alt),
                None => Ok(()),
            }
        })
    }

    fn for_statement(&mut self, node: Node<'t>) -> UnexportResult<()> {
        let body = node.child_by_field_name("body");
        self.scoped(|this| {
            for child in named_children(node) {
                if Some(child) == body {
                    continue;
                }
                match child.kind() {
                    "for_clause" => {
                        if let Some(init) = child.child_by_field_name("initializer") {
                            this.statement(init)?;
                        }
                        if let Some(condition) = child.child_by_field_name("condition") {
                            this.expr(condition)?;
                        }
                        if let Some(update) = child.child_by_field_name("update") {
                            this.statement(update)?;
                        }
                    }
                    "range_clause" => {
                        if let Some(right) = child.child_by_field_name("right") {
                            this.expr(right)?;
                        }
                        if let Some(left) = child.child_by_field_name("left") {
                            if has_token(child, ":=") {
                                for name in named_children(left) {
                                    this.bind_short(name, None)?;
                                }
                            } else {
                                this.expr(left)?;
                            }
                        }
                    }
                    _ => {
                        this.expr(child)?;
                    }
                }
            }
            match body {
                Some(body) => this.block(body),
                None => Ok(()),
            }
        })
    }

    /// Expression switch and select: every clause is its own block.
    fn cases(&mut self, node: Node<'t>) -> UnexportResult<()> {
        self.scoped(|this| {
            for child in named_children(node) {
                match child.kind() {
                    "expression_case" | "default_case" | "communication_case" => {
                        this.scoped(|clause| clause.statements(child))?;
                    }
                    _ => this.statement(child)?,
                }
            }
            Ok(())
        })
    }

    fn type_switch(&mut self, node: Node<'t>) -> UnexportResult<()> {
        self.scoped(|this| {
            if let Some(init) = node.child_by_field_name("initializer") {
                this.statement(init)?;
            }
            let alias = node
                .child_by_field_name("alias")
                .and_then(|list| named_children(list).into_iter().next());
            if let Some(value) = node.child_by_field_name("value") {
                this.expr(value)?;
            }
            for clause in named_children(node) {
                if matches!(clause.kind(), "type_case" | "default_case") {
                    this.scoped(|inner| inner.type_clause(clause, alias))?;
                }
            }
            Ok(())
        })
    }

    /// The switch name takes the clause's type when it lists exactly one.
    fn type_clause(&mut self, clause: Node<'t>, alias: Option<Node<'t>>) -> UnexportResult<()> {
        let types = field_children(clause, "type");
        let mut single = None;
        for t in &types {
            single = self.type_or_expr(*t)?;
        }
        if let Some(alias) = alias {
            let ty = if types.len() == 1 { single } else { None };
            self.bind_hidden(alias, ty, false);
        }
        for stmt in named_children(clause) {
            if !types.contains(&stmt) {
                self.statement(stmt)?;
            }
        }
        Ok(())
    }

    // ---- expressions --------------------------------------------------

    fn expr_list(&mut self, node: Node<'t>) -> UnexportResult<Vec<Option<Operand>>> {
        if node.kind() != "expression_list" {
            return Ok(vec![self.expr(node)?]);
        }
        named_children(node)
            .into_iter()
            .map(|e| self.expr(e))
            .collect()
    }

    fn expr(&mut self, node: Node<'t>) -> UnexportResult<Option<Operand>> {
        let operand = match node.kind() {
            "identifier" => self.identifier(node),
            "selector_expression" => self.selector_expression(node)?,
            "call_expression" => self.call(node)?,
            "composite_literal" => self.composite(node)?,
            "func_literal" => Some(Operand::Call(self.function(node)?)),
            "unary_expression" => {
                let inner = match node.child_by_field_name("operand") {
                    Some(o) => self.expr(o)?,
                    None => None,
                };
                match field_text(node, "operator", self.src) {
                    Some("&") | Some("*") => inner,
                    _ => None,
                }
            }
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.expr(inner)?,
                None => None,
            },
            "type_assertion_expression" => {
                if let Some(operand) = node.child_by_field_name("operand") {
                    self.expr(operand)?;
                }
                match node.child_by_field_name("type") {
                    Some(t) => self.type_node(t)?.map(Operand::Value),
                    None => None,
                }
            }
            "type_conversion_expression" => {
                let ty = match node.child_by_field_name("type") {
                    Some(t) => self.type_node(t)?,
                    None => None,
                };
                if let Some(operand) = node.child_by_field_name("operand") {
                    self.expr(operand)?;
                }
                ty.map(Operand::Value)
            }
            "index_expression" => {
                let base = match node.child_by_field_name("operand") {
                    Some(o) => self.expr(o)?,
                    None => None,
                };
                if let Some(index) = node.child_by_field_name("index") {
                    self.type_or_expr(index)?;
                }
                match base {
                    // instantiation of a generic function or type
                    Some(op @ (Operand::Call(_) | Operand::TypeName(_))) => Some(op),
                    Some(Operand::Value(Ty::Opaque)) => Some(Operand::Value(Ty::Opaque)),
                    _ => None,
                }
            }
            "type_instantiation_expression" => {
                let mut base = None;
                for (i, part) in named_children(node).into_iter().enumerate() {
                    let ty = self.type_or_expr(part)?;
                    if i == 0 {
                        base = ty;
                    }
                }
                match base {
                    Some(Ty::Known(t)) => Some(Operand::TypeName(t)),
                    Some(Ty::Opaque) => Some(Operand::Value(Ty::Opaque)),
                    None => None,
                }
            }
            "slice_expression" => {
                let mut base = None;
                for (i, part) in named_children(node).into_iter().enumerate() {
                    let op = self.expr(part)?;
                    if i == 0 {
                        base = op;
                    }
                }
                base.filter(|op| *op == Operand::Value(Ty::Opaque))
            }
            kind if is_type_node(kind) => {
                self.type_node(node)?;
                None
            }
            _ => {
                for child in named_children(node) {
                    self.expr(child)?;
                }
                None
            }
        };
        Ok(operand)
    }

    fn identifier(&mut self, node: Node<'t>) -> Option<Operand> {
        let name = node_text(node, self.src);
        if name == "_" {
            return None;
        }
        if let Some(binding) = self.lookup_local(name) {
            self.use_local(node, binding);
            return if binding.is_type {
                Some(Operand::Call(binding.ty))
            } else {
                binding.ty.map(Operand::Value)
            };
        }
        if let Some(sym) = self.lookup_package(name) {
            self.push_use(node, sym);
            return self.operand_of(sym);
        }
        PREDECLARED_TYPES
            .contains(&name)
            .then_some(Operand::Value(Ty::Opaque))
    }

    fn selector_expression(&mut self, node: Node<'t>) -> UnexportResult<Option<Operand>> {
        let (Some(operand), Some(field)) = (
            node.child_by_field_name("operand"),
            node.child_by_field_name("field"),
        ) else {
            return Ok(None);
        };
        if operand.kind() == "identifier" {
            let qualifier = node_text(operand, self.src);
            if let Some(target) = self.import_target(qualifier) {
                return self.qualified(target, qualifier, field);
            }
        }
        let prev = self.expr(operand)?;
        Ok(self.member(field, prev))
    }

    /// `pkg.Name`, in an expression or a type.
    fn qualified(
        &mut self,
        target: ImportTarget,
        qualifier: &str,
        name: Node<'t>,
    ) -> UnexportResult<Option<Operand>> {
        match target {
            ImportTarget::Loaded(path) => {
                let member = node_text(name, self.src);
                let sym = self
                    .program
                    .scopes
                    .get(&path)
                    .and_then(|s| s.get(member))
                    .copied();
                let Some(sym) = sym else {
                    let (line, column) = position(name);
                    return Err(UnexportError::load(
                        self.pkg,
                        format!(
                            "{}:{}:{}: undefined: {}.{}",
                            self.path.display(),
                            line,
                            column,
                            qualifier,
                            member
                        ),
                    ));
                };
                self.push_use(name, sym);
                Ok(self.operand_of(sym))
            }
            ImportTarget::Opaque => Ok(Some(Operand::Value(Ty::Opaque))),
        }
    }

    fn member(&mut self, field: Node<'t>, prev: Option<Operand>) -> Option<Operand> {
        let name = node_text(field, self.src);
        let program = self.program;
        let types = &program.types;
        match prev {
            Some(Operand::Value(Ty::Known(ty))) | Some(Operand::TypeName(ty)) => {
                match types.lookup_member(ty, name) {
                    Some(member) => {
                        self.push_use(field, member);
                        self.member_operand(member)
                    }
                    None if types.embeds_opaque(ty) => Some(Operand::Value(Ty::Opaque)),
                    None => {
                        self.record_unresolved(field, false);
                        None
                    }
                }
            }
            Some(Operand::Value(Ty::Opaque)) => Some(Operand::Value(Ty::Opaque)),
            _ => {
                self.record_unresolved(field, false);
                None
            }
        }
    }

    fn call(&mut self, node: Node<'t>) -> UnexportResult<Option<Operand>> {
        let function = node.child_by_field_name("function");
        let args = node
            .child_by_field_name("arguments")
            .map(named_children)
            .unwrap_or_default();

        if let Some(f) = function.filter(|f| f.kind() == "identifier") {
            let name = node_text(f, self.src);
            let builtin = matches!(name, "new" | "make")
                && self.lookup_local(name).is_none()
                && self.lookup_package(name).is_none();
            if builtin {
                let mut ty = None;
                for (i, arg) in args.into_iter().enumerate() {
                    if i == 0 {
                        ty = self.type_or_expr(arg)?;
                    } else {
                        self.expr(arg)?;
                    }
                }
                return Ok(ty.map(Operand::Value));
            }
        }

        let callee = match function {
            Some(f) => self.expr(f)?,
            None => None,
        };
        if let Some(type_args) = node.child_by_field_name("type_arguments") {
            for arg in named_children(type_args) {
                self.type_node(arg)?;
            }
        }
        for arg in args {
            self.type_or_expr(arg)?;
        }
        Ok(match callee {
            Some(Operand::Call(result)) => result.map(Operand::Value),
            Some(Operand::TypeName(t)) => Some(Operand::Value(Ty::Known(t))),
            Some(Operand::Value(Ty::Opaque)) => Some(Operand::Value(Ty::Opaque)),
            _ => None,
        })
    }

    /// An argument that may be a type: `new(T)`, `make([]T, n)`, `F[T]`.
    fn type_or_expr(&mut self, node: Node<'t>) -> UnexportResult<Option<Ty>> {
        if is_type_node(node.kind()) {
            return self.type_node(node);
        }
        Ok(match self.expr(node)? {
            Some(Operand::TypeName(t)) => Some(Ty::Known(t)),
            Some(Operand::Value(Ty::Opaque)) => Some(Ty::Opaque),
            Some(Operand::Call(ty)) => ty,
            _ => None,
        })
    }

    // ---- composite literals -------------------------------------------

    fn lit_for_type(&self, ty: Ty) -> Lit {
        match ty {
            Ty::Known(id) if self.program.types.struct_types.contains(&id) => Lit::Struct(id),
            Ty::Known(_) => Lit::Collection {
                elem: None,
                layers: 1,
            },
            Ty::Opaque => Lit::Foreign,
        }
    }

    fn elided(&self, parent: Lit) -> Lit {
        match parent {
            Lit::Collection { elem, layers } if layers > 1 => Lit::Collection {
                elem,
                layers: layers - 1,
            },
            Lit::Collection { elem: Some(ty), .. } => self.lit_for_type(ty),
            Lit::Foreign => Lit::Foreign,
            _ => Lit::Unknown,
        }
    }

    fn composite(&mut self, node: Node<'t>) -> UnexportResult<Option<Operand>> {
        let (lit, value) = match node.child_by_field_name("type") {
            Some(ty) => self.literal_type(ty)?,
            None => (Lit::Unknown, None),
        };
        if let Some(body) = node.child_by_field_name("body") {
            self.literal_value(body, lit)?;
        }
        Ok(value.map(Operand::Value))
    }

    /// Key interpretation of a literal and the type of the value it builds.
    fn literal_type(&mut self, ty: Node<'t>) -> UnexportResult<(Lit, Option<Ty>)> {
        let mut layers = 0;
        let mut current = ty;
        loop {
            let next = match current.kind() {
                "slice_type" | "array_type" | "implicit_length_array_type" => {
                    if let Some(length) = current.child_by_field_name("length") {
                        self.expr(length)?;
                    }
                    current.child_by_field_name("element")
                }
                "map_type" => {
                    if let Some(key) = current.child_by_field_name("key") {
                        self.type_node(key)?;
                    }
                    current.child_by_field_name("value")
                }
                // `[]*T{{...}}` elides `&T`
                "pointer_type" if layers > 0 => {
                    layers -= 1;
                    named_children(current).into_iter().next()
                }
                _ => break,
            };
            let Some(next) = next else { break };
            layers += 1;
            current = next;
        }
        let anonymous = matches!(current.kind(), "struct_type" | "interface_type");
        let res = self.type_node(current)?;
        let res = if anonymous { Some(Ty::Opaque) } else { res };
        if layers > 0 {
            return Ok((Lit::Collection { elem: res, layers }, None));
        }
        Ok(match res {
            Some(ty) => (self.lit_for_type(ty), Some(ty)),
            None => (Lit::Unknown, None),
        })
    }

    fn literal_value(&mut self, body: Node<'t>, lit: Lit) -> UnexportResult<()> {
        for element in named_children(body) {
            if element.kind() != "keyed_element" {
                self.element(element, lit)?;
                continue;
            }
            let parts = named_children(element);
            let key = element
                .child_by_field_name("key")
                .or_else(|| parts.first().copied());
            let value = element
                .child_by_field_name("value")
                .or_else(|| parts.get(1).copied());
            if let Some(key) = key {
                self.literal_key(key, lit)?;
            }
            if let Some(value) = value {
                self.element(value, lit)?;
            }
        }
        Ok(())
    }

    fn element(&mut self, node: Node<'t>, parent: Lit) -> UnexportResult<()> {
        let inner = unwrap_element(node);
        if inner.kind() == "literal_value" {
            let lit = self.elided(parent);
            return self.literal_value(inner, lit);
        }
        self.expr(inner)?;
        Ok(())
    }

    fn literal_key(&mut self, key: Node<'t>, lit: Lit) -> UnexportResult<()> {
        let inner = unwrap_element(key);
        let is_name = matches!(inner.kind(), "identifier" | "field_identifier");
        match lit {
            Lit::Struct(ty) if is_name => {
                let name = node_text(inner, self.src);
                let program = self.program;
                let types = &program.types;
                match types.members.get(&ty).and_then(|m| m.get(name)).copied() {
                    Some(field) => self.push_use(inner, field),
                    None if types.embeds_opaque(ty) => {}
                    None => self.record_unresolved(inner, true),
                }
            }
            Lit::Unknown if is_name => self.record_unresolved(inner, true),
            Lit::Foreign if is_name => {}
            _ => self.element(key, lit)?,
        }
        Ok(())
    }

    // ---- types --------------------------------------------------------

    fn type_node(&mut self, node: Node<'t>) -> UnexportResult<Option<Ty>> {
        let ty = match node.kind() {
            "type_identifier" | "identifier" => self.type_name(node),
            "qualified_type" => {
                let (Some(package), Some(name)) = (
                    node.child_by_field_name("package"),
                    node.child_by_field_name("name"),
                ) else {
                    return Ok(None);
                };
                let qualifier = node_text(package, self.src);
                match self.import_target(qualifier) {
                    Some(target) => match self.qualified(target, qualifier, name)? {
                        Some(Operand::TypeName(t)) => Some(Ty::Known(t)),
                        Some(Operand::Value(Ty::Opaque)) => Some(Ty::Opaque),
                        _ => None,
                    },
                    None => None,
                }
            }
            "pointer_type" | "parenthesized_type" => match named_children(node).into_iter().next() {
                Some(inner) => self.type_node(inner)?,
                None => None,
            },
            "generic_type" => {
                if let Some(args) = node.child_by_field_name("type_arguments") {
                    for arg in named_children(args) {
                        self.type_node(arg)?;
                    }
                }
                match node.child_by_field_name("type") {
                    Some(base) => self.type_node(base)?,
                    None => None,
                }
            }
            "struct_type" => {
                for decl in specs(node, "field_declaration") {
                    for name in field_children(decl, "name") {
                        self.def(name);
                    }
                    if let Some(ty) = decl.child_by_field_name("type") {
                        self.type_node(ty)?;
                    }
                }
                None
            }
            "interface_type" => {
                for elem in named_children(node) {
                    if matches!(elem.kind(), "method_elem" | "method_spec") {
                        if let Some(name) = elem.child_by_field_name("name") {
                            self.def(name);
                        }
                        self.signature_types(elem)?;
                    } else {
                        self.type_node(elem)?;
                    }
                }
                None
            }
            "function_type" => {
                self.signature_types(node)?;
                None
            }
            "array_type" => {
                if let Some(length) = node.child_by_field_name("length") {
                    self.expr(length)?;
                }
                if let Some(element) = node.child_by_field_name("element") {
                    self.type_node(element)?;
                }
                None
            }
            _ => {
                for child in named_children(node) {
                    self.type_node(child)?;
                }
                None
            }
        };
        Ok(ty)
    }

    fn type_name(&mut self, node: Node<'t>) -> Option<Ty> {
        let name = node_text(node, self.src);
        if let Some(binding) = self.lookup_local(name) {
            self.use_local(node, binding);
            return binding.ty;
        }
        if let Some(sym) = self.lookup_package(name) {
            self.push_use(node, sym);
            return (self.program.symbol(sym).kind == SymbolKind::Type).then_some(Ty::Known(sym));
        }
        PREDECLARED_TYPES.contains(&name).then_some(Ty::Opaque)
    }

    /// Parameter and result types of a signature; names are not scoped.
    fn signature_types(&mut self, node: Node<'t>) -> UnexportResult<()> {
        for field in ["parameters", "result"] {
            let Some(part) = node.child_by_field_name(field) else {
                continue;
            };
            if part.kind() != "parameter_list" {
                self.type_node(part)?;
                continue;
            }
            for param in named_children(part) {
                if let Some(ty) = param.child_by_field_name("type") {
                    self.type_node(ty)?;
                }
            }
        }
        Ok(())
    }
}

fn value_type(op: Operand) -> Option<Ty> {
    match op {
        Operand::Value(ty) => Some(ty),
        _ => None,
    }
}

/// What values of a function-local type expose: nothing of ours unless it
/// embeds or renames another type.
fn local_type_value(ty: Node) -> Option<Ty> {
    match ty.kind() {
        "struct_type" => specs(ty, "field_declaration")
            .iter()
            .all(|d| d.child_by_field_name("name").is_some())
            .then_some(Ty::Opaque),
        "interface_type" => named_children(ty)
            .iter()
            .all(|e| matches!(e.kind(), "method_elem" | "method_spec"))
            .then_some(Ty::Opaque),
        "type_identifier" | "qualified_type" | "generic_type" | "pointer_type"
        | "parenthesized_type" => None,
        _ => Some(Ty::Opaque),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gosrc::program::{
        Package, PackageKind, SourceFile, Symbol, SymbolKey, TypeTable,
    };
    use crate::gosrc::syntax::parse_go;
    use std::path::PathBuf;

    /// Package `m/a` with type `T` (struct with field `Name` and method
    /// `Get`), func `New() *T`, and const `Max`.
    fn fixture() -> (Program, HashMap<&'static str, SymbolId>) {
        let mut program = Program::default();
        let mut ids = HashMap::new();
        let specs = [
            ("T", SymbolKind::Type, None),
            ("Name", SymbolKind::Field, Some("T")),
            ("Get", SymbolKind::Method, Some("T")),
            ("New", SymbolKind::Func, None),
            ("Max", SymbolKind::Const, None),
        ];
        for (n, (name, kind, owner)) in specs.iter().enumerate() {
            let id = SymbolId(n as u32);
            program.symbols.push(Symbol {
                key: SymbolKey {
                    package: "m/a".to_string(),
                    qualified_name: match owner {
                        Some(o) => format!("{}.{}", o, name),
                        None => name.to_string(),
                    },
                    file: PathBuf::from("a.go"),
                    offset: n,
                },
                name: name.to_string(),
                kind: *kind,
                exported: true,
                owner: owner.map(|o| ids[o]),
                line: 1,
                column: 1,
                tagged: false,
                in_test_file: false,
                local: false,
            });
            ids.insert(*name, id);
        }
        let scope = program.scopes.entry("m/a".to_string()).or_default();
        for name in ["T", "New", "Max"] {
            scope.insert(name.to_string(), ids[name]);
        }
        let mut types = TypeTable::default();
        let members = types.members.entry(ids["T"]).or_default();
        members.insert("Name".to_string(), ids["Name"]);
        members.insert("Get".to_string(), ids["Get"]);
        types.struct_types.insert(ids["T"]);
        types.value_type.insert(ids["New"], Ty::Known(ids["T"]));
        types.value_type.insert(ids["Name"], Ty::Opaque);
        program.types = types;
        program.packages.push(Package {
            path: "m/a".to_string(),
            name: "a".to_string(),
            dir: PathBuf::from("a"),
            kind: PackageKind::Primary,
            files: vec![SourceFile::new(PathBuf::from("b.go"), String::new(), false)],
            defs: Vec::new(),
            uses: Vec::new(),
            unresolved: Vec::new(),
        });
        (program, ids)
    }

    fn resolve_with(src: &str, env: &FileEnv) -> UnexportResult<FileRefs> {
        let (program, _) = fixture();
        let tree = parse_go(Path::new("b.go"), src)?;
        resolve_file(
            &program,
            "m/a",
            0,
            Path::new("b.go"),
            tree.root_node(),
            src.as_bytes(),
            env,
        )
    }

    fn resolve(src: &str) -> (FileRefs, HashMap<&'static str, SymbolId>) {
        let (_, ids) = fixture();
        (resolve_with(src, &FileEnv::default()).unwrap(), ids)
    }

    fn used(refs: &FileRefs, src: &str) -> Vec<String> {
        refs.uses
            .iter()
            .map(|s| src[s.span.start..s.span.end].to_string())
            .collect()
    }

    fn locals(refs: &FileRefs) -> Vec<(&str, SymbolKind)> {
        refs.locals
            .iter()
            .map(|l| (l.qualified_name.as_str(), l.kind))
            .collect()
    }

    #[test]
    fn test_field_and_method_through_constructor() {
        let src = "package a\n\nfunc f() {\n\tt := New()\n\tt.Name = \"x\"\n\t_ = t.Get()\n}\n";
        let (refs, _) = resolve(src);
        assert_eq!(used(&refs, src), vec!["New", "Name", "Get"]);
        assert!(refs.unresolved.is_empty());
    }

    #[test]
    fn test_composite_literal_keys() {
        let src = "package a\n\nvar v = []*T{{Name: \"a\"}, &T{Name: \"b\"}}\n";
        let (refs, ids) = resolve(src);
        let names: Vec<SymbolId> = refs.uses.iter().map(|s| s.symbol).collect();
        assert_eq!(names, vec![ids["T"], ids["Name"], ids["T"], ids["Name"]]);
    }

    #[test]
    fn test_locals_shadow_package_names() {
        let src = "package a\n\nfunc f(Max int) int {\n\tNew := 3\n\treturn Max + New\n}\n\nfunc g() int { return Max }\n";
        let (refs, _) = resolve(src);
        assert_eq!(used(&refs, src), vec!["Max"]);
        assert_eq!(refs.uses[0].line, 8);
        assert_eq!(
            locals(&refs),
            vec![("f.Max", SymbolKind::Var), ("f.New", SymbolKind::Var)]
        );
        assert_eq!(refs.local_sites.len(), 4);
    }

    #[test]
    fn test_short_var_rhs_sees_outer_name() {
        let src = "package a\n\nfunc f() {\n\tMax := Max + 1\n\t_ = Max\n}\n";
        let (refs, _) = resolve(src);
        assert_eq!(used(&refs, src), vec!["Max"]);
        assert_eq!(refs.uses[0].column, 9);
        let local: Vec<(usize, bool)> = refs
            .local_sites
            .iter()
            .map(|s| (s.line, s.is_def))
            .collect();
        assert_eq!(local, vec![(4, true), (5, false)]);
    }

    #[test]
    fn test_short_var_redeclaration_is_assignment() {
        let src = "package a\n\nfunc Shadow() (int, error) {\n\tCount, err := 1, error(nil)\n\tCount, Other := 2, 3\n\treturn Count + Other, err\n}\n";
        let (refs, _) = resolve(src);
        assert_eq!(
            locals(&refs),
            vec![("Shadow.Count", SymbolKind::Var), ("Shadow.Other", SymbolKind::Var)]
        );
        let count_sites = refs.local_sites.iter().filter(|s| s.local == 0).count();
        assert_eq!(count_sites, 3);
        assert!(refs.contexts[0].contains("err"));
    }

    #[test]
    fn test_if_header_scope_ends_with_chain() {
        let src = "package a\n\nfunc f() {\n\tif Max := 1; Max > 0 {\n\t} else if Max < 0 {\n\t}\n\t_ = Max\n}\n";
        let (refs, _) = resolve(src);
        assert_eq!(used(&refs, src), vec!["Max"]);
        assert_eq!(refs.uses[0].line, 7);
    }

    #[test]
    fn test_unknown_receiver_is_recorded() {
        let src = "package a\n\nfunc f(x interface{ Get() int }) {\n\t_ = x.Get()\n\ty := g()\n\t_ = y.Name\n}\n";
        let (refs, _) = resolve(src);
        assert!(refs.uses.is_empty());
        let names: Vec<&str> = refs.unresolved.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Get", "Name"]);
    }

    #[test]
    fn test_method_expression_and_conversion() {
        let src = "package a\n\nvar f = (*T).Get\nvar g = T(T{}).Get\n";
        let (refs, _) = resolve(src);
        assert_eq!(used(&refs, src), vec!["T", "Get", "T", "T", "Get"]);
    }

    #[test]
    fn test_opaque_values_are_ignored() {
        let src = "package a\n\nfunc f(err error, s string) {\n\t_ = err.Error()\n\t_ = s\n}\n";
        let (refs, _) = resolve(src);
        assert!(refs.unresolved.is_empty());
    }

    #[test]
    fn test_labels_and_local_types() {
        let src = "package a\n\nfunc f() {\nMax:\n\tfor {\n\t\tbreak Max\n\t}\n\ttype New struct{ Name int }\n\t_ = New{Name: 1}\n}\n";
        let (refs, _) = resolve(src);
        assert!(refs.uses.is_empty());
        assert!(refs.unresolved.is_empty());
        assert_eq!(
            locals(&refs),
            vec![("f.Max", SymbolKind::Label), ("f.New", SymbolKind::Type)]
        );
        assert_eq!(refs.local_sites.len(), 4);
    }

    #[test]
    fn test_type_params_and_switch_names_are_not_collected() {
        let src = "package a\n\nfunc Map[E any](x E) E {\n\tswitch V := any(x).(type) {\n\tcase *T:\n\t\t_ = V.Name\n\t}\n\treturn x\n}\n";
        let (refs, ids) = resolve(src);
        assert!(refs.locals.is_empty());
        let bound: Vec<SymbolId> = refs.uses.iter().map(|s| s.symbol).collect();
        assert_eq!(bound, vec![ids["T"], ids["Name"]]);
    }

    #[test]
    fn test_anonymous_struct_fields_stay_unbound() {
        let src = "package a\n\nvar Meta struct{ Count int }\n\nfunc f() {\n\tm := map[string]struct{ A, B int }{}\n\t_ = m[\"x\"].A\n\t_ = Meta.Count\n}\n";
        let (refs, _) = resolve(src);
        assert!(refs.locals.is_empty());
        let names: Vec<&str> = refs.unresolved.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["A", "Count"]);
    }

    #[test]
    fn test_qualified_names() {
        let mut env = FileEnv::default();
        env.imports
            .insert("a".to_string(), ImportTarget::Loaded("m/a".to_string()));
        env.imports.insert("fmt".to_string(), ImportTarget::Opaque);

        let src = "package b\n\nvar x = a.New().Name\nvar y = fmt.Sprint(a.Max)\n";
        let refs = resolve_with(src, &env).unwrap();
        assert_eq!(used(&refs, src), vec!["New", "Name", "Max"]);

        let src = "package b\n\nvar x = a.Missing\n";
        let err = resolve_with(src, &env).unwrap_err();
        assert!(err.to_string().contains("b.go:3:11: undefined: a.Missing"));
    }
}
