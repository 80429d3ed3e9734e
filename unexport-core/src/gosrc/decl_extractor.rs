//! Pass 1: package clause, imports and package-level declarations of one file.
//!
//! Every declaring identifier keeps its byte span, so pass 2 recognises it
//! when it walks the same tree again. Function bodies are not entered here.

use tree_sitter::Node;

use super::syntax::{
    field_children, field_text, named_children, node_text, unquote, Ident, SyntaxError,
    SyntaxResult,
};

/// A named type reference, pointers and instantiation stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeExpr {
    pub qualifier: Option<String>,
    pub name: Ident,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Explicit local name, `_` or `.`.
    pub alias: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    /// For an embedded field, the embedded type's name.
    pub name: Ident,
    pub ty: Option<TypeExpr>,
    pub embedded: bool,
    pub tagged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSpec {
    pub name: Ident,
    pub result: Option<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape {
    Struct(Vec<FieldDecl>),
    Interface {
        methods: Vec<MethodSpec>,
        embedded: Vec<TypeExpr>,
    },
    /// Defined or alias type over another type expression.
    Named(Option<TypeExpr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclKind {
    Const { ty: Option<TypeExpr> },
    Var { ty: Option<TypeExpr> },
    Func { result: Option<TypeExpr> },
    Method { receiver: TypeExpr, result: Option<TypeExpr> },
    Type { shape: TypeShape },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decl {
    pub name: Ident,
    pub kind: DeclKind,
}

/// Everything pass 1 learns from one file.
#[derive(Debug, Clone, Default)]
pub struct FileDecls {
    pub package_name: String,
    pub imports: Vec<ImportSpec>,
    pub decls: Vec<Decl>,
}

/// Resolves a type node to the named type it denotes, if any.
pub fn named_type(node: Node, src: &[u8]) -> Option<TypeExpr> {
    match node.kind() {
        "type_identifier" => Some(TypeExpr {
            qualifier: None,
            name: Ident::from_node(node, src),
        }),
        "qualified_type" => Some(TypeExpr {
            qualifier: Some(field_text(node, "package", src)?.to_string()),
            name: Ident::from_node(node.child_by_field_name("name")?, src),
        }),
        "generic_type" => named_type(node.child_by_field_name("type")?, src),
        "pointer_type" | "parenthesized_type" => {
            named_type(named_children(node).into_iter().next()?, src)
        }
        _ => None,
    }
}

/// First result type of a function, method or method spec.
pub fn first_result(node: Node, src: &[u8]) -> Option<TypeExpr> {
    let result = node.child_by_field_name("result")?;
    if result.kind() == "parameter_list" {
        let first = named_children(result).into_iter().next()?;
        return named_type(first.child_by_field_name("type")?, src);
    }
    named_type(result, src)
}

/// Type of `T{...}` or `&T{...}`.
fn literal_type(node: Node, src: &[u8]) -> Option<TypeExpr> {
    match node.kind() {
        "unary_expression" if field_text(node, "operator", src) == Some("&") => {
            literal_type(node.child_by_field_name("operand")?, src)
        }
        "parenthesized_expression" => literal_type(named_children(node).into_iter().next()?, src),
        "composite_literal" => named_type(node.child_by_field_name("type")?, src),
        _ => None,
    }
}

/// Specs of a declaration, looking through `( ... )` groups.
pub(crate) fn specs<'t>(node: Node<'t>, kind: &str) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    for child in named_children(node) {
        if child.kind() == kind {
            out.push(child);
        } else if child.kind().ends_with("_list") {
            out.extend(specs(child, kind));
        }
    }
    out
}

struct Extractor<'s> {
    src: &'s [u8],
    out: FileDecls,
}

impl<'s> Extractor<'s> {
    fn new(src: &'s [u8]) -> Self {
        Self {
            src,
            out: FileDecls::default(),
        }
    }

    fn package_clause(&mut self, node: Node) {
        if let Some(name) = named_children(node)
            .into_iter()
            .find(|c| c.kind() == "package_identifier")
        {
            self.out.package_name = node_text(name, self.src).to_string();
        }
    }

    fn imports(&mut self, node: Node) {
        for spec in specs(node, "import_spec") {
            let Some(path) = field_text(spec, "path", self.src) else {
                continue;
            };
            self.out.imports.push(ImportSpec {
                alias: field_text(spec, "name", self.src).map(str::to_string),
                path: unquote(path).to_string(),
            });
        }
    }

    fn function(&mut self, node: Node) -> SyntaxResult<()> {
        let name = node
            .child_by_field_name("name")
            .ok_or_else(|| SyntaxError::at(node, "missing function name"))?;
        self.out.decls.push(Decl {
            name: Ident::from_node(name, self.src),
            kind: DeclKind::Func {
                result: first_result(node, self.src),
            },
        });
        Ok(())
    }

    fn method(&mut self, node: Node) -> SyntaxResult<()> {
        let receiver = node
            .child_by_field_name("receiver")
            .and_then(|r| named_children(r).into_iter().next())
            .and_then(|p| p.child_by_field_name("type"))
            .and_then(|t| named_type(t, self.src))
            .ok_or_else(|| SyntaxError::at(node, "method has no receiver type"))?;
        let name = node
            .child_by_field_name("name")
            .ok_or_else(|| SyntaxError::at(node, "missing method name"))?;
        self.out.decls.push(Decl {
            name: Ident::from_node(name, self.src),
            kind: DeclKind::Method {
                receiver,
                result: first_result(node, self.src),
            },
        });
        Ok(())
    }

    fn types(&mut self, node: Node) {
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
            let shape = match ty.kind() {
                "struct_type" => TypeShape::Struct(self.struct_fields(ty)),
                "interface_type" => self.interface(ty),
                _ => TypeShape::Named(named_type(ty, self.src)),
            };
            self.out.decls.push(Decl {
                name: Ident::from_node(name, self.src),
                kind: DeclKind::Type { shape },
            });
        }
    }

    fn struct_fields(&self, node: Node) -> Vec<FieldDecl> {
        let mut fields = Vec::new();
        for decl in specs(node, "field_declaration") {
            let ty = decl
                .child_by_field_name("type")
                .and_then(|t| named_type(t, self.src));
            let tagged = decl.child_by_field_name("tag").is_some();
            let names = field_children(decl, "name");
            if names.is_empty() {
                if let Some(ty) = ty {
                    fields.push(FieldDecl {
                        name: ty.name.clone(),
                        ty: Some(ty),
                        embedded: true,
                        tagged,
                    });
                }
                continue;
            }
            for name in names {
                fields.push(FieldDecl {
                    name: Ident::from_node(name, self.src),
                    ty: ty.clone(),
                    embedded: false,
                    tagged,
                });
            }
        }
        fields
    }

    fn interface(&self, node: Node) -> TypeShape {
        let mut methods = Vec::new();
        let mut embedded = Vec::new();
        for elem in named_children(node) {
            match elem.kind() {
                "method_elem" | "method_spec" => {
                    if let Some(name) = elem.child_by_field_name("name") {
                        methods.push(MethodSpec {
                            name: Ident::from_node(name, self.src),
                            result: first_result(elem, self.src),
                        });
                    }
                }
                "type_elem" | "constraint_elem" => {
                    let parts = named_children(elem);
                    if let [single] = parts.as_slice() {
                        embedded.extend(named_type(*single, self.src));
                    }
                }
                _ => embedded.extend(named_type(elem, self.src)),
            }
        }
        TypeShape::Interface { methods, embedded }
    }

    fn values(&mut self, node: Node, constant: bool) {
        let kind = if constant { "const_spec" } else { "var_spec" };
        for spec in specs(node, kind) {
            let names = field_children(spec, "name");
            let ty = spec
                .child_by_field_name("type")
                .and_then(|t| named_type(t, self.src))
                .or_else(|| {
                    let values = named_children(spec.child_by_field_name("value")?);
                    match (names.as_slice(), values.as_slice()) {
                        ([_], [value]) => literal_type(*value, self.src),
                        _ => None,
                    }
                });
            for name in names {
                let name = Ident::from_node(name, self.src);
                let ty = ty.clone();
                let kind = if constant {
                    DeclKind::Const { ty }
                } else {
                    DeclKind::Var { ty }
                };
                self.out.decls.push(Decl { name, kind });
            }
        }
    }

    fn finish(self, root: Node) -> SyntaxResult<FileDecls> {
        if self.out.package_name.is_empty() {
            return Err(SyntaxError::at(root, "expected 'package' clause"));
        }
        Ok(self.out)
    }
}

/// Runs pass 1 over a parsed file.
pub fn extract_decls(root: Node, src: &[u8]) -> SyntaxResult<FileDecls> {
    let mut ex = Extractor::new(src);
    for node in named_children(root) {
        match node.kind() {
            "package_clause" => ex.package_clause(node),
            "import_declaration" => ex.imports(node),
            "function_declaration" => ex.function(node)?,
            "method_declaration" => ex.method(node)?,
            "type_declaration" => ex.types(node),
            "var_declaration" => ex.values(node, false),
            "const_declaration" => ex.values(node, true),
            _ => {
                return Err(SyntaxError::at(
                    node,
                    "non-declaration statement outside function body",
                ))
            }
        }
    }
    ex.finish(root)
}

/// Package clause and imports only; stops at the first other declaration.
pub fn extract_imports(root: Node, src: &[u8]) -> SyntaxResult<FileDecls> {
    let mut ex = Extractor::new(src);
    for node in named_children(root) {
        match node.kind() {
            "package_clause" => ex.package_clause(node),
            "import_declaration" => ex.imports(node),
            _ => break,
        }
    }
    ex.finish(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gosrc::syntax::parse_go;
    use std::path::Path;

    fn try_decls(src: &str) -> Result<FileDecls, String> {
        let tree = parse_go(Path::new("t.go"), src).map_err(|e| e.to_string())?;
        extract_decls(tree.root_node(), src.as_bytes()).map_err(|e| e.message)
    }

    fn decls(src: &str) -> FileDecls {
        try_decls(src).unwrap()
    }

    fn names(f: &FileDecls) -> Vec<&str> {
        f.decls.iter().map(|d| d.name.name.as_str()).collect()
    }

    fn fields(f: &FileDecls, index: usize) -> Vec<(&str, bool, bool)> {
        let DeclKind::Type { shape: TypeShape::Struct(fields) } = &f.decls[index].kind else {
            panic!("{} should be a struct", f.decls[index].name.name);
        };
        fields
            .iter()
            .map(|fd| (fd.name.name.as_str(), fd.embedded, fd.tagged))
            .collect()
    }

    #[test]
    fn test_package_and_imports() {
        let f = decls(
            "package a\n\nimport (\n\t\"fmt\"\n\tx \"example.com/m/b\"\n\t_ \"embed\"\n\t. \"strings\"\n)\nimport \"os\"\n",
        );
        assert_eq!(f.package_name, "a");
        let imports: Vec<(Option<&str>, &str)> = f
            .imports
            .iter()
            .map(|i| (i.alias.as_deref(), i.path.as_str()))
            .collect();
        assert_eq!(
            imports,
            vec![
                (None, "fmt"),
                (Some("x"), "example.com/m/b"),
                (Some("_"), "embed"),
                (Some("."), "strings"),
                (None, "os"),
            ]
        );
    }

    #[test]
    fn test_top_level_declarations() {
        let src = r#"package a

const (
	A = iota
	B
)

var X, Y int
var Z = &Config{Name: "z"}

type Config struct {
	Name, Alias string `json:"name"`
	*Base
	io.Reader
	count int
}

type Getter interface {
	Get(key string) (Value, error)
	fmt.Stringer
}

type ID = string

type List[T any] struct{ items []T }

func New(name string) *Config { return &Config{Name: name} }

func (c *Config) Get(key string) (Value, error) {
	if key == "" {
		return Value{}, nil
	}
	return Value{}, nil
}

func Map[T, U any](xs []T, f func(T) U) []U { return nil }
"#;
        let f = decls(src);
        assert_eq!(
            names(&f),
            vec!["A", "B", "X", "Y", "Z", "Config", "Getter", "ID", "List", "New", "Get", "Map"]
        );

        let DeclKind::Var { ty: Some(z) } = &f.decls[4].kind else {
            panic!("Z should have an inferred type");
        };
        assert_eq!(z.qualifier, None);
        assert_eq!(z.name.name, "Config");
        assert_eq!(&src[z.name.span.start..z.name.span.end], "Config");

        assert_eq!(
            fields(&f, 5),
            vec![
                ("Name", false, true),
                ("Alias", false, true),
                ("Base", true, false),
                ("Reader", true, false),
                ("count", false, false),
            ]
        );

        let DeclKind::Type { shape: TypeShape::Interface { methods, embedded } } = &f.decls[6].kind
        else {
            panic!("Getter should be an interface");
        };
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name.name, "Get");
        assert_eq!(methods[0].result.as_ref().unwrap().name.name, "Value");
        assert_eq!(embedded[0].name.name, "Stringer");
        assert_eq!(embedded[0].qualifier.as_deref(), Some("fmt"));

        let DeclKind::Method { receiver, result } = &f.decls[10].kind else {
            panic!("Get should be a method");
        };
        assert_eq!(receiver.name.name, "Config");
        assert_eq!(result.as_ref().unwrap().name.name, "Value");

        let DeclKind::Func { result } = &f.decls[9].kind else {
            panic!("New should be a func");
        };
        assert_eq!(result.as_ref().unwrap().name.name, "Config");
        assert_eq!(f.decls[9].name.line, 27);
        assert_eq!(f.decls[9].name.column, 6);
    }

    #[test]
    fn test_embedded_generic_fields() {
        let f = decls(
            "package a\n\ntype H struct {\n\tP[string, int]\n\tL[int]\n\t*q.G[T]\n\tName string\n}\n",
        );
        assert_eq!(
            fields(&f, 0),
            vec![
                ("P", true, false),
                ("L", true, false),
                ("G", true, false),
                ("Name", false, false),
            ]
        );
    }

    #[test]
    fn test_generic_receiver_and_array_type() {
        let f = decls(
            "package a\n\nconst N = 4\n\ntype Buf [N]byte\n\ntype List[T any] struct{ items []T }\n\nfunc (l *List[T]) First() T { return l.items[0] }\n",
        );
        assert_eq!(names(&f), vec!["N", "Buf", "List", "First"]);
        assert_eq!(f.decls[1].kind, DeclKind::Type { shape: TypeShape::Named(None) });
        let DeclKind::Method { receiver, .. } = &f.decls[3].kind else {
            panic!("First should be a method");
        };
        assert_eq!(receiver.name.name, "List");
    }

    #[test]
    fn test_extract_imports_stops_early() {
        let src = "package a\nimport \"fmt\"\nimport (\n\"os\"\n)\nfunc F() {}\n";
        let tree = parse_go(Path::new("t.go"), src).unwrap();
        let f = extract_imports(tree.root_node(), src.as_bytes()).unwrap();
        assert_eq!(f.imports.len(), 2);
        assert!(f.decls.is_empty());
    }

    #[test]
    fn test_syntax_errors() {
        assert!(try_decls("package a\n\nx := 1\n").is_err());
        assert!(try_decls("func F() {}\n").is_err());
        assert!(try_decls("package a\n\nfunc F( {\n}\n").is_err());
    }
}
