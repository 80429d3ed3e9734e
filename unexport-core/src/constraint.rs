//! Build constraint evaluation for Go files.
//!
//! A file takes part in a load only when its name suffixes (`_linux.go`,
//! `_arm64.go`, `_windows_amd64.go`) and its header constraints
//! (`//go:build` or the legacy `// +build` lines) are satisfied by the
//! active tag set.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "arm", "arm64", "loong64", "mips", "mipsle", "mips64", "mips64le", "ppc64",
    "ppc64le", "riscv64", "s390x", "sparc64", "wasm",
];

const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux",
    "netbsd", "openbsd", "solaris",
];

fn go_build_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    // SAFETY: hardcoded pattern.
    REGEX.get_or_init(|| Regex::new(r"^//go:build\s+(.+)$").expect("Hardcoded regex pattern is valid"))
}

fn plus_build_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    // SAFETY: hardcoded pattern.
    REGEX.get_or_init(|| Regex::new(r"^//\s*\+build\s+(.+)$").expect("Hardcoded regex pattern is valid"))
}

/// The set of satisfied build tags for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    goos: String,
    goarch: String,
    tags: BTreeSet<String>,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl BuildContext {
    /// Build context for the host platform plus the given tags.
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::for_target(host_os(), host_arch(), tags)
    }

    /// Build context for an explicit GOOS/GOARCH pair.
    pub fn for_target<I, S>(goos: &str, goarch: &str, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            goos: goos.to_string(),
            goarch: goarch.to_string(),
            tags: tags
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        }
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Whether a single tag holds in this context.
    pub fn has_tag(&self, tag: &str) -> bool {
        tag == self.goos
            || tag == self.goarch
            || tag == "gc"
            || (tag == "unix" && UNIX_OS.contains(&self.goos.as_str()))
            || tag.starts_with("go1.")
            || self.tags.contains(tag)
    }

    /// Whether the file name's `_GOOS` / `_GOARCH` suffixes match.
    pub fn matches_file_name(&self, file_name: &str) -> bool {
        if file_name.starts_with('_') || file_name.starts_with('.') {
            return false;
        }
        let stem = file_name.strip_suffix(".go").unwrap_or(file_name);
        let stem = stem.strip_suffix("_test").unwrap_or(stem);
        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() < 2 {
            return true;
        }

        let last = parts[parts.len() - 1];
        let prev = parts[parts.len() - 2];
        if KNOWN_ARCH.contains(&last) {
            if parts.len() >= 3 && KNOWN_OS.contains(&prev) {
                return self.has_tag(prev) && self.has_tag(last);
            }
            return self.has_tag(last);
        }
        if KNOWN_OS.contains(&last) {
            return self.has_tag(last);
        }
        true
    }

    /// Whether a file with this name and content takes part in the build.
    pub fn matches_file(&self, file_name: &str, content: &str) -> Result<bool, String> {
        if !self.matches_file_name(file_name) {
            return Ok(false);
        }
        self.matches_header(content)
    }

    /// Evaluates the constraint comments that precede the package clause.
    pub fn matches_header(&self, content: &str) -> Result<bool, String> {
        let mut plus_lines = Vec::new();
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !trimmed.starts_with("//") {
                break;
            }
            if let Some(caps) = go_build_regex().captures(trimmed) {
                // //go:build supersedes any +build lines.
                return self.eval_expr(&caps[1]);
            }
            if let Some(caps) = plus_build_regex().captures(trimmed) {
                plus_lines.push(caps[1].to_string());
            }
        }

        Ok(plus_lines.iter().all(|l| self.eval_plus_line(l)))
    }

    /// `// +build a,b c` means (a AND b) OR c.
    fn eval_plus_line(&self, line: &str) -> bool {
        line.split_whitespace().any(|option| {
            option.split(',').all(|term| match term.strip_prefix('!') {
                Some(neg) => !self.has_tag(neg),
                None => self.has_tag(term),
            })
        })
    }

    /// Evaluates a `//go:build` boolean expression.
    pub fn eval_expr(&self, expr: &str) -> Result<bool, String> {
        let tokens = tokenize_expr(expr)?;
        let mut parser = ExprParser {
            tokens: &tokens,
            pos: 0,
            ctx: self,
        };
        let value = parser.or()?;
        if parser.pos != tokens.len() {
            return Err(format!("unexpected token in build constraint: {}", expr));
        }
        Ok(value)
    }
}

fn host_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64",
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ExprToken {
    Tag(String),
    Not,
    And,
    Or,
    Open,
    Close,
}

fn tokenize_expr(expr: &str) -> Result<Vec<ExprToken>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '!' => {
                tokens.push(ExprToken::Not);
                i += 1;
            }
            '(' => {
                tokens.push(ExprToken::Open);
                i += 1;
            }
            ')' => {
                tokens.push(ExprToken::Close);
                i += 1;
            }
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(format!("invalid operator in build constraint: {}", expr));
                }
                tokens.push(if c == '&' { ExprToken::And } else { ExprToken::Or });
                i += 2;
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(ExprToken::Tag(chars[start..i].iter().collect()));
            }
            _ => return Err(format!("invalid character {:?} in build constraint", c)),
        }
    }
    Ok(tokens)
}

struct ExprParser<'a> {
    tokens: &'a [ExprToken],
    pos: usize,
    ctx: &'a BuildContext,
}

impl ExprParser<'_> {
    fn or(&mut self) -> Result<bool, String> {
        let mut value = self.and()?;
        while self.tokens.get(self.pos) == Some(&ExprToken::Or) {
            self.pos += 1;
            let rhs = self.and()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn and(&mut self) -> Result<bool, String> {
        let mut value = self.not()?;
        while self.tokens.get(self.pos) == Some(&ExprToken::And) {
            self.pos += 1;
            let rhs = self.not()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn not(&mut self) -> Result<bool, String> {
        match self.tokens.get(self.pos) {
            Some(ExprToken::Not) => {
                self.pos += 1;
                Ok(!self.not()?)
            }
            Some(ExprToken::Open) => {
                self.pos += 1;
                let value = self.or()?;
                if self.tokens.get(self.pos) != Some(&ExprToken::Close) {
                    return Err("missing ) in build constraint".to_string());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(ExprToken::Tag(tag)) => {
                self.pos += 1;
                Ok(self.ctx.has_tag(tag))
            }
            _ => Err("incomplete build constraint".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux(tags: &[&str]) -> BuildContext {
        BuildContext::for_target("linux", "amd64", tags.iter().copied())
    }

    #[test]
    fn test_file_name_suffixes() {
        let ctx = linux(&[]);
        assert!(ctx.matches_file_name("a.go"));
        assert!(ctx.matches_file_name("a_linux.go"));
        assert!(ctx.matches_file_name("a_linux_amd64.go"));
        assert!(ctx.matches_file_name("a_amd64_test.go"));
        assert!(!ctx.matches_file_name("a_windows.go"));
        assert!(!ctx.matches_file_name("a_linux_arm64.go"));
        assert!(!ctx.matches_file_name("_skip.go"));
        // A lone OS name is not a suffix.
        assert!(ctx.matches_file_name("linux.go"));
    }

    #[test]
    fn test_go_build_expression() {
        let ctx = linux(&["integration"]);
        assert_eq!(ctx.eval_expr("linux && amd64"), Ok(true));
        assert_eq!(ctx.eval_expr("windows || (integration && !race)"), Ok(true));
        assert_eq!(ctx.eval_expr("!integration"), Ok(false));
        assert_eq!(ctx.eval_expr("unix"), Ok(true));
        assert!(ctx.eval_expr("linux &").is_err());
        assert!(ctx.eval_expr("(linux").is_err());
    }

    #[test]
    fn test_header_go_build_wins() {
        let ctx = linux(&[]);
        let src = "//go:build ignore\n// +build linux\n\npackage a\n";
        assert_eq!(ctx.matches_header(src), Ok(false));
    }

    #[test]
    fn test_header_plus_build_lines() {
        let ctx = linux(&["foo"]);
        assert_eq!(ctx.matches_header("// +build darwin foo,linux\n\npackage a\n"), Ok(true));
        assert_eq!(
            ctx.matches_header("// +build linux\n// +build !foo\n\npackage a\n"),
            Ok(false)
        );
    }

    #[test]
    fn test_header_stops_at_package_clause() {
        let ctx = linux(&[]);
        let src = "package a\n\n//go:build ignore\n";
        assert_eq!(ctx.matches_header(src), Ok(true));
    }

    #[test]
    fn test_matches_file_combines_name_and_header() {
        let ctx = linux(&[]);
        assert_eq!(ctx.matches_file("a_windows.go", "package a\n"), Ok(false));
        assert_eq!(ctx.matches_file("a.go", "//go:build linux\n\npackage a\n"), Ok(true));
    }
}
