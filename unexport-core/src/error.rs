//! Typed error handling for unexport.
//!
//! Load and argument errors abort a run; scan errors are collected per
//! package and write errors per file, so callers need to match on them.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for unexport operations.
#[derive(Error, Debug)]
pub enum UnexportError {
    /// I/O error when reading/writing files
    #[error("I/O error at {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Syntax error when parsing Go source
    #[error("Parse error in {path}{}: {message}", location(.line, .column))]
    Parse {
        path: PathBuf,
        message: String,
        /// Line number (1-indexed) if available
        line: Option<usize>,
        /// Column number (1-indexed) if available
        column: Option<usize>,
    },

    /// A package could not be loaded or resolved
    #[error("Load error for {package}: {message}")]
    Load { package: String, message: String },

    /// Module/workspace structure errors
    #[error("Workspace error at {path}: {message}")]
    Workspace { path: PathBuf, message: String },

    /// Invalid argument provided
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Writing a rewritten file failed
    #[error("Write error at {path}: {message}")]
    Write { path: PathBuf, message: String },

    /// File changed on disk between load and write
    #[error("{path} was modified since it was loaded")]
    StaleFile { path: PathBuf },

    /// The configured printer rejected or failed on a file
    #[error("Printer failed on {path}: {message}")]
    Printer { path: PathBuf, message: String },
}

impl UnexportError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a parse error without location.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            line: None,
            column: None,
        }
    }

    /// Create a parse error with line/column info.
    pub fn parse_at(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            line: Some(line),
            column: Some(column),
        }
    }

    /// Create a load error for a package.
    pub fn load(package: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            package: package.into(),
            message: message.into(),
        }
    }

    /// Create a workspace error.
    pub fn workspace(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Workspace {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a write error.
    pub fn write(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Write {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a printer error.
    pub fn printer(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Printer {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if this error only affects one file or package, so the run can
    /// continue past it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Write { .. } | Self::StaleFile { .. } | Self::Printer { .. }
        )
    }

    /// Get the path associated with this error, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } => Some(path),
            Self::Parse { path, .. } => Some(path),
            Self::Workspace { path, .. } => Some(path),
            Self::Write { path, .. } => Some(path),
            Self::StaleFile { path } => Some(path),
            Self::Printer { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// `:line:column`, `:line`, or nothing.
fn location(line: &Option<usize>, column: &Option<usize>) -> String {
    match (line, column) {
        (Some(line), Some(column)) => format!(":{}:{}", line, column),
        (Some(line), None) => format!(":{}", line),
        _ => String::new(),
    }
}

/// Convenience type alias for unexport results.
pub type UnexportResult<T> = Result<T, UnexportError>;

/// Extension trait for converting std::io::Error with path context.
pub trait IoResultExt<T> {
    /// Add path context to an I/O error.
    fn with_path(self, path: impl Into<PathBuf>) -> UnexportResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> UnexportResult<T> {
        self.map_err(|e| UnexportError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error() {
        let err = UnexportError::io(
            PathBuf::from("/test/a.go"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        );
        assert!(matches!(err, UnexportError::Io { .. }));
        assert_eq!(err.path(), Some(&PathBuf::from("/test/a.go")));
        assert!(err.to_string().contains("/test/a.go"));
    }

    #[test]
    fn test_parse_error_with_location() {
        let err = UnexportError::parse_at("/src/a.go", "unterminated string", 10, 5);
        if let UnexportError::Parse { line, column, .. } = &err {
            assert_eq!(*line, Some(10));
            assert_eq!(*column, Some(5));
        } else {
            panic!("Expected Parse error");
        }
        assert_eq!(
            err.to_string(),
            "Parse error in /src/a.go:10:5: unterminated string"
        );
        assert_eq!(
            UnexportError::parse("/src/a.go", "bad build line").to_string(),
            "Parse error in /src/a.go: bad build line"
        );
    }

    #[test]
    fn test_is_recoverable() {
        assert!(UnexportError::write("/a.go", "denied").is_recoverable());
        assert!(UnexportError::StaleFile { path: "/a.go".into() }.is_recoverable());
        assert!(!UnexportError::load("example.com/a", "broken").is_recoverable());
        assert!(!UnexportError::invalid_argument("no package").is_recoverable());
    }

    #[test]
    fn test_load_error_message() {
        let err = UnexportError::load("example.com/a", "undeclared name: a.Missing");
        assert_eq!(
            err.to_string(),
            "Load error for example.com/a: undeclared name: a.Missing"
        );
        assert!(err.path().is_none());
    }

    #[test]
    fn test_io_result_ext() {
        let result: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        let mapped = result.with_path("/missing/a.go");
        assert!(matches!(mapped, Err(UnexportError::Io { .. })));
    }
}
