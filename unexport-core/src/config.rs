//! Configuration loading from unexport.toml.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

/// File name looked up at the module root.
pub const CONFIG_FILE: &str = "unexport.toml";

/// Main configuration structure for unexport.toml.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct UnexportConfig {
    /// Extra directory names to prune while scanning the module.
    pub exclude: Option<Vec<String>>,
    /// Build tags that are always active.
    pub tags: Option<Vec<String>>,
    /// Identifier names that must never be unexported.
    pub protected: Option<Vec<String>>,
    /// Keep struct fields that carry a tag (`json:"..."` and friends).
    #[serde(default)]
    pub protect_tagged_fields: bool,
    /// Output configuration.
    pub output: Option<OutputConfig>,
    /// Formatter applied to rewritten files.
    pub printer: Option<PrinterConfig>,
}

/// Output format configuration.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct OutputConfig {
    /// Output format: "plain" or "json".
    pub format: Option<String>,
}

/// External formatter configuration.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PrinterConfig {
    /// Program and arguments; the file is fed on stdin, output read from stdout.
    pub command: Vec<String>,
}

impl UnexportConfig {
    pub fn excludes(&self) -> &[String] {
        self.exclude.as_deref().unwrap_or_default()
    }

    pub fn tags(&self) -> &[String] {
        self.tags.as_deref().unwrap_or_default()
    }

    pub fn protected(&self) -> &[String] {
        self.protected.as_deref().unwrap_or_default()
    }

    /// True when the file asks for JSON output.
    pub fn wants_json(&self) -> bool {
        self.output
            .as_ref()
            .and_then(|o| o.format.as_deref())
            .is_some_and(|f| f.eq_ignore_ascii_case("json"))
    }

    /// Formatter command, if one is configured and non-empty.
    pub fn printer_command(&self) -> Option<&[String]> {
        self.printer
            .as_ref()
            .map(|p| p.command.as_slice())
            .filter(|c| !c.is_empty())
    }
}

/// Loads configuration from unexport.toml if it exists.
pub fn load_config(root: &Path) -> Result<Option<UnexportConfig>> {
    let path = root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let cfg = toml::from_str(&content).context("Invalid unexport.toml")?;
    Ok(Some(cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let cfg: UnexportConfig = toml::from_str(
            r#"
exclude = ["third_party"]
tags = ["integration"]
protected = ["String", "Error"]
protect_tagged_fields = true

[output]
format = "JSON"

[printer]
command = ["gofmt"]
"#,
        )
        .unwrap();

        assert_eq!(cfg.excludes(), ["third_party".to_string()]);
        assert_eq!(cfg.tags(), ["integration".to_string()]);
        assert_eq!(cfg.protected().len(), 2);
        assert!(cfg.protect_tagged_fields);
        assert!(cfg.wants_json());
        assert_eq!(cfg.printer_command(), Some(&["gofmt".to_string()][..]));
    }

    #[test]
    fn test_defaults() {
        let cfg = UnexportConfig::default();
        assert!(cfg.excludes().is_empty());
        assert!(cfg.tags().is_empty());
        assert!(!cfg.protect_tagged_fields);
        assert!(!cfg.wants_json());
        assert!(cfg.printer_command().is_none());
    }

    #[test]
    fn test_empty_printer_command_is_ignored() {
        let cfg: UnexportConfig = toml::from_str("[printer]\ncommand = []\n").unwrap();
        assert!(cfg.printer_command().is_none());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let res: Result<UnexportConfig, _> = toml::from_str("ignore = [\"x\"]\n");
        assert!(res.is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = std::env::temp_dir().join("unexport_config_missing_test");
        fs::create_dir_all(&dir).unwrap();
        fs::remove_file(dir.join(CONFIG_FILE)).ok();
        assert!(load_config(&dir).unwrap().is_none());
    }
}
