//! unexport CLI - unexport Go identifiers nothing outside their package uses.
//!
//! Features:
//! - Module root discovery from any directory inside the module
//! - Two-phase load bounded by the reverse import graph
//! - Rayon-powered parallel parsing
//! - Dry-run mode and optional external formatter

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::Path;

use unexport_core::{
    find_module_root, init_logging, load_config, print_json, print_plain, Unexport,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Unexport Go identifiers that are unused outside their package")]
pub struct Cli {
    /// Import path of the target package
    #[arg(long, default_value = "")]
    package: String,

    /// Comma-separated identifiers to consider (default: all exported)
    #[arg(long, value_delimiter = ',')]
    identifier: Vec<String>,

    /// Compute and report without writing files
    #[arg(long)]
    dryrun: bool,

    /// Log affected packages and the safe/unsafe partition
    #[arg(long)]
    verbose: bool,

    /// Build tags, space or comma separated
    #[arg(long, default_value = "")]
    tags: String,

    /// Any directory inside the Go module
    #[arg(long, default_value = ".")]
    root: String,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Emit log lines as JSON objects
    #[arg(long)]
    log_json: bool,
}

/// Splits a `--tags` value on spaces and commas.
fn split_tags(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn main() -> Result<()> {
    // Global panic guard
    std::panic::set_hook(Box::new(|info| {
        eprintln!("[PANIC] unexport internal error: {}", info);
        eprintln!("[PANIC] No further files will be written.");
    }));

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let package = cli.package.trim();
    if package.is_empty() {
        return Err(anyhow!("--package is required"));
    }

    let input_path = Path::new(&cli.root);
    let module_root = find_module_root(input_path)
        .with_context(|| format!("Failed to find go.mod from: {}", cli.root))?;

    let config = load_config(&module_root)?.unwrap_or_default();
    let json = cli.json || config.wants_json();

    let report = Unexport::new(&module_root, package)
        .identifiers(cli.identifier.iter().map(|s| s.trim()).filter(|s| !s.is_empty()))
        .tags(split_tags(&cli.tags))
        .dry_run(cli.dryrun)
        .with_config(&config)
        .run()?;

    if json {
        print_json(&report);
    } else {
        print_plain(&report);
    }

    if report.has_errors() {
        return Err(anyhow!("failed to rewrite {} file(s)", report.errors.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_tags() {
        assert_eq!(split_tags("a b,c  ,d"), vec!["a", "b", "c", "d"]);
        assert!(split_tags("").is_empty());
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from([
            "unexport",
            "--package",
            "example.com/m/a",
            "--identifier",
            "Foo,Bar",
            "--dryrun",
            "--tags",
            "integration linux",
        ]);
        assert_eq!(cli.package, "example.com/m/a");
        assert_eq!(cli.identifier, vec!["Foo", "Bar"]);
        assert!(cli.dryrun);
        assert!(!cli.json);
        assert_eq!(cli.root, ".");
        assert_eq!(split_tags(&cli.tags), vec!["integration", "linux"]);
    }

    #[test]
    fn test_package_defaults_to_empty() {
        let cli = Cli::parse_from(["unexport"]);
        assert!(cli.package.is_empty());
        assert!(cli.identifier.is_empty());
    }
}
