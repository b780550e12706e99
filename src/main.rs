//! `sbom-inventory`: scan dependency manifests and emit a normalized SBOM.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]).
//! 2. Load config ([`config::load_config`]) and start logging ([`logging`]).
//! 3. Build a parser registry for the enabled ecosystems.
//! 4. Walk each path and read the files a parser claims ([`detector`]).
//! 5. Parse, merge and sort ([`sbom_inventory::SbomGenerator`]).
//! 6. Render the requested report ([`report`]).
//! 7. Exit `1` when `--fail-on-error` is set and any file failed.

mod cli;
mod config;
mod detector;
mod logging;
mod report;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use sbom_inventory::{Ecosystem, ParserRegistry, SbomGenerator};

use cli::{Cli, ReportFormat};
use config::load_config;
use detector::{collect_files, ScanInput};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config is looked up relative to the first scanned path
    let project_root = project_root(&cli.paths);
    let config = load_config(&project_root, cli.config.as_deref())?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    logging::init_tracing(level, config.log.format)?;

    let excluded: Vec<Ecosystem> = cli.exclude_lang.iter().map(Into::into).collect();
    let ecosystems = config.enabled_ecosystems(&excluded);
    if ecosystems.is_empty() {
        bail!("every ecosystem is disabled; nothing to scan");
    }
    let registry = ParserRegistry::with_ecosystems(&ecosystems);

    let mut input = ScanInput::default();
    let several_roots = cli.paths.len() > 1;
    for path in &cli.paths {
        let collected = collect_files(path, &registry, &config.scan)?;
        // File roots already carry their own path
        if several_roots && path.is_dir() {
            input.extend(collected.with_prefix(&path.to_string_lossy()));
        } else {
            input.extend(collected);
        }
    }

    if input.files.is_empty() && input.errors.is_empty() {
        let scanned: Vec<String> = cli.paths.iter().map(|p| p.display().to_string()).collect();
        eprintln!("No supported manifests found in {}", scanned.join(", "));
        std::process::exit(1);
    }
    info!(files = input.files.len(), ?ecosystems, "collected manifests");

    let generator = SbomGenerator::new(registry).with_parallel(config.scan.parallel);
    let mut result = generator.generate(&input.files);
    result.errors.extend(input.errors);

    if cli.output.is_some() {
        colored::control::set_override(false);
    }
    let rendered = match cli.report {
        ReportFormat::Terminal => {
            report::terminal::render(&result, &cli.paths, cli.verbose, cli.quiet)?
        }
        ReportFormat::Json => report::json::render(&result)?,
        ReportFormat::Cyclonedx => report::cyclonedx::render(&result)?,
    };

    match &cli.output {
        Some(path) => write_report(path, &rendered)?,
        None => println!("{}", rendered.trim_end()),
    }

    if cli.fail_on_error && result.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

fn project_root(paths: &[PathBuf]) -> PathBuf {
    let first = paths.first().cloned().unwrap_or_else(|| PathBuf::from("."));
    let first = first.canonicalize().unwrap_or(first);
    if first.is_file() {
        first
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        first
    }
}

fn write_report(path: &Path, rendered: &str) -> Result<()> {
    std::fs::write(path, rendered)
        .with_context(|| format!("writing report to {}", path.display()))?;
    eprintln!("Report written to {}", path.display());
    Ok(())
}
