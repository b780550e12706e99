use std::fmt::Write;
use std::path::PathBuf;

use anyhow::Result;
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use sbom_inventory::{DependencyRecord, Ecosystem, SbomResult, Scope};

/// Render a colored terminal report.
pub fn render(
    result: &SbomResult,
    paths: &[PathBuf],
    verbose: bool,
    quiet: bool,
) -> Result<String> {
    let mut out = String::new();
    let total = result.records.len();
    let direct = result.records.iter().filter(|r| r.direct).count();
    let error_count = result.errors.len();

    if quiet {
        writeln!(
            out,
            "Records: {}  Direct: {}  Errors: {}  Skipped: {}",
            total,
            direct.to_string().green(),
            highlight(error_count, true),
            highlight(result.skipped_entries, false),
        )?;
        return Ok(out);
    }

    let scanned: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    writeln!(
        out,
        "\n {} v{}",
        "sbom-inventory".bold(),
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(out, " Scanning: {}\n", scanned.join(", "))?;

    // Summary box
    writeln!(out, " ┌────────────────────────────────────────────────────┐")?;
    writeln!(out, " │  {:<48} │", "SUMMARY".bold())?;
    writeln!(out, " │  {:<48} │", format!("Records            : {total:>5}"))?;
    writeln!(out, " │  {:<48} │", format!("Direct             : {direct:>5}"))?;
    writeln!(
        out,
        " │  {:<48} │",
        format!("Transitive         : {:>5}", total - direct)
    )?;
    writeln!(
        out,
        " │  {:<48} │",
        format!("Skipped entries    : {:>5}", result.skipped_entries)
    )?;
    let errors_line = format!("Files with errors  : {error_count:>5}");
    if error_count > 0 {
        writeln!(out, " │  {:<48} │", errors_line.red())?;
    } else {
        writeln!(out, " │  {:<48} │", errors_line)?;
    }
    writeln!(out, " └────────────────────────────────────────────────────┘\n")?;

    if total > 0 {
        writeln!(out, "{}", ecosystem_table(result))?;
        writeln!(out)?;
    }

    if verbose {
        for ecosystem in Ecosystem::ALL {
            let records: Vec<&DependencyRecord> = result
                .records
                .iter()
                .filter(|r| r.ecosystem == ecosystem)
                .collect();
            if records.is_empty() {
                continue;
            }
            writeln!(out, " {} {} dependencies:\n", "[DEPS]".cyan().bold(), ecosystem)?;
            writeln!(out, "{}", record_table(&records))?;
            writeln!(out)?;
        }
    }

    if error_count > 0 {
        writeln!(out, " {} Files that could not be parsed:\n", "[ERROR]".red().bold())?;
        writeln!(out, "{}", error_table(result))?;
        writeln!(out)?;
    }

    Ok(out)
}

/// Non-zero counts stand out: red for errors, yellow otherwise.
fn highlight(count: usize, is_error: bool) -> ColoredString {
    let text = count.to_string();
    match (count, is_error) {
        (0, _) => text.normal(),
        (_, true) => text.red(),
        (_, false) => text.yellow(),
    }
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|title| Cell::new(title).add_attribute(Attribute::Bold))
        .collect()
}

fn new_table(titles: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(titles));
    table
}

fn ecosystem_table(result: &SbomResult) -> Table {
    let mut table = new_table(&["Ecosystem", "Records", "Direct", "Runtime", "Dev", "Build", "Test"]);

    for ecosystem in Ecosystem::ALL {
        let records: Vec<&DependencyRecord> = result
            .records
            .iter()
            .filter(|r| r.ecosystem == ecosystem)
            .collect();
        if records.is_empty() {
            continue;
        }
        let with_scope = |scope| records.iter().filter(|r| r.has_scope(scope)).count();
        let counts = [
            records.len(),
            records.iter().filter(|r| r.direct).count(),
            with_scope(Scope::Runtime),
            with_scope(Scope::Dev),
            with_scope(Scope::Build),
            with_scope(Scope::Test),
        ];

        let mut row = vec![Cell::new(ecosystem.to_string()).fg(Color::Cyan)];
        row.extend(
            counts
                .iter()
                .map(|count| Cell::new(count).set_alignment(CellAlignment::Right)),
        );
        table.add_row(row);
    }

    table
}

fn record_table(records: &[&DependencyRecord]) -> Table {
    let mut table = new_table(&["Name", "Version", "Scope", "Direct", "Source"]);

    for record in records {
        let scopes: Vec<String> = record.scope.iter().map(Scope::to_string).collect();
        let version = if record.version.is_empty() {
            Cell::new("-").fg(Color::DarkGrey)
        } else {
            Cell::new(&record.version)
        };
        let (direct_str, direct_color) = if record.direct {
            ("✓ direct", Color::Green)
        } else {
            ("lock", Color::DarkGrey)
        };
        let source = match (&record.git, &record.path) {
            (Some(git), _) => format!("{} (git {})", record.source_file, git.url),
            (None, Some(path)) => format!("{} (path {path})", record.source_file),
            (None, None) => record.source_file.clone(),
        };

        table.add_row(vec![
            Cell::new(&record.name),
            version,
            Cell::new(scopes.join(", ")),
            Cell::new(direct_str)
                .fg(direct_color)
                .set_alignment(CellAlignment::Center),
            Cell::new(source),
        ]);
    }

    table
}

fn error_table(result: &SbomResult) -> Table {
    let mut table = new_table(&["File", "Kind", "Message"]);

    for error in &result.errors {
        table.add_row(vec![
            Cell::new(&error.source_file),
            Cell::new(error.error.kind()).fg(Color::Red),
            Cell::new(error.error.to_string()),
        ]);
    }

    table
}
