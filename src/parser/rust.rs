use toml::{Table, Value};
use tracing::debug;

use super::{basename, parse_toml, FilePattern, ManifestParser, ParseOutput};
use crate::error::ParseError;
use crate::models::{DependencyRecord, Ecosystem, GitReference, GitSource, Scope};
use crate::version;

const SUPPORTED_FILES: &[FilePattern] = &[
    FilePattern::Exact("Cargo.toml"),
    FilePattern::Exact("Cargo.lock"),
];

const SECTIONS: [(&str, Scope); 3] = [
    ("dependencies", Scope::Runtime),
    ("dev-dependencies", Scope::Dev),
    ("build-dependencies", Scope::Build),
];

/// Parser for Rust projects.
///
/// `Cargo.toml` yields direct records from `[dependencies]`,
/// `[dev-dependencies]`, `[build-dependencies]` and their
/// `[target.'cfg'.*]` variants. `Cargo.lock` yields every `[[package]]`
/// that has a `source`; packages without one are workspace members.
pub struct CargoParser;

impl CargoParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CargoParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestParser for CargoParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Cargo
    }

    fn supported_files(&self) -> &'static [FilePattern] {
        SUPPORTED_FILES
    }

    fn validate_content(&self, content: &str) -> bool {
        parse_toml(content).is_ok()
    }

    fn parse(&self, content: &str, filename: &str) -> Result<ParseOutput, ParseError> {
        let doc = parse_toml(content)?;
        if basename(filename) == "Cargo.lock" {
            parse_cargo_lock(&doc, filename)
        } else {
            parse_cargo_toml(&doc, filename)
        }
    }
}

fn parse_cargo_toml(doc: &Table, filename: &str) -> Result<ParseOutput, ParseError> {
    let workspace_deps = doc
        .get("workspace")
        .and_then(|w| w.get("dependencies"))
        .and_then(Value::as_table);

    let mut out = ParseOutput::default();

    for (section, scope) in SECTIONS {
        if let Some(value) = doc.get(section) {
            let table = value
                .as_table()
                .ok_or_else(|| ParseError::schema(format!("[{section}] must be a table")))?;
            extract_section(table, scope, filename, workspace_deps, &mut out);
        }
    }

    if let Some(targets) = doc.get("target") {
        let targets = targets
            .as_table()
            .ok_or_else(|| ParseError::schema("[target] must be a table"))?;
        for (cfg, target) in targets {
            let Some(target) = target.as_table() else {
                out.skip(filename, cfg, "target entry is not a table");
                continue;
            };
            for (section, scope) in SECTIONS {
                match target.get(section).map(Value::as_table) {
                    Some(Some(table)) => {
                        extract_section(table, scope, filename, workspace_deps, &mut out)
                    }
                    Some(None) => out.skip(filename, cfg, "target section is not a table"),
                    None => {}
                }
            }
        }
    }

    Ok(out)
}

fn extract_section(
    table: &Table,
    scope: Scope,
    filename: &str,
    workspace_deps: Option<&Table>,
    out: &mut ParseOutput,
) {
    for (name, value) in table {
        match dependency_record(name, value, scope, filename, workspace_deps) {
            Ok(record) => out.push(record),
            Err(reason) => out.skip(filename, name, reason),
        }
    }
}

/// Build one record from a `name = "spec"` or `name = { ... }` entry.
fn dependency_record(
    name: &str,
    value: &Value,
    scope: Scope,
    filename: &str,
    workspace_deps: Option<&Table>,
) -> Result<DependencyRecord, &'static str> {
    let table = match value {
        Value::String(spec) => {
            return Ok(DependencyRecord::new(
                Ecosystem::Cargo,
                name,
                version::cargo(spec),
                scope,
                true,
                filename,
            ));
        }
        Value::Table(table) => table,
        _ => return Err("dependency must be a version string or a table"),
    };

    if table.get("workspace").and_then(Value::as_bool) == Some(true) {
        let inherited = workspace_deps
            .and_then(|ws| ws.get(name))
            .ok_or("inherited dependency is not declared in [workspace.dependencies]")?;
        return dependency_record(name, inherited, scope, filename, None);
    }

    let crate_name = table.get("package").and_then(Value::as_str).unwrap_or(name);
    let version = table.get("version").and_then(Value::as_str);
    let git = table.get("git").and_then(Value::as_str).map(|url| {
        let reference = ["rev", "branch", "tag"].into_iter().find_map(|key| {
            let value = table.get(key)?.as_str()?.to_string();
            Some(match key {
                "rev" => GitReference::Rev(value),
                "branch" => GitReference::Branch(value),
                _ => GitReference::Tag(value),
            })
        });
        GitSource {
            url: url.to_string(),
            reference,
        }
    });
    let path = table.get("path").and_then(Value::as_str);

    if version.is_none() && git.is_none() && path.is_none() {
        return Err("table has no version, git or path");
    }

    let mut record = DependencyRecord::new(
        Ecosystem::Cargo,
        crate_name,
        version.map(version::cargo).unwrap_or_default(),
        scope,
        true,
        filename,
    );
    record.git = git;
    record.path = path.map(str::to_string);
    Ok(record)
}

fn parse_cargo_lock(doc: &Table, filename: &str) -> Result<ParseOutput, ParseError> {
    let packages = doc
        .get("package")
        .ok_or_else(|| ParseError::schema("Cargo.lock has no [[package]] entries"))?
        .as_array()
        .ok_or_else(|| ParseError::schema("`package` must be an array of tables"))?;

    let mut out = ParseOutput::default();

    for (index, entry) in packages.iter().enumerate() {
        let Some(table) = entry.as_table() else {
            out.skip(filename, &format!("package[{index}]"), "entry is not a table");
            continue;
        };

        let name = table.get("name").and_then(Value::as_str);
        let Some(source) = table.get("source").and_then(Value::as_str) else {
            debug!(file = filename, package = name, "excluding workspace package");
            continue;
        };

        let (Some(name), Some(version)) = (name, table.get("version").and_then(Value::as_str))
        else {
            out.skip(filename, &format!("package[{index}]"), "missing name or version");
            continue;
        };

        let mut record =
            DependencyRecord::new(Ecosystem::Cargo, name, version.trim(), Scope::Runtime, false, filename);
        record.git = git_from_lock_source(source);
        out.push(record);
    }

    Ok(out)
}

/// `git+https://host/repo?branch=main#<sha>` → url + pinned commit.
fn git_from_lock_source(source: &str) -> Option<GitSource> {
    let rest = source.strip_prefix("git+")?;
    let (location, commit) = match rest.split_once('#') {
        Some((location, commit)) => (location, Some(commit)),
        None => (rest, None),
    };
    let (url, query) = match location.split_once('?') {
        Some((url, query)) => (url, Some(query)),
        None => (location, None),
    };

    let reference = match commit {
        Some(sha) => Some(GitReference::Rev(sha.to_string())),
        None => query.and_then(|q| {
            let (key, value) = q.split_once('=')?;
            match key {
                "rev" => Some(GitReference::Rev(value.to_string())),
                "branch" => Some(GitReference::Branch(value.to_string())),
                "tag" => Some(GitReference::Tag(value.to_string())),
                _ => None,
            }
        }),
    };

    Some(GitSource {
        url: url.to_string(),
        reference,
    })
}
