use std::sync::LazyLock;

use regex::Regex;
use toml::{Table, Value};

use super::{basename, ensure_not_empty, parse_toml, FilePattern, ManifestParser, ParseOutput};
use crate::error::ParseError;
use crate::models::{DependencyRecord, Ecosystem, GitReference, GitSource, Scope};
use crate::version;

const SUPPORTED_FILES: &[FilePattern] = &[
    FilePattern::Exact("requirements.txt"),
    FilePattern::Exact("setup.py"),
    FilePattern::Exact("pyproject.toml"),
    FilePattern::Exact("Pipfile"),
];

/// Name, optional `[extras]`, and everything after them.
static REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(\[[^\]]*\])?\s*(.*)$")
        .expect("static regex")
});

static NAME_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_.]+").expect("static regex"));

static SETUP_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsetup\s*\(").expect("static regex"));

/// `install_requires=[...]` and `tests_require=[...]`. Brackets inside
/// string literals (`"requests[security]"`) do not close the list.
static SETUP_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(install_requires|tests_require)\s*=\s*\[((?:"[^"]*"|'[^']*'|[^\]"'])*)\]"#)
        .expect("static regex")
});

static SETUP_EXTRAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bextras_require\s*=\s*\{((?:"[^"]*"|'[^']*'|[^}"'])*)\}"#)
        .expect("static regex")
});

static LIST_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[((?:"[^"]*"|'[^']*'|[^\]"'])*)\]"#).expect("static regex")
});

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]*)"|'([^']*)'"#).expect("static regex"));

/// Parser for Python projects.
///
/// Handles pip requirement files, setuptools `setup.py`, PEP 621 / Poetry
/// `pyproject.toml` and Pipenv `Pipfile`. Package names are normalized per
/// PEP 503 so `Flask_SQLAlchemy` and `flask-sqlalchemy` are one package.
pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestParser for PythonParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pypi
    }

    fn supported_files(&self) -> &'static [FilePattern] {
        SUPPORTED_FILES
    }

    fn parse(&self, content: &str, filename: &str) -> Result<ParseOutput, ParseError> {
        ensure_not_empty(content)?;
        match basename(filename) {
            "requirements.txt" => Ok(parse_requirements_txt(content, filename)),
            "setup.py" => parse_setup_py(content, filename),
            "pyproject.toml" => parse_pyproject_toml(&parse_toml(content)?, filename),
            "Pipfile" => parse_pipfile(&parse_toml(content)?, filename),
            _ => Err(ParseError::UnsupportedFile),
        }
    }
}

/// PEP 503 name normalization.
pub fn normalize_name(name: &str) -> String {
    NAME_SEPARATORS.replace_all(name.trim(), "-").to_lowercase()
}

/// One PEP 508 requirement with extras and environment markers dropped.
#[derive(Debug, PartialEq)]
struct Requirement {
    name: String,
    version: String,
    git: Option<GitSource>,
    path: Option<String>,
}

impl Requirement {
    fn into_record(self, scope: Scope, filename: &str) -> DependencyRecord {
        let mut record =
            DependencyRecord::new(Ecosystem::Pypi, self.name, self.version, scope, true, filename);
        record.git = self.git;
        record.path = self.path;
        record
    }
}

fn parse_requirement(spec: &str) -> Result<Requirement, &'static str> {
    let spec = spec.split_once(';').map_or(spec, |(requirement, _marker)| requirement);
    let caps = REQUIREMENT.captures(spec).ok_or("not a PEP 508 requirement")?;
    let name = normalize_name(&caps[1]);
    let rest = caps.get(3).map_or("", |m| m.as_str()).trim();

    let mut requirement = Requirement {
        name,
        version: String::new(),
        git: None,
        path: None,
    };

    if let Some(url) = rest.strip_prefix('@') {
        let url = url.trim();
        if let Some(repo) = url.strip_prefix("git+") {
            requirement.git = Some(git_source(repo));
        } else if let Some(path) = url.strip_prefix("file://") {
            requirement.path = Some(path.to_string());
        } else {
            return Err("direct URL reference carries no version");
        }
        return Ok(requirement);
    }

    let constraint = rest.trim_start_matches('(').trim_end_matches(')').trim();
    if !constraint.is_empty() && !constraint.starts_with(['=', '<', '>', '!', '~', '^']) {
        return Err("not a PEP 508 requirement");
    }
    requirement.version = version::pypi(constraint);
    Ok(requirement)
}

/// `https://host/repo.git@v1.0#egg=name` → url + reference.
fn git_source(url: &str) -> GitSource {
    let url = url.split_once('#').map_or(url, |(location, _fragment)| location);
    match url.rsplit_once('@') {
        Some((location, reference)) if !reference.contains('/') && location.contains("://") => {
            GitSource::new(location).with_reference(GitReference::Rev(reference.to_string()))
        }
        _ => GitSource::new(url),
    }
}

/// `#egg=name` fragment of an editable or VCS requirement.
fn egg_name(url: &str) -> Option<String> {
    let (_, fragment) = url.split_once('#')?;
    fragment
        .split('&')
        .find_map(|part| part.strip_prefix("egg="))
        .filter(|name| !name.is_empty())
        .map(normalize_name)
}

/// Parse `requirements.txt`. Option lines (`-r`, `--index-url`, ...) are ignored.
fn parse_requirements_txt(content: &str, filename: &str) -> ParseOutput {
    let mut out = ParseOutput::default();

    for line in logical_lines(content) {
        let line = strip_inline_comment(&line).trim().to_string();
        if line.is_empty() {
            continue;
        }

        let editable = line
            .strip_prefix("--editable")
            .or_else(|| line.strip_prefix("-e"))
            .map(|rest| rest.trim_start_matches('=').trim());
        if let Some(target) = editable {
            match editable_record(target, filename) {
                Ok(record) => out.push(record),
                Err(reason) => out.skip(filename, target, reason),
            }
            continue;
        }
        if line.starts_with('-') {
            continue;
        }

        match parse_requirement(&line) {
            Ok(requirement) => out.push(requirement.into_record(Scope::Runtime, filename)),
            Err(reason) => out.skip(filename, &line, reason),
        }
    }

    out
}

fn editable_record(target: &str, filename: &str) -> Result<DependencyRecord, &'static str> {
    let name = egg_name(target).ok_or("editable requirement has no #egg= name")?;
    let mut record =
        DependencyRecord::new(Ecosystem::Pypi, name, "", Scope::Runtime, true, filename);
    if let Some(repo) = target.strip_prefix("git+") {
        record.git = Some(git_source(repo));
    } else {
        let location = target.split_once('#').map_or(target, |(location, _)| location);
        record.path = Some(location.trim_start_matches("file://").to_string());
    }
    Ok(record)
}

/// Join `\`-continued lines.
fn logical_lines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for raw in content.lines() {
        match raw.trim_end().strip_suffix('\\') {
            Some(continued) => {
                current.push_str(continued);
                current.push(' ');
            }
            None => {
                current.push_str(raw);
                lines.push(std::mem::take(&mut current));
            }
        }
    }
    if !current.trim().is_empty() {
        lines.push(current);
    }
    lines
}

fn strip_inline_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    match line.find(" #").or_else(|| line.find("\t#")) {
        Some(index) => &line[..index],
        None => line,
    }
}

/// Parse the literal lists passed to `setup()`. Values built at runtime are
/// invisible to a static scan.
fn parse_setup_py(content: &str, filename: &str) -> Result<ParseOutput, ParseError> {
    if !SETUP_CALL.is_match(content) {
        return Err(ParseError::schema("setup.py has no setup() call"));
    }

    let mut out = ParseOutput::default();

    for caps in SETUP_LIST.captures_iter(content) {
        let scope = if &caps[1] == "install_requires" {
            Scope::Runtime
        } else {
            Scope::Dev
        };
        push_quoted_requirements(&caps[2], scope, filename, &mut out);
    }

    if let Some(extras) = SETUP_EXTRAS.captures(content) {
        for list in LIST_LITERAL.captures_iter(&extras[1]) {
            push_quoted_requirements(&list[1], Scope::Dev, filename, &mut out);
        }
    }

    Ok(out)
}

fn push_quoted_requirements(list: &str, scope: Scope, filename: &str, out: &mut ParseOutput) {
    for quoted in QUOTED.captures_iter(list) {
        let Some(text) = quoted.get(1).or_else(|| quoted.get(2)) else {
            continue;
        };
        let text = text.as_str();
        if text.trim().is_empty() {
            out.skip(filename, text, "empty requirement");
            continue;
        }
        match parse_requirement(text) {
            Ok(requirement) => out.push(requirement.into_record(scope, filename)),
            Err(reason) => out.skip(filename, text, reason),
        }
    }
}

fn parse_pyproject_toml(doc: &Table, filename: &str) -> Result<ParseOutput, ParseError> {
    let mut out = ParseOutput::default();

    if let Some(project) = doc.get("project") {
        let project = project
            .as_table()
            .ok_or_else(|| ParseError::schema("[project] must be a table"))?;

        if let Some(dependencies) = project.get("dependencies") {
            let dependencies = dependencies
                .as_array()
                .ok_or_else(|| ParseError::schema("project.dependencies must be an array"))?;
            push_requirement_array(dependencies, Scope::Runtime, filename, &mut out);
        }

        if let Some(optional) = project.get("optional-dependencies") {
            let optional = optional.as_table().ok_or_else(|| {
                ParseError::schema("project.optional-dependencies must be a table")
            })?;
            for (extra, requirements) in optional {
                match requirements.as_array() {
                    Some(requirements) => {
                        push_requirement_array(requirements, Scope::Dev, filename, &mut out)
                    }
                    None => out.skip(filename, extra, "optional dependency group is not an array"),
                }
            }
        }
    }

    if let Some(groups) = doc.get("dependency-groups") {
        let groups = groups
            .as_table()
            .ok_or_else(|| ParseError::schema("[dependency-groups] must be a table"))?;
        for (group, requirements) in groups {
            match requirements.as_array() {
                Some(requirements) => {
                    push_requirement_array(requirements, Scope::Dev, filename, &mut out)
                }
                None => out.skip(filename, group, "dependency group is not an array"),
            }
        }
    }

    if let Some(poetry) = doc.get("tool").and_then(|tool| tool.get("poetry")) {
        let poetry = poetry
            .as_table()
            .ok_or_else(|| ParseError::schema("[tool.poetry] must be a table"))?;
        parse_poetry(poetry, filename, &mut out)?;
    }

    Ok(out)
}

fn push_requirement_array(items: &[Value], scope: Scope, filename: &str, out: &mut ParseOutput) {
    for item in items {
        match item {
            Value::String(spec) => match parse_requirement(spec) {
                Ok(requirement) => out.push(requirement.into_record(scope, filename)),
                Err(reason) => out.skip(filename, spec, reason),
            },
            // `{ include-group = "test" }` pulls in another group listed separately
            Value::Table(table) if table.contains_key("include-group") => {}
            _ => out.skip(filename, &item.to_string(), "requirement is not a string"),
        }
    }
}

fn parse_poetry(poetry: &Table, filename: &str, out: &mut ParseOutput) -> Result<(), ParseError> {
    let mut sections: Vec<(&Table, Scope)> = Vec::new();

    for (key, scope) in [("dependencies", Scope::Runtime), ("dev-dependencies", Scope::Dev)] {
        if let Some(section) = poetry.get(key) {
            let section = section
                .as_table()
                .ok_or_else(|| ParseError::schema(format!("tool.poetry.{key} must be a table")))?;
            sections.push((section, scope));
        }
    }

    if let Some(groups) = poetry.get("group").and_then(Value::as_table) {
        for (group, body) in groups {
            match body.get("dependencies").and_then(Value::as_table) {
                Some(section) => sections.push((section, Scope::Dev)),
                None => out.skip(filename, group, "poetry group has no dependencies table"),
            }
        }
    }

    for (section, scope) in sections {
        for (name, value) in section {
            if name == "python" {
                continue;
            }
            match table_dependency(name, value, scope, filename) {
                Ok(record) => out.push(record),
                Err(reason) => out.skip(filename, name, reason),
            }
        }
    }

    Ok(())
}

fn parse_pipfile(doc: &Table, filename: &str) -> Result<ParseOutput, ParseError> {
    let mut out = ParseOutput::default();

    for (key, scope) in [("packages", Scope::Runtime), ("dev-packages", Scope::Dev)] {
        let Some(section) = doc.get(key) else {
            continue;
        };
        let section = section
            .as_table()
            .ok_or_else(|| ParseError::schema(format!("[{key}] must be a table")))?;
        for (name, value) in section {
            match table_dependency(name, value, scope, filename) {
                Ok(record) => out.push(record),
                Err(reason) => out.skip(filename, name, reason),
            }
        }
    }

    Ok(out)
}

/// Poetry and Pipfile entries: `name = "spec"` or `name = { version | git | path }`.
fn table_dependency(
    name: &str,
    value: &Value,
    scope: Scope,
    filename: &str,
) -> Result<DependencyRecord, &'static str> {
    let table = match value {
        Value::String(spec) => {
            return Ok(DependencyRecord::new(
                Ecosystem::Pypi,
                normalize_name(name),
                version::pypi(spec),
                scope,
                true,
                filename,
            ));
        }
        Value::Table(table) => table,
        // Poetry multiple-constraint form; the first constraint wins
        Value::Array(constraints) => {
            let first = constraints.first().ok_or("constraint list is empty")?;
            return table_dependency(name, first, scope, filename);
        }
        _ => return Err("dependency must be a version string or a table"),
    };

    let version = table
        .get("version")
        .and_then(Value::as_str)
        .map(version::pypi)
        .unwrap_or_default();
    let git = table.get("git").and_then(Value::as_str).map(|url| {
        let reference = ["ref", "rev", "branch", "tag"].into_iter().find_map(|key| {
            let value = table.get(key)?.as_str()?.to_string();
            Some(match key {
                "branch" => GitReference::Branch(value),
                "tag" => GitReference::Tag(value),
                _ => GitReference::Rev(value),
            })
        });
        GitSource {
            url: url.to_string(),
            reference,
        }
    });
    let path = table.get("path").and_then(Value::as_str).map(str::to_string);

    let mut record =
        DependencyRecord::new(Ecosystem::Pypi, normalize_name(name), version, scope, true, filename);
    record.git = git;
    record.path = path;
    Ok(record)
}
