use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::{basename, ensure_not_empty, parse_json, FilePattern, ManifestParser, ParseOutput};
use crate::error::ParseError;
use crate::models::{DependencyRecord, Ecosystem, GitReference, GitSource, Scope};
use crate::version;

const SUPPORTED_FILES: &[FilePattern] = &[
    FilePattern::Exact("package.json"),
    FilePattern::Exact("package-lock.json"),
    FilePattern::Exact("yarn.lock"),
    FilePattern::Exact("pnpm-lock.yaml"),
];

const MANIFEST_SECTIONS: [(&str, Scope); 4] = [
    ("dependencies", Scope::Runtime),
    ("optionalDependencies", Scope::Runtime),
    ("peerDependencies", Scope::Runtime),
    ("devDependencies", Scope::Dev),
];

/// `user/repo` or `user/repo#ref`, the GitHub shorthand npm accepts.
static GITHUB_SHORTHAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+(#.+)?$").expect("static regex")
});

/// `  version "1.2.3"` (yarn v1) or `  version: 1.2.3` (Berry).
static YARN_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s+version:?\s+"?([^"\s]+)"?\s*$"#).expect("static regex")
});

/// Parser for the npm family: npm, Yarn and pnpm.
pub struct NpmParser;

impl NpmParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NpmParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestParser for NpmParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn supported_files(&self) -> &'static [FilePattern] {
        SUPPORTED_FILES
    }

    fn parse(&self, content: &str, filename: &str) -> Result<ParseOutput, ParseError> {
        match basename(filename) {
            "package-lock.json" => parse_package_lock_json(&parse_json(content)?, filename),
            "yarn.lock" => {
                ensure_not_empty(content)?;
                Ok(parse_yarn_lock(content, filename))
            }
            "pnpm-lock.yaml" => parse_pnpm_lock(content, filename),
            _ => parse_package_json(&parse_json(content)?, filename),
        }
    }
}

/// Parse `package.json`: `dependencies`, `optionalDependencies` and
/// `peerDependencies` are runtime, `devDependencies` are dev.
fn parse_package_json(json: &Value, filename: &str) -> Result<ParseOutput, ParseError> {
    let root = json
        .as_object()
        .ok_or_else(|| ParseError::schema("package.json root must be an object"))?;

    let mut out = ParseOutput::default();
    for (section, scope) in MANIFEST_SECTIONS {
        let Some(value) = root.get(section) else {
            continue;
        };
        let pkgs = value
            .as_object()
            .ok_or_else(|| ParseError::schema(format!("`{section}` must be an object")))?;

        for (name, spec) in pkgs {
            let Some(spec) = spec.as_str() else {
                out.skip(filename, name, "specifier is not a string");
                continue;
            };
            match declared_record(name, spec, scope, filename) {
                Ok(record) => out.push(record),
                Err(reason) => out.skip(filename, name, reason),
            }
        }
    }

    Ok(out)
}

/// Interpret one `package.json` specifier.
fn declared_record(
    name: &str,
    spec: &str,
    scope: Scope,
    filename: &str,
) -> Result<DependencyRecord, &'static str> {
    let spec = spec.trim();
    let record = |name: &str, version: String| {
        DependencyRecord::new(Ecosystem::Npm, name, version, scope, true, filename)
    };

    if let Some(local) = spec.strip_prefix("file:").or_else(|| spec.strip_prefix("link:")) {
        return Ok(record(name, String::new()).with_path(local));
    }
    if let Some(git) = git_source(spec) {
        return Ok(record(name, String::new()).with_git(git));
    }
    if spec.starts_with("http://") || spec.starts_with("https://") {
        return Err("remote tarball has no version");
    }
    if let Some(alias) = spec.strip_prefix("npm:") {
        // `npm:real-name@^1.2.0`; the '@' at index 0 belongs to a scope
        return match alias.get(1..).and_then(|rest| rest.rfind('@')) {
            Some(at) => Ok(record(&alias[..at + 1], version::npm(&alias[at + 2..]))),
            None if alias.is_empty() => Err("alias names no package"),
            None => Ok(record(alias, String::new())),
        };
    }
    if let Some(range) = spec.strip_prefix("workspace:") {
        return Ok(record(name, version::npm(range)));
    }
    Ok(record(name, version::npm(spec)))
}

/// Recognize git specifiers: `git+…`, `git://…`, `github:u/r`, `u/r#ref`.
fn git_source(spec: &str) -> Option<GitSource> {
    let (location, fragment) = match spec.split_once('#') {
        Some((location, fragment)) => (location, Some(fragment)),
        None => (spec, None),
    };

    let url = if let Some(url) = location.strip_prefix("git+") {
        url.to_string()
    } else if location.starts_with("git://") || location.ends_with(".git") {
        location.to_string()
    } else if let Some(repo) = location.strip_prefix("github:") {
        format!("https://github.com/{repo}")
    } else if !spec.starts_with('@') && GITHUB_SHORTHAND.is_match(spec) {
        format!("https://github.com/{location}")
    } else {
        return None;
    };

    let reference = fragment.map(|f| match f.strip_prefix("semver:") {
        Some(range) => GitReference::Tag(range.to_string()),
        None => GitReference::Rev(f.to_string()),
    });
    Some(GitSource { url, reference })
}

fn lock_record(name: &str, version: &str, dev: bool, filename: &str) -> DependencyRecord {
    let scope = if dev { Scope::Dev } else { Scope::Runtime };
    match git_source(version) {
        Some(git) => {
            DependencyRecord::new(Ecosystem::Npm, name, "", scope, false, filename).with_git(git)
        }
        None => DependencyRecord::new(Ecosystem::Npm, name, version.trim(), scope, false, filename),
    }
}

/// Parse `package-lock.json` v2/v3 (the `packages` map) or v1 (nested
/// `dependencies`).
fn parse_package_lock_json(json: &Value, filename: &str) -> Result<ParseOutput, ParseError> {
    let root = json
        .as_object()
        .ok_or_else(|| ParseError::schema("package-lock.json root must be an object"))?;

    let mut out = ParseOutput::default();

    if let Some(packages) = root.get("packages").and_then(Value::as_object) {
        for (pkg_path, info) in packages {
            // Skip the root entry (empty string key)
            if pkg_path.is_empty() {
                continue;
            }
            if info.get("link").and_then(Value::as_bool) == Some(true) {
                debug!(file = filename, package = %pkg_path, "excluding linked workspace package");
                continue;
            }

            // "node_modules/a/node_modules/@scope/b" → "@scope/b"
            let Some((_, derived_name)) = pkg_path.rsplit_once("node_modules/") else {
                debug!(file = filename, package = %pkg_path, "excluding workspace member");
                continue;
            };
            let name = info
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(derived_name);

            let Some(version) = info.get("version").and_then(Value::as_str) else {
                out.skip(filename, pkg_path, "missing version");
                continue;
            };
            out.push(lock_record(name, version, is_dev(info), filename));
        }
        return Ok(out);
    }

    if let Some(dependencies) = root.get("dependencies").and_then(Value::as_object) {
        collect_v1_dependencies(dependencies, filename, &mut out);
        return Ok(out);
    }

    Err(ParseError::schema(
        "package-lock.json has neither `packages` nor `dependencies`",
    ))
}

fn collect_v1_dependencies(
    dependencies: &serde_json::Map<String, Value>,
    filename: &str,
    out: &mut ParseOutput,
) {
    for (name, info) in dependencies {
        match info.get("version").and_then(Value::as_str) {
            Some(version) => out.push(lock_record(name, version, is_dev(info), filename)),
            None => out.skip(filename, name, "missing version"),
        }
        if let Some(nested) = info.get("dependencies").and_then(Value::as_object) {
            collect_v1_dependencies(nested, filename, out);
        }
    }
}

fn is_dev(info: &Value) -> bool {
    info.get("dev").and_then(Value::as_bool) == Some(true)
}

/// Parse `yarn.lock`, a custom line-based format, v1 or Berry.
fn parse_yarn_lock(content: &str, filename: &str) -> ParseOutput {
    let mut out = ParseOutput::default();
    let mut lines = content.lines().peekable();

    while let Some(line) = lines.next() {
        // Skip comments, blank lines and stray indented lines
        if line.trim().is_empty() || line.starts_with('#') || line.starts_with([' ', '\t']) {
            continue;
        }

        // Package header: `"a@^1", "a@^1.1":`, take the first spec
        let header = line.trim_end().trim_end_matches(':');
        let first_spec = header.split(", ").next().unwrap_or(header).trim_matches('"');

        let mut version = None;
        while let Some(next) = lines.peek() {
            if !next.trim().is_empty() && !next.starts_with([' ', '\t']) {
                break;
            }
            if version.is_none() {
                if let Some(caps) = YARN_VERSION.captures(next) {
                    version = Some(caps[1].to_string());
                }
            }
            lines.next();
        }

        if first_spec == "__metadata" || first_spec.contains("@workspace:") {
            continue;
        }

        let Some(name) = yarn_package_name(first_spec) else {
            out.skip(filename, first_spec, "header has no `name@range`");
            continue;
        };
        match version {
            Some(version) => out.push(lock_record(name, &version, false, filename)),
            None => out.skip(filename, first_spec, "missing version"),
        }
    }

    out
}

/// `@babel/core@npm:^7.0.0` → `@babel/core`
fn yarn_package_name(spec: &str) -> Option<&str> {
    let at = spec.get(1..)?.find('@')? + 1;
    Some(&spec[..at])
}

/// Parse `pnpm-lock.yaml`: the `packages` map in v5, v6 or v9 key form.
fn parse_pnpm_lock(content: &str, filename: &str) -> Result<ParseOutput, ParseError> {
    ensure_not_empty(content)?;
    let doc: serde_yaml::Value = serde_yaml::from_str(content)?;
    let root = doc
        .as_mapping()
        .ok_or_else(|| ParseError::schema("pnpm-lock.yaml root must be a mapping"))?;
    if !root.contains_key("lockfileVersion") {
        return Err(ParseError::schema("pnpm-lock.yaml has no `lockfileVersion`"));
    }

    let mut out = ParseOutput::default();
    let Some(packages) = root.get("packages").and_then(serde_yaml::Value::as_mapping) else {
        return Ok(out);
    };

    for (key, info) in packages {
        let Some(key) = key.as_str() else {
            out.skip(filename, "?", "package key is not a string");
            continue;
        };

        let declared = info
            .get("name")
            .and_then(serde_yaml::Value::as_str)
            .zip(info.get("version").and_then(serde_yaml::Value::as_str));
        let Some((name, version)) = pnpm_package_key(key).or(declared) else {
            out.skip(filename, key, "cannot derive name and version");
            continue;
        };

        let dev = info.get("dev").and_then(serde_yaml::Value::as_bool) == Some(true);
        out.push(lock_record(name, version, dev, filename));
    }

    Ok(out)
}

/// Split a pnpm package key into name and version.
///
/// - v5: `/name/1.0.0`, `/@scope/name/1.0.0_peer@1.0.0`
/// - v6: `/name@1.0.0(peer@1.0.0)`
/// - v9: `name@1.0.0`
fn pnpm_package_key(key: &str) -> Option<(&str, &str)> {
    let key = key.trim_start_matches('/');
    let key = key.split('(').next().unwrap_or(key);

    let name_segments = if key.starts_with('@') { 2 } else { 1 };
    let segments: Vec<&str> = key.split('/').collect();
    if segments.len() == name_segments + 1
        && segments[name_segments].starts_with(|c: char| c.is_ascii_digit())
    {
        let split = key.len() - segments[name_segments].len() - 1;
        let version = segments[name_segments].split('_').next().unwrap_or("");
        return (!version.is_empty()).then_some((&key[..split], version));
    }

    let name = yarn_package_name(key)?;
    let version = &key[name.len() + 1..];
    (!version.is_empty()).then_some((name, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str, filename: &str) -> ParseOutput {
        NpmParser::new().parse(content, filename).unwrap()
    }

    #[test]
    fn test_parse_package_json() {
        let json = r#"{
  "name": "my-app",
  "dependencies": {
    "express": "^4.18.2",
    "lodash": "~4.17.21"
  },
  "devDependencies": {
    "jest": ">=29.0.0"
  }
}"#;
        let out = parse(json, "package.json");
        assert_eq!(out.records.len(), 3);
        assert!(out.records.iter().all(|r| r.direct));

        let express = out.records.iter().find(|r| r.name == "express").unwrap();
        assert_eq!(express.version, "4.18.2");
        assert_eq!(express.purl, "pkg:npm/express@4.18.2");

        let jest = out.records.iter().find(|r| r.name == "jest").unwrap();
        assert_eq!(jest.version, "29.0.0");
        assert!(jest.has_scope(Scope::Dev));
    }

    #[test]
    fn test_package_json_special_specifiers() {
        let json = r#"{
  "dependencies": {
    "local": "file:../local",
    "forked": "git+https://github.com/me/forked.git#v1.2.0",
    "short": "me/short#semver:^2.0.0",
    "alias": "npm:@scope/real@^3.1.0",
    "sibling": "workspace:^1.4.0",
    "tarball": "https://example.com/pkg.tgz",
    "broken": 7
  }
}"#;
        let out = parse(json, "package.json");
        assert_eq!(out.records.len(), 5);
        assert_eq!(out.skipped, 2);

        let find = |name: &str| out.records.iter().find(|r| r.name == name).unwrap();
        assert_eq!(find("local").path.as_deref(), Some("../local"));
        assert_eq!(
            find("forked").git,
            Some(
                GitSource::new("https://github.com/me/forked.git")
                    .with_reference(GitReference::Rev("v1.2.0".to_string()))
            )
        );
        assert_eq!(
            find("short").git,
            Some(
                GitSource::new("https://github.com/me/short")
                    .with_reference(GitReference::Tag("^2.0.0".to_string()))
            )
        );
        assert_eq!(find("@scope/real").version, "3.1.0");
        assert_eq!(find("sibling").version, "1.4.0");
    }

    #[test]
    fn test_package_json_schema_errors() {
        let parser = NpmParser::new();
        assert!(matches!(
            parser.parse("[1, 2]", "package.json"),
            Err(ParseError::Schema { .. })
        ));
        assert!(matches!(
            parser.parse(r#"{"dependencies": ["a"]}"#, "package.json"),
            Err(ParseError::Schema { .. })
        ));
        assert!(matches!(
            parser.parse("{", "package.json"),
            Err(ParseError::Validation { .. })
        ));
    }

    #[test]
    fn test_parse_package_lock_json_v3() {
        let json = r#"{
  "name": "my-app",
  "lockfileVersion": 3,
  "packages": {
    "": { "name": "my-app", "version": "1.0.0" },
    "node_modules/express": { "version": "4.18.2", "license": "MIT" },
    "node_modules/express/node_modules/@types/node": { "version": "20.1.0", "dev": true },
    "node_modules/shared": { "resolved": "packages/shared", "link": true },
    "packages/shared": { "version": "0.1.0" },
    "node_modules/broken": { "resolved": "https://example.com" }
  }
}"#;
        let out = parse(json, "package-lock.json");
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.skipped, 1);
        assert!(out.records.iter().all(|r| !r.direct));
        assert_eq!(out.records[0].name, "express");
        assert!(out.records[0].has_scope(Scope::Runtime));
        assert_eq!(out.records[1].name, "@types/node");
        assert!(out.records[1].has_scope(Scope::Dev));
    }

    #[test]
    fn test_parse_package_lock_json_v1() {
        let json = r#"{
  "lockfileVersion": 1,
  "dependencies": {
    "a": { "version": "1.0.0", "dependencies": { "b": { "version": "2.0.0" } } },
    "c": { "version": "3.0.0", "dev": true }
  }
}"#;
        let out = parse(json, "package-lock.json");
        let names: Vec<&str> = out.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_package_lock_without_packages_is_schema_error() {
        assert!(matches!(
            NpmParser::new().parse(r#"{"lockfileVersion": 3}"#, "package-lock.json"),
            Err(ParseError::Schema { .. })
        ));
    }

    #[test]
    fn test_parse_yarn_lock_v1() {
        let content = r#"# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
# yarn lockfile v1


"@babel/code-frame@^7.0.0", "@babel/code-frame@^7.10.4":
  version "7.12.13"
  resolved "https://registry.yarnpkg.com/@babel/code-frame/-/code-frame-7.12.13.tgz"
  dependencies:
    "@babel/highlight" "^7.12.13"

lodash@^4.17.21:
  version "4.17.21"
  resolved "https://registry.yarnpkg.com/lodash/-/lodash-4.17.21.tgz"

broken@^1.0.0:
  resolved "https://registry.yarnpkg.com/broken/-/broken-1.0.0.tgz"
"#;
        let out = parse(content, "yarn.lock");
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.skipped, 1);
        assert_eq!(out.records[0].name, "@babel/code-frame");
        assert_eq!(out.records[0].version, "7.12.13");
        assert_eq!(out.records[1].name, "lodash");
        assert!(out.records.iter().all(|r| !r.direct));
    }

    #[test]
    fn test_parse_yarn_lock_berry() {
        let content = r#"__metadata:
  version: 6
  cacheKey: 8

"lodash@npm:^4.17.21":
  version: 4.17.21
  resolution: "lodash@npm:4.17.21"

"my-app@workspace:.":
  version: 0.0.0-use.local
  resolution: "my-app@workspace:."
"#;
        let out = parse(content, "yarn.lock");
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].name, "lodash");
        assert_eq!(out.records[0].version, "4.17.21");
    }

    #[test]
    fn test_pnpm_package_key_forms() {
        assert_eq!(pnpm_package_key("/lodash/4.17.21"), Some(("lodash", "4.17.21")));
        assert_eq!(
            pnpm_package_key("/@babel/core/7.22.0_react@18.2.0"),
            Some(("@babel/core", "7.22.0"))
        );
        assert_eq!(
            pnpm_package_key("/react-dom@18.2.0(react@18.2.0)"),
            Some(("react-dom", "18.2.0"))
        );
        assert_eq!(pnpm_package_key("@types/node@20.1.0"), Some(("@types/node", "20.1.0")));
        assert_eq!(pnpm_package_key("not-a-key"), None);
    }

    #[test]
    fn test_parse_pnpm_lock() {
        let content = r#"lockfileVersion: '6.0'

dependencies:
  react:
    specifier: ^18.2.0
    version: 18.2.0

packages:

  /react@18.2.0:
    resolution: {integrity: sha512-abc}
    dev: false

  /vitest@0.34.0(jsdom@22.0.0):
    resolution: {integrity: sha512-def}
    dev: true
"#;
        let out = parse(content, "pnpm-lock.yaml");
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].name, "react");
        assert!(out.records[0].has_scope(Scope::Runtime));
        assert_eq!(out.records[1].name, "vitest");
        assert_eq!(out.records[1].version, "0.34.0");
        assert!(out.records[1].has_scope(Scope::Dev));
    }

    #[test]
    fn test_pnpm_lock_without_version_is_schema_error() {
        assert!(matches!(
            NpmParser::new().parse("packages: {}\n", "pnpm-lock.yaml"),
            Err(ParseError::Schema { .. })
        ));
        assert!(matches!(
            NpmParser::new().parse("packages: [\n", "pnpm-lock.yaml"),
            Err(ParseError::Validation { .. })
        ));
    }
}
