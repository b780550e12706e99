use std::collections::{HashMap, HashSet};

use super::{basename, ensure_not_empty, FilePattern, ManifestParser, ParseOutput};
use crate::error::ParseError;
use crate::models::{DependencyRecord, Ecosystem, Scope};
use crate::version;

const SUPPORTED_FILES: &[FilePattern] = &[
    FilePattern::Exact("go.mod"),
    FilePattern::Exact("go.sum"),
];

/// Parser for Go modules.
///
/// `go.mod` `require` directives become direct runtime records; `replace`
/// directives are applied to them. `go.sum` lists every module the build
/// verified and yields indirect records.
pub struct GoParser;

impl GoParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GoParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestParser for GoParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Go
    }

    fn supported_files(&self) -> &'static [FilePattern] {
        SUPPORTED_FILES
    }

    fn parse(&self, content: &str, filename: &str) -> Result<ParseOutput, ParseError> {
        ensure_not_empty(content)?;
        if basename(filename) == "go.sum" {
            Ok(parse_go_sum(content, filename))
        } else {
            parse_go_mod(content, filename)
        }
    }
}

/// Target of a `replace` directive.
enum Replacement {
    Module { path: String, version: String },
    Local(String),
}

/// Module path and, for `replace X v1 => ...`, the one version it applies to.
type ReplaceKey = (String, Option<String>);

/// Which multi-line block the scanner is inside.
#[derive(Clone, Copy, PartialEq)]
enum Block {
    None,
    Require,
    Replace,
    Other,
}

fn parse_go_mod(content: &str, filename: &str) -> Result<ParseOutput, ParseError> {
    let mut out = ParseOutput::default();
    let mut has_module = false;
    let mut requires: Vec<(String, String)> = Vec::new();
    let mut replacements: HashMap<ReplaceKey, Replacement> = HashMap::new();
    let mut block = Block::None;

    for raw_line in content.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if block != Block::None {
            if line == ")" {
                block = Block::None;
                continue;
            }
            match block {
                Block::Require => push_require(line, filename, &mut requires, &mut out),
                Block::Replace => push_replace(line, filename, &mut replacements, &mut out),
                _ => {}
            }
            continue;
        }

        let (directive, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        match directive {
            "module" => has_module = !rest.is_empty(),
            "require" | "replace" | "exclude" | "retract" | "tool" | "godebug" if rest == "(" => {
                block = match directive {
                    "require" => Block::Require,
                    "replace" => Block::Replace,
                    _ => Block::Other,
                };
            }
            "require" => push_require(rest, filename, &mut requires, &mut out),
            "replace" => push_replace(rest, filename, &mut replacements, &mut out),
            _ => {}
        }
    }

    if !has_module {
        return Err(ParseError::schema("go.mod has no `module` directive"));
    }

    for (module, module_version) in requires {
        // A version-qualified replace wins over a bare one, as in Go
        let replacement = replacements
            .get(&(module.clone(), Some(module_version.clone())))
            .or_else(|| replacements.get(&(module.clone(), None)));
        let (name, resolved_version, local_path) = match replacement {
            Some(Replacement::Local(path)) => (module, module_version, Some(path.clone())),
            Some(Replacement::Module { path, version }) => (path.clone(), version.clone(), None),
            None => (module, module_version, None),
        };
        let mut record =
            DependencyRecord::new(Ecosystem::Go, name, resolved_version, Scope::Runtime, true, filename);
        record.path = local_path;
        out.push(record);
    }

    Ok(out)
}

fn push_require(
    spec: &str,
    filename: &str,
    requires: &mut Vec<(String, String)>,
    out: &mut ParseOutput,
) {
    let mut fields = spec.split_whitespace();
    match (fields.next(), fields.next()) {
        (Some(module), Some(module_version)) => {
            requires.push((unquote(module).to_string(), version::go(module_version)));
        }
        _ => out.skip(filename, spec, "require needs a module path and a version"),
    }
}

fn push_replace(
    spec: &str,
    filename: &str,
    replacements: &mut HashMap<ReplaceKey, Replacement>,
    out: &mut ParseOutput,
) {
    let Some((old, new)) = spec.split_once("=>") else {
        out.skip(filename, spec, "replace needs `=>`");
        return;
    };
    let mut source = old.split_whitespace();
    let Some(old_module) = source.next() else {
        out.skip(filename, spec, "replace has no module path");
        return;
    };
    let old_version = source.next().map(version::go);

    let mut target = new.split_whitespace();
    let replacement = match (target.next(), target.next()) {
        (Some(path), None) if is_local_path(path) => Replacement::Local(path.to_string()),
        (Some(path), Some(target_version)) => Replacement::Module {
            path: unquote(path).to_string(),
            version: version::go(target_version),
        },
        _ => {
            out.skip(filename, spec, "replace target needs a local path or a module version");
            return;
        }
    };
    replacements.insert((unquote(old_module).to_string(), old_version), replacement);
}

fn parse_go_sum(content: &str, filename: &str) -> ParseOutput {
    let mut out = ParseOutput::default();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let &[module, module_version, hash] = fields.as_slice() else {
            out.skip(filename, line, "expected `module version hash`");
            continue;
        };
        if !hash.contains(':') {
            out.skip(filename, line, "hash has no algorithm prefix");
            continue;
        }

        let module_version = module_version.trim_end_matches("/go.mod");
        if seen.insert((module.to_string(), module_version.to_string())) {
            out.push(DependencyRecord::new(
                Ecosystem::Go,
                module,
                version::go(module_version),
                Scope::Runtime,
                false,
                filename,
            ));
        }
    }

    out
}

fn strip_comment(line: &str) -> &str {
    line.split_once("//").map_or(line, |(code, _)| code)
}

fn is_local_path(path: &str) -> bool {
    path.starts_with("./") || path.starts_with("../") || path.starts_with('/')
}

fn unquote(value: &str) -> &str {
    value.trim_matches('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    const GO_MOD: &str = r#"
module github.com/example/app

go 1.21

require github.com/pkg/errors v0.9.1

require (
	github.com/gin-gonic/gin v1.9.1
	golang.org/x/net v0.17.0 // indirect
	example.com/local v0.0.0
	example.com/old v1.0.0
)

replace example.com/local => ../local

replace (
	example.com/old v1.0.0 => example.com/new v1.2.0
)
"#;

    #[test]
    fn test_parse_go_mod() {
        let out = GoParser::new().parse(GO_MOD, "go.mod").unwrap();
        assert_eq!(out.records.len(), 5);
        assert!(out.records.iter().all(|r| r.direct && r.has_scope(Scope::Runtime)));

        let gin = out.records.iter().find(|r| r.name == "github.com/gin-gonic/gin").unwrap();
        assert_eq!(gin.version, "v1.9.1");
        assert_eq!(gin.purl, "pkg:go/github.com/gin-gonic/gin@v1.9.1");

        let local = out.records.iter().find(|r| r.name == "example.com/local").unwrap();
        assert_eq!(local.path.as_deref(), Some("../local"));

        assert!(out.records.iter().any(|r| r.name == "example.com/new" && r.version == "v1.2.0"));
        assert!(!out.records.iter().any(|r| r.name == "example.com/old"));
    }

    #[test]
    fn test_versioned_replace_only_matches_that_version() {
        let content = "\
module example.com/app
require (
\texample.com/old v2.0.0
\texample.com/pinned v1.0.0
)
replace example.com/old v1.0.0 => example.com/new v1.2.0
replace example.com/pinned v1.0.0 => example.com/fork v1.0.1
replace example.com/pinned => ../pinned
";
        let out = GoParser::new().parse(content, "go.mod").unwrap();
        assert_eq!(out.records.len(), 2);

        let old = out.records.iter().find(|r| r.name == "example.com/old").unwrap();
        assert_eq!(old.version, "v2.0.0");
        assert!(!out.records.iter().any(|r| r.name == "example.com/new"));

        let fork = out.records.iter().find(|r| r.name == "example.com/fork").unwrap();
        assert_eq!(fork.version, "v1.0.1");
        assert!(fork.path.is_none());
    }

    #[test]
    fn test_go_mod_without_module_is_schema_error() {
        let err = GoParser::new()
            .parse("require github.com/pkg/errors v0.9.1\n", "go.mod")
            .unwrap_err();
        assert!(matches!(err, ParseError::Schema { .. }));
    }

    #[test]
    fn test_go_mod_skips_incomplete_require() {
        let content = "module example.com/app\nrequire (\n\tgithub.com/only-path\n\tgithub.com/ok v1.0.0\n)\n";
        let out = GoParser::new().parse(content, "go.mod").unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.skipped, 1);
    }

    #[test]
    fn test_parse_go_sum_dedupes_go_mod_lines() {
        let content = "\
github.com/pkg/errors v0.9.1 h1:FEBLx1zS214owpjy7qsBeixbURkuhQAwrK5UwLGTwt4=
github.com/pkg/errors v0.9.1/go.mod h1:bwawxfHBFNV+L2hUp1rHADufV3IMtnDRdf1r5NINEl0=
golang.org/x/net v0.17.0 h1:pVaXccu2ozPjCXewfr1S7xoNUy8+wf3B0d1Z7XxnEDo=
garbage line
";
        let out = GoParser::new().parse(content, "go.sum").unwrap();
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.skipped, 1);
        assert!(out.records.iter().all(|r| !r.direct));
        assert_eq!(out.records[0].version, "v0.9.1");
    }

    #[test]
    fn test_empty_go_mod_is_validation_error() {
        let parser = GoParser::new();
        assert!(!parser.validate_content("   "));
        assert!(matches!(
            parser.parse("", "go.mod"),
            Err(ParseError::Validation { .. })
        ));
    }
}
