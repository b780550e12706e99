//! Manifest and lock-file parsers, one per ecosystem family.
//!
//! Every parser implements [`ManifestParser`]. A [`registry::ParserRegistry`]
//! holds an ordered set of parsers and dispatches filenames to them.
//!
//! | Parser | Files |
//! |---|---|
//! | [`rust::CargoParser`] | `Cargo.toml`, `Cargo.lock` |
//! | [`go::GoParser`] | `go.mod`, `go.sum` |
//! | [`node::NpmParser`] | `package.json`, `package-lock.json`, `yarn.lock`, `pnpm-lock.yaml` |
//! | [`dotnet::NugetParser`] | `*.csproj`, `*.fsproj`, `packages.config` |
//! | [`java::MavenParser`] | `pom.xml`, `build.gradle`, `build.gradle.kts` |
//! | [`python::PythonParser`] | `requirements.txt`, `setup.py`, `pyproject.toml`, `Pipfile` |

use tracing::debug;

use crate::error::ParseError;
use crate::models::{DependencyRecord, Ecosystem};

pub mod dotnet;
pub mod go;
pub mod java;
pub mod node;
pub mod python;
pub mod registry;
pub mod rust;

/// A filename pattern a parser claims. Matching is case-sensitive and
/// applies to the basename only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePattern {
    /// Exact basename, e.g. `Cargo.toml`.
    Exact(&'static str),
    /// Basename suffix, e.g. `.csproj`.
    Suffix(&'static str),
}

impl FilePattern {
    pub fn matches(&self, filename: &str) -> bool {
        let name = basename(filename);
        match self {
            FilePattern::Exact(exact) => name == *exact,
            FilePattern::Suffix(suffix) => name.len() > suffix.len() && name.ends_with(suffix),
        }
    }
}

impl std::fmt::Display for FilePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilePattern::Exact(name) => write!(f, "{name}"),
            FilePattern::Suffix(suffix) => write!(f, "*{suffix}"),
        }
    }
}

/// Records produced from one file plus the number of malformed entries that
/// were dropped along the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutput {
    pub records: Vec<DependencyRecord>,
    pub skipped: usize,
}

impl ParseOutput {
    pub fn push(&mut self, record: DependencyRecord) {
        self.records.push(record);
    }

    /// Drop a malformed entry and keep going.
    pub fn skip(&mut self, source_file: &str, entry: &str, reason: &str) {
        debug!(file = source_file, entry, reason, "skipping malformed dependency entry");
        self.skipped += 1;
    }

    pub fn extend(&mut self, other: ParseOutput) {
        self.records.extend(other.records);
        self.skipped += other.skipped;
    }
}

/// Capability set shared by every ecosystem parser.
pub trait ManifestParser: Send + Sync {
    /// Ecosystem of every record this parser emits.
    fn ecosystem(&self) -> Ecosystem;

    /// Filename patterns this parser claims, in a stable order.
    fn supported_files(&self) -> &'static [FilePattern];

    /// Whether `filename` (a basename or a path at any depth) is claimed.
    fn can_parse(&self, filename: &str) -> bool {
        self.supported_files().iter().any(|p| p.matches(filename))
    }

    /// Cheap precheck run before [`ManifestParser::parse`].
    fn validate_content(&self, content: &str) -> bool {
        !content.trim().is_empty()
    }

    /// Parse `content` read from `filename`.
    ///
    /// Fails with [`ParseError::Validation`] on empty or syntactically invalid
    /// content and with [`ParseError::Schema`] when a document-level section
    /// makes the whole file unusable. Malformed single entries are skipped.
    fn parse(&self, content: &str, filename: &str) -> Result<ParseOutput, ParseError>;
}

/// Last path component, splitting on both `/` and `\`.
pub fn basename(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename)
}

pub(crate) fn ensure_not_empty(content: &str) -> Result<(), ParseError> {
    if content.trim().is_empty() {
        Err(ParseError::validation("content is empty"))
    } else {
        Ok(())
    }
}

pub(crate) fn parse_toml(content: &str) -> Result<toml::Table, ParseError> {
    ensure_not_empty(content)?;
    Ok(toml::from_str(content)?)
}

pub(crate) fn parse_json(content: &str) -> Result<serde_json::Value, ParseError> {
    ensure_not_empty(content)?;
    Ok(serde_json::from_str(content)?)
}
