use std::collections::BTreeSet;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ParseError;

/// Package ecosystem a dependency belongs to.
///
/// The declaration order is the sort order used for SBOM output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Cargo,
    Go,
    Npm,
    Nuget,
    Maven,
    Pypi,
}

impl Ecosystem {
    /// Every supported ecosystem, in output order.
    pub const ALL: [Ecosystem; 6] = [
        Ecosystem::Cargo,
        Ecosystem::Go,
        Ecosystem::Npm,
        Ecosystem::Nuget,
        Ecosystem::Maven,
        Ecosystem::Pypi,
    ];

    /// Tag used in PURLs and in the `package_type` output field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Cargo => "cargo",
            Ecosystem::Go => "go",
            Ecosystem::Npm => "npm",
            Ecosystem::Nuget => "nuget",
            Ecosystem::Maven => "maven",
            Ecosystem::Pypi => "pypi",
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Ecosystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ecosystem::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown ecosystem '{s}'"))
    }
}

/// Usage category of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Runtime,
    Dev,
    Build,
    Test,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Runtime => write!(f, "runtime"),
            Scope::Dev => write!(f, "dev"),
            Scope::Build => write!(f, "build"),
            Scope::Test => write!(f, "test"),
        }
    }
}

/// The ref a VCS dependency is pinned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GitReference {
    Rev(String),
    Branch(String),
    Tag(String),
}

/// VCS location of a dependency. Serializes as `{url, rev|branch|tag}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitSource {
    pub url: String,
    #[serde(flatten)]
    pub reference: Option<GitReference>,
}

impl GitSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: GitReference) -> Self {
        self.reference = Some(reference);
        self
    }
}

/// One declared or resolved dependency occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyRecord {
    pub name: String,
    pub version: String,
    pub purl: String,
    #[serde(rename = "package_type")]
    pub ecosystem: Ecosystem,
    pub scope: BTreeSet<Scope>,
    pub direct: bool,
    pub source_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git: Option<GitSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl DependencyRecord {
    /// Build a record with a single scope. `purl` is stamped immediately.
    pub fn new(
        ecosystem: Ecosystem,
        name: impl Into<String>,
        version: impl Into<String>,
        scope: Scope,
        direct: bool,
        source_file: &str,
    ) -> Self {
        let name = name.into();
        let version = version.into();
        let purl = crate::purl::generate(ecosystem, &name, &version);
        Self {
            name,
            version,
            purl,
            ecosystem,
            scope: BTreeSet::from([scope]),
            direct,
            source_file: source_file.to_string(),
            git: None,
            path: None,
        }
    }

    pub fn with_git(mut self, git: GitSource) -> Self {
        self.git = Some(git);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scope.contains(&scope)
    }

    /// Recompute `purl` from `(ecosystem, name, version)`.
    pub fn stamp_purl(&mut self) {
        self.purl = crate::purl::generate(self.ecosystem, &self.name, &self.version);
    }
}

/// A parse failure attributed to one input file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileError {
    pub source_file: String,
    pub error: ParseError,
}

impl Serialize for FileError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FileError", 3)?;
        state.serialize_field("source_file", &self.source_file)?;
        state.serialize_field("kind", self.error.kind())?;
        state.serialize_field("message", &self.error.to_string())?;
        state.end()
    }
}

/// Output of one batch: sorted, deduplicated records plus per-file errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SbomResult {
    pub records: Vec<DependencyRecord>,
    pub errors: Vec<FileError>,
    /// Malformed entries dropped across all files.
    pub skipped_entries: usize,
}

impl SbomResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
