//! Batch SBOM generation.
//!
//! [`SbomGenerator`] dispatches each `(filename, content)` pair to its parser,
//! catches per-file failures, then merges and sorts the surviving records.
//! Parsing is CPU-bound and stateless, so files are fanned out over the rayon
//! pool; the merge is sequential and imposes its own order.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::ParseError;
use crate::models::{DependencyRecord, Ecosystem, FileError, SbomResult};
use crate::parser::registry::ParserRegistry;
use crate::parser::ParseOutput;

pub struct SbomGenerator {
    registry: ParserRegistry,
    parallel: bool,
}

impl SbomGenerator {
    /// Generator over a caller-built registry. Parallel parsing is on.
    pub fn new(registry: ParserRegistry) -> Self {
        Self {
            registry,
            parallel: true,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Parse a single file, surfacing its error instead of recording it.
    pub fn parse_one(
        &self,
        filename: &str,
        content: &str,
    ) -> Result<Vec<DependencyRecord>, ParseError> {
        let mut records = self.parse_file(filename, content)?.records;
        records.iter_mut().for_each(DependencyRecord::stamp_purl);
        Ok(records)
    }

    /// Parse a batch. Never fails: per-file failures land in
    /// [`SbomResult::errors`] in input order.
    pub fn generate<N, C>(&self, files: &[(N, C)]) -> SbomResult
    where
        N: AsRef<str> + Sync,
        C: AsRef<str> + Sync,
    {
        let parse = |(filename, content): &(N, C)| {
            self.parse_file(filename.as_ref(), content.as_ref())
        };
        let outcomes: Vec<Result<ParseOutput, ParseError>> = if self.parallel {
            files.par_iter().map(parse).collect()
        } else {
            files.iter().map(parse).collect()
        };

        let mut result = SbomResult::default();
        let mut records = Vec::new();

        for ((filename, _), outcome) in files.iter().zip(outcomes) {
            let filename = filename.as_ref();
            match outcome {
                Ok(output) => {
                    debug!(
                        file = filename,
                        records = output.records.len(),
                        skipped = output.skipped,
                        "parsed"
                    );
                    result.skipped_entries += output.skipped;
                    records.extend(output.records);
                }
                Err(error) => {
                    warn!(file = filename, kind = error.kind(), "{error}");
                    result.errors.push(FileError {
                        source_file: filename.to_string(),
                        error,
                    });
                }
            }
        }

        result.records = merge(records);

        info!(
            files = files.len(),
            records = result.records.len(),
            errors = result.errors.len(),
            skipped = result.skipped_entries,
            "sbom generated"
        );
        result
    }

    fn parse_file(&self, filename: &str, content: &str) -> Result<ParseOutput, ParseError> {
        let parser = self
            .registry
            .find(filename)
            .ok_or(ParseError::UnsupportedFile)?;
        debug!(file = filename, ecosystem = %parser.ecosystem(), "dispatching");

        if !parser.validate_content(content) {
            return Err(if content.trim().is_empty() {
                ParseError::validation("content is empty")
            } else {
                ParseError::validation(format!(
                    "content is not a well-formed {} document",
                    parser.ecosystem()
                ))
            });
        }

        parser.parse(content, filename)
    }
}

/// Deduplicate by `(ecosystem, name, version)` and sort by the same key.
///
/// Scopes are unioned and `direct` is OR-ed. `source_file` follows the first
/// direct occurrence, or the first occurrence when none is direct. `git` and
/// `path` keep the first value seen.
pub fn merge(records: Vec<DependencyRecord>) -> Vec<DependencyRecord> {
    let mut merged: BTreeMap<(Ecosystem, String, String), DependencyRecord> = BTreeMap::new();

    for mut record in records {
        record.stamp_purl();
        let key = (record.ecosystem, record.name.clone(), record.version.clone());
        match merged.get_mut(&key) {
            Some(existing) => {
                if record.direct && !existing.direct {
                    existing.source_file = record.source_file;
                }
                existing.direct |= record.direct;
                existing.scope.extend(record.scope);
                if existing.git.is_none() {
                    existing.git = record.git;
                }
                if existing.path.is_none() {
                    existing.path = record.path;
                }
            }
            None => {
                merged.insert(key, record);
            }
        }
    }

    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GitSource, Scope};

    fn generator() -> SbomGenerator {
        SbomGenerator::new(ParserRegistry::with_default_parsers())
    }

    fn record(name: &str, scope: Scope, direct: bool, source_file: &str) -> DependencyRecord {
        DependencyRecord::new(Ecosystem::Cargo, name, "1.0", scope, direct, source_file)
    }

    #[test]
    fn test_merge_unions_scopes_and_ors_direct() {
        let merged = merge(vec![
            record("serde", Scope::Runtime, false, "Cargo.lock"),
            record("serde", Scope::Dev, true, "crates/a/Cargo.toml"),
            record("serde", Scope::Build, true, "crates/b/Cargo.toml"),
        ]);
        assert_eq!(merged.len(), 1);
        let serde = &merged[0];
        assert!(serde.direct);
        assert_eq!(
            serde.scope.iter().copied().collect::<Vec<_>>(),
            vec![Scope::Runtime, Scope::Dev, Scope::Build]
        );
        assert_eq!(serde.source_file, "crates/a/Cargo.toml");
    }

    #[test]
    fn test_merge_keeps_first_git_and_sorts() {
        let merged = merge(vec![
            record("zeta", Scope::Runtime, true, "Cargo.toml"),
            record("alpha", Scope::Runtime, true, "a/Cargo.toml")
                .with_git(GitSource::new("https://example.com/first")),
            record("alpha", Scope::Runtime, true, "b/Cargo.toml")
                .with_git(GitSource::new("https://example.com/second")),
            DependencyRecord::new(Ecosystem::Npm, "alpha", "1.0", Scope::Dev, true, "package.json"),
        ]);
        let keys: Vec<_> = merged.iter().map(|r| (r.ecosystem, r.name.as_str())).collect();
        assert_eq!(
            keys,
            vec![
                (Ecosystem::Cargo, "alpha"),
                (Ecosystem::Cargo, "zeta"),
                (Ecosystem::Npm, "alpha"),
            ]
        );
        assert_eq!(merged[0].git.as_ref().map(|g| g.url.as_str()), Some("https://example.com/first"));
        assert_eq!(merged[0].source_file, "a/Cargo.toml");
    }

    #[test]
    fn test_unsupported_file_is_recorded() {
        let result = generator().generate(&[("README.md", "# hi"), ("go.mod", "module x\n")]);
        assert!(result.records.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].source_file, "README.md");
        assert_eq!(result.errors[0].error, ParseError::UnsupportedFile);
    }

    #[test]
    fn test_failed_precheck_is_validation_error() {
        let result = generator().generate(&[("App.csproj", "<Project><ItemGroup>")]);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(result.errors[0].error, ParseError::Validation { .. }));
    }

    #[test]
    fn test_parse_one_surfaces_errors() {
        let generator = generator();
        assert_eq!(
            generator.parse_one("Gemfile", "gem 'rails'"),
            Err(ParseError::UnsupportedFile)
        );
        assert!(matches!(
            generator.parse_one("Cargo.toml", ""),
            Err(ParseError::Validation { .. })
        ));
        let records = generator
            .parse_one("Cargo.toml", "[dependencies]\nserde = \"1.0\"\n")
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].purl, "pkg:cargo/serde@1.0");
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let files = vec![
            ("Cargo.toml".to_string(), "[dependencies]\nserde = \"1.0\"\n".to_string()),
            ("broken/Cargo.toml".to_string(), "[dependencies".to_string()),
            ("package.json".to_string(), r#"{"dependencies":{"left-pad":"^1.3.0"}}"#.to_string()),
            ("requirements.txt".to_string(), "requests==2.31.0\n".to_string()),
        ];
        let parallel = generator().generate(&files);
        let sequential = generator().with_parallel(false).generate(&files);
        assert_eq!(parallel, sequential);
        assert_eq!(parallel.records.len(), 3);
        assert_eq!(parallel.errors.len(), 1);
        assert_eq!(parallel.errors[0].source_file, "broken/Cargo.toml");
    }

    #[test]
    fn test_skipped_entries_are_summed() {
        let result = generator().generate(&[
            ("Cargo.toml", "[dependencies]\nok = \"1\"\nbad = 3\n"),
            ("go.sum", "garbage\n"),
        ]);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.skipped_entries, 2);
    }
}
