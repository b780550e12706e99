use tracing::debug;

use super::dotnet::NugetParser;
use super::go::GoParser;
use super::java::MavenParser;
use super::node::NpmParser;
use super::python::PythonParser;
use super::rust::CargoParser;
use super::{FilePattern, ManifestParser};
use crate::models::Ecosystem;

/// Ordered set of parsers. The first registered parser claiming a filename
/// handles it.
#[derive(Default)]
pub struct ParserRegistry {
    parsers: Vec<Box<dyn ManifestParser>>,
}

impl ParserRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in parsers, one per ecosystem family.
    pub fn with_default_parsers() -> Self {
        Self::with_ecosystems(&Ecosystem::ALL)
    }

    /// Built-in parsers for `ecosystems` only, in the default order.
    pub fn with_ecosystems(ecosystems: &[Ecosystem]) -> Self {
        let mut registry = Self::new();
        for ecosystem in Ecosystem::ALL {
            if !ecosystems.contains(&ecosystem) {
                continue;
            }
            let parser: Box<dyn ManifestParser> = match ecosystem {
                Ecosystem::Cargo => Box::new(CargoParser::new()),
                Ecosystem::Go => Box::new(GoParser::new()),
                Ecosystem::Npm => Box::new(NpmParser::new()),
                Ecosystem::Nuget => Box::new(NugetParser::new()),
                Ecosystem::Maven => Box::new(MavenParser::new()),
                Ecosystem::Pypi => Box::new(PythonParser::new()),
            };
            registry.register(parser);
        }
        registry
    }

    pub fn register(&mut self, parser: Box<dyn ManifestParser>) {
        debug!(ecosystem = %parser.ecosystem(), "registering parser");
        self.parsers.push(parser);
    }

    /// The parser responsible for `filename`, if any.
    pub fn find(&self, filename: &str) -> Option<&dyn ManifestParser> {
        self.parsers
            .iter()
            .find(|parser| parser.can_parse(filename))
            .map(Box::as_ref)
    }

    /// Every claimed pattern, in registration order.
    pub fn supported_files(&self) -> Vec<FilePattern> {
        self.parsers
            .iter()
            .flat_map(|parser| parser.supported_files().iter().copied())
            .collect()
    }

    pub fn ecosystems(&self) -> Vec<Ecosystem> {
        self.parsers.iter().map(|parser| parser.ecosystem()).collect()
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}
