//! `sbom_inventory`: turn dependency manifests and lock files from many
//! ecosystems into one normalized, deduplicated SBOM inventory.
//!
//! The library is pure: callers hand it `(filename, content)` pairs and get
//! back an [`SbomResult`]. Reading files, configuration and rendering live in
//! the `sbom-inventory` binary.
//!
//! ```no_run
//! use sbom_inventory::{ParserRegistry, SbomGenerator};
//!
//! let generator = SbomGenerator::new(ParserRegistry::with_default_parsers());
//! let result = generator.generate(&[("Cargo.toml", "[dependencies]\nserde = \"1.0\"\n")]);
//! assert_eq!(result.records[0].purl, "pkg:cargo/serde@1.0");
//! ```

pub mod error;
pub mod models;
pub mod parser;
pub mod purl;
pub mod sbom;
pub mod version;

pub use error::ParseError;
pub use models::{
    DependencyRecord, Ecosystem, FileError, GitReference, GitSource, SbomResult, Scope,
};
pub use parser::registry::ParserRegistry;
pub use parser::{FilePattern, ManifestParser, ParseOutput};
pub use sbom::SbomGenerator;
