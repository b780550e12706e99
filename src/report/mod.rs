//! Report renderers for SBOM results.
//!
//! - [`terminal`]: colored summary box and per-ecosystem tables; respects `--verbose` / `--quiet`.
//! - [`json`]: the [`sbom_inventory::SbomResult`] as pretty-printed JSON.
//! - [`cyclonedx`]: a CycloneDX 1.5 JSON BOM.
//!
//! Every renderer returns the finished document so the caller decides
//! between stdout and `--output`.

pub mod cyclonedx;
pub mod json;
pub mod terminal;
