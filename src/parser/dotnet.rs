use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{basename, ensure_not_empty, FilePattern, ManifestParser, ParseOutput};
use crate::error::ParseError;
use crate::models::{DependencyRecord, Ecosystem, Scope};
use crate::version;

const SUPPORTED_FILES: &[FilePattern] = &[
    FilePattern::Suffix(".csproj"),
    FilePattern::Suffix(".fsproj"),
    FilePattern::Exact("packages.config"),
];

/// Parser for .NET projects using NuGet.
///
/// Supports two manifest formats:
/// - SDK-style `*.csproj` / `*.fsproj` (`<PackageReference>` elements)
/// - Legacy `packages.config` (`<package>` elements)
///
/// NuGet has no dev/runtime distinction, so every record is runtime.
pub struct NugetParser;

impl NugetParser {
    /// Create a new `NugetParser`.
    pub fn new() -> Self {
        Self
    }
}

impl Default for NugetParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestParser for NugetParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Nuget
    }

    fn supported_files(&self) -> &'static [FilePattern] {
        SUPPORTED_FILES
    }

    fn validate_content(&self, content: &str) -> bool {
        !content.trim().is_empty() && is_well_formed(content)
    }

    fn parse(&self, content: &str, filename: &str) -> Result<ParseOutput, ParseError> {
        ensure_not_empty(content)?;
        if basename(filename) == "packages.config" {
            parse_packages_config(content, filename)
        } else {
            parse_project_file(content, filename)
        }
    }
}

/// A `<PackageReference>` whose version may arrive in a child element.
#[derive(Default)]
struct PendingReference {
    name: String,
    version: String,
}

/// Parse `<PackageReference Include="..." Version="..." />` from `.csproj` / `.fsproj`.
fn parse_project_file(content: &str, filename: &str) -> Result<ParseOutput, ParseError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut out = ParseOutput::default();
    let mut buf = Vec::new();
    let mut depth: u32 = 0;
    let mut pending: Option<PendingReference> = None;
    let mut in_version = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                let tag = local_name(e);
                check_root(depth, &tag, "Project")?;
                depth += 1;
                if tag == "PackageReference" {
                    pending = Some(reference_attributes(e));
                } else if tag == "Version" && pending.is_some() {
                    in_version = true;
                }
            }
            Event::Empty(ref e) => {
                let tag = local_name(e);
                check_root(depth, &tag, "Project")?;
                if tag == "PackageReference" {
                    finish_reference(reference_attributes(e), filename, &mut out);
                }
            }
            Event::Text(ref e) if in_version => {
                if let Some(reference) = pending.as_mut() {
                    reference.version = e.unescape()?.trim().to_string();
                }
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                let tag = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                if tag == "Version" {
                    in_version = false;
                } else if tag == "PackageReference" {
                    if let Some(reference) = pending.take() {
                        finish_reference(reference, filename, &mut out);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    ensure_closed(depth)?;
    Ok(out)
}

fn reference_attributes(e: &BytesStart) -> PendingReference {
    let mut reference = PendingReference::default();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let val = attr.unescape_value().unwrap_or_default().into_owned();
        match key.as_str() {
            "Include" | "Update" if reference.name.is_empty() => reference.name = val,
            "Version" => reference.version = val,
            _ => {}
        }
    }
    reference
}

fn finish_reference(reference: PendingReference, filename: &str, out: &mut ParseOutput) {
    if reference.name.is_empty() {
        out.skip(filename, "PackageReference", "missing Include");
        return;
    }
    let version = version::nuget(&reference.version);
    if version.is_empty() {
        out.skip(filename, &reference.name, "missing Version");
        return;
    }
    out.push(DependencyRecord::new(
        Ecosystem::Nuget,
        reference.name,
        version,
        Scope::Runtime,
        true,
        filename,
    ));
}

/// Parse `<package id="..." version="..." />` from `packages.config`.
fn parse_packages_config(content: &str, filename: &str) -> Result<ParseOutput, ParseError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut out = ParseOutput::default();
    let mut buf = Vec::new();
    let mut depth: u32 = 0;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Empty(ref e) | Event::Start(ref e) => {
                let tag = local_name(e);
                check_root(depth, &tag, "packages")?;
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
                if tag == "package" {
                    let mut id = String::new();
                    let mut version = String::new();
                    for attr in e.attributes().flatten() {
                        let key =
                            String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                        let val = attr.unescape_value().unwrap_or_default().into_owned();
                        match key.as_str() {
                            "id" => id = val,
                            "version" => version = val,
                            _ => {}
                        }
                    }
                    let version = version::nuget(&version);
                    if id.is_empty() || version.is_empty() {
                        out.skip(filename, &id, "package needs id and version");
                    } else {
                        out.push(DependencyRecord::new(
                            Ecosystem::Nuget,
                            id,
                            version,
                            Scope::Runtime,
                            true,
                            filename,
                        ));
                    }
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    ensure_closed(depth)?;
    Ok(out)
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned()
}

/// The first element at depth 0 must be `expected`.
fn check_root(depth: u32, tag: &str, expected: &str) -> Result<(), ParseError> {
    if depth == 0 && tag != expected {
        return Err(ParseError::schema(format!(
            "root element is <{tag}>, expected <{expected}>"
        )));
    }
    Ok(())
}

fn ensure_closed(depth: u32) -> Result<(), ParseError> {
    if depth > 0 {
        return Err(ParseError::validation("invalid XML: unclosed element at end of document"));
    }
    Ok(())
}

/// Whether `content` is a complete, well-formed XML document.
fn is_well_formed(content: &str) -> bool {
    let mut reader = Reader::from_str(content);
    let mut buf = Vec::new();
    let mut depth: u32 = 0;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) => return depth == 0,
            Err(_) => return false,
            _ => {}
        }
        buf.clear();
    }
}
