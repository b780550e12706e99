use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use sbom_inventory::{FileError, ParseError, ParserRegistry};

use crate::config::ScanConfig;

/// Files collected from disk, ready for [`sbom_inventory::SbomGenerator::generate`].
#[derive(Debug, Default)]
pub struct ScanInput {
    /// `(path relative to the scanned root, content)` pairs in walk order.
    pub files: Vec<(String, String)>,
    /// Claimed files that could not be handed to a parser.
    pub errors: Vec<FileError>,
}

impl ScanInput {
    pub fn extend(&mut self, other: ScanInput) {
        self.files.extend(other.files);
        self.errors.extend(other.errors);
    }

    /// Prepend `prefix/` to every collected path, so files from different
    /// roots stay distinguishable.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches(['/', '\\']);
        if prefix.is_empty() || prefix == "." {
            return self;
        }
        for (name, _) in &mut self.files {
            *name = format!("{prefix}/{name}");
        }
        for error in &mut self.errors {
            error.source_file = format!("{prefix}/{}", error.source_file);
        }
        self
    }
}

/// Collect every file under `root` that a registered parser claims.
///
/// Directories named in `scan.exclude_dirs` are skipped and recursion stops
/// `scan.max_depth` directories below `root`. Entries are visited in name
/// order so the output is stable across platforms. A `root` that is a file
/// is read as-is.
pub fn collect_files(
    root: &Path,
    registry: &ParserRegistry,
    scan: &ScanConfig,
) -> Result<ScanInput> {
    let mut input = ScanInput::default();

    if root.is_file() {
        read_claimed(root, root.to_string_lossy().into_owned(), scan, &mut input);
        return Ok(input);
    }
    if !root.is_dir() {
        bail!("{} is not a file or directory", root.display());
    }

    // A file's walk depth is one more than the directories above it
    let walker = WalkDir::new(root)
        .max_depth(scan.max_depth.saturating_add(1))
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded(e, scan));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) if err.depth() == 0 => {
                return Err(err).with_context(|| format!("reading directory {}", root.display()));
            }
            Err(err) => {
                warn!("skipping unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if registry.find(&name).is_none() {
            continue;
        }
        let relative = relative_path(entry.path(), root);
        read_claimed(entry.path(), relative, scan, &mut input);
    }
    Ok(input)
}

fn is_excluded(entry: &DirEntry, scan: &ScanConfig) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    let excluded = scan.exclude_dirs.iter().any(|dir| dir.as_str() == &*name);
    if excluded {
        debug!(dir = %entry.path().display(), "excluded directory");
    }
    excluded
}

/// `/`-joined path of `path` below `root`.
fn relative_path(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_claimed(path: &Path, relative: String, scan: &ScanConfig, input: &mut ScanInput) {
    let size = match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        Ok(_) => return,
        Err(err) => {
            warn!(file = %relative, "cannot stat file: {err}");
            return;
        }
    };

    if size > scan.max_file_size {
        input.errors.push(FileError {
            source_file: relative,
            error: ParseError::validation(format!(
                "file is {size} bytes, larger than the {} byte limit",
                scan.max_file_size
            )),
        });
        return;
    }

    match fs::read_to_string(path) {
        Ok(content) => {
            debug!(file = %relative, bytes = size, "collected");
            input.files.push((relative, content));
        }
        Err(err) => input.errors.push(FileError {
            source_file: relative,
            error: ParseError::validation(format!("cannot read file: {err}")),
        }),
    }
}
