use anyhow::Result;

use sbom_inventory::SbomResult;

/// Records, per-file errors and the skipped-entry count.
pub fn render(result: &SbomResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}
