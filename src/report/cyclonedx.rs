//! CycloneDX 1.5 JSON BOM.
//!
//! One `library` component per record. CycloneDX has no notion of dev or
//! build scope, so anything without runtime scope becomes `optional` and the
//! full scope set is kept as a property.

use anyhow::Result;
use serde::Serialize;

use sbom_inventory::{DependencyRecord, SbomResult, Scope};

const PROPERTY_PREFIX: &str = "sbom-inventory";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CycloneDxBom {
    bom_format: &'static str,
    spec_version: &'static str,
    version: u32,
    metadata: CycloneDxMetadata,
    components: Vec<CycloneDxComponent>,
}

#[derive(Serialize)]
struct CycloneDxMetadata {
    tools: Vec<CycloneDxTool>,
}

#[derive(Serialize)]
struct CycloneDxTool {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct CycloneDxComponent {
    #[serde(rename = "type")]
    component_type: &'static str,
    #[serde(rename = "bom-ref")]
    bom_ref: String,
    name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    version: String,
    purl: String,
    scope: &'static str,
    properties: Vec<CycloneDxProperty>,
}

#[derive(Serialize)]
struct CycloneDxProperty {
    name: String,
    value: String,
}

impl CycloneDxProperty {
    fn new(key: &str, value: impl Into<String>) -> Self {
        Self {
            name: format!("{PROPERTY_PREFIX}:{key}"),
            value: value.into(),
        }
    }
}

fn component(record: &DependencyRecord) -> CycloneDxComponent {
    let scopes: Vec<String> = record.scope.iter().map(Scope::to_string).collect();
    CycloneDxComponent {
        component_type: "library",
        bom_ref: record.purl.clone(),
        name: record.name.clone(),
        version: record.version.clone(),
        purl: record.purl.clone(),
        scope: if record.has_scope(Scope::Runtime) {
            "required"
        } else {
            "optional"
        },
        properties: vec![
            CycloneDxProperty::new("direct", record.direct.to_string()),
            CycloneDxProperty::new("scopes", scopes.join(",")),
            CycloneDxProperty::new("source_file", record.source_file.clone()),
        ],
    }
}

/// Render `result.records` as a CycloneDX 1.5 JSON document.
pub fn render(result: &SbomResult) -> Result<String> {
    let bom = CycloneDxBom {
        bom_format: "CycloneDX",
        spec_version: "1.5",
        version: 1,
        metadata: CycloneDxMetadata {
            tools: vec![CycloneDxTool {
                name: env!("CARGO_PKG_NAME"),
                version: env!("CARGO_PKG_VERSION"),
            }],
        },
        components: result.records.iter().map(component).collect(),
    };
    Ok(serde_json::to_string_pretty(&bom)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbom_inventory::Ecosystem;

    fn sample_result() -> SbomResult {
        let mut serde = DependencyRecord::new(
            Ecosystem::Cargo,
            "serde",
            "1.0.204",
            Scope::Runtime,
            true,
            "Cargo.toml",
        );
        serde.scope.insert(Scope::Dev);
        let local = DependencyRecord::new(Ecosystem::Npm, "local", "", Scope::Dev, true, "package.json")
            .with_path("../local");

        SbomResult {
            records: vec![serde, local],
            ..SbomResult::default()
        }
    }

    #[test]
    fn test_render_bom_header() {
        let json: serde_json::Value =
            serde_json::from_str(&render(&sample_result()).unwrap()).unwrap();
        assert_eq!(json["bomFormat"], "CycloneDX");
        assert_eq!(json["specVersion"], "1.5");
        assert_eq!(json["version"], 1);
        assert_eq!(json["metadata"]["tools"][0]["name"], "sbom-inventory");
        assert_eq!(json["components"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_component_scope_and_properties() {
        let json: serde_json::Value =
            serde_json::from_str(&render(&sample_result()).unwrap()).unwrap();

        let serde = &json["components"][0];
        assert_eq!(serde["type"], "library");
        assert_eq!(serde["purl"], "pkg:cargo/serde@1.0.204");
        assert_eq!(serde["bom-ref"], "pkg:cargo/serde@1.0.204");
        assert_eq!(serde["scope"], "required");
        assert_eq!(serde["properties"][0]["name"], "sbom-inventory:direct");
        assert_eq!(serde["properties"][0]["value"], "true");
        assert_eq!(serde["properties"][1]["value"], "runtime,dev");

        let local = &json["components"][1];
        assert_eq!(local["scope"], "optional");
        assert!(local.get("version").is_none());
        assert_eq!(local["purl"], "pkg:npm/local");
    }
}
