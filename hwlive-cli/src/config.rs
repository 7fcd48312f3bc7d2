//! Loading `main.json`

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use hwlive_core::resource::{Resource, ResourceId, Value};
use hwlive_core::schema::{ResourceSchema, SchemaKind};
use hwlive_provider::Config;
use hwlive_provider::schemas;
use hwlive_state::BackendConfig;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    provider: Config,
    #[serde(default)]
    backend: Option<serde_json::Value>,
    #[serde(default)]
    resources: Vec<BlockDecl>,
    #[serde(default)]
    data: Vec<BlockDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockDecl {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

/// A configuration file after decoding and schema normalization
#[derive(Debug)]
pub struct ParsedConfig {
    /// Provider settings as written; environment overrides are applied later
    pub provider: Config,
    pub backend: BackendConfig,
    pub resources: Vec<Resource>,
    pub data: Vec<Resource>,
}

impl ParsedConfig {
    /// Resources followed by data sources, in file order
    pub fn all_blocks(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().chain(self.data.iter())
    }

    pub fn find_data(&self, id: &ResourceId) -> Option<&Resource> {
        self.data.iter().find(|r| &r.id == id)
    }
}

pub fn get_schemas() -> HashMap<String, ResourceSchema> {
    schemas::all_schemas()
        .into_iter()
        .map(|schema| (schema.resource_type.clone(), schema))
        .collect()
}

pub fn load(path: &Path) -> Result<ParsedConfig, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Backend settings of a configuration file, or the local default when there is no file
pub fn load_backend(path: &Path) -> Result<BackendConfig, String> {
    if !path.exists() {
        return Ok(BackendConfig::local());
    }
    Ok(load(path)?.backend)
}

pub fn parse(content: &str) -> Result<ParsedConfig, String> {
    let file: ConfigFile =
        serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;
    let schemas = get_schemas();

    let backend = match &file.backend {
        Some(value) => BackendConfig::from_json(value).map_err(|e| e.to_string())?,
        None => BackendConfig::local(),
    };

    let mut seen = HashSet::new();
    let mut resources = Vec::new();
    for decl in file.resources {
        resources.push(build(decl, false, &schemas, &mut seen)?);
    }
    let mut data = Vec::new();
    for decl in file.data {
        data.push(build(decl, true, &schemas, &mut seen)?);
    }

    Ok(ParsedConfig {
        provider: file.provider,
        backend,
        resources,
        data,
    })
}

fn build(
    decl: BlockDecl,
    read_only: bool,
    schemas: &HashMap<String, ResourceSchema>,
    seen: &mut HashSet<ResourceId>,
) -> Result<Resource, String> {
    let id = ResourceId::new(&decl.resource_type, &decl.name);
    if decl.name.is_empty() || decl.name.contains('.') {
        return Err(format!("Invalid name '{}' for {}", decl.name, decl.resource_type));
    }

    let schema = schemas
        .get(&decl.resource_type)
        .ok_or_else(|| format!("{}: unknown type '{}'", id, decl.resource_type))?;
    let expected = if read_only {
        SchemaKind::Data
    } else {
        SchemaKind::Managed
    };
    if schema.kind != expected {
        let section = if read_only { "data" } else { "resources" };
        return Err(format!("{}: '{}' cannot be declared under '{}'", id, decl.resource_type, section));
    }

    if !seen.insert(id.clone()) {
        return Err(format!("{}: declared more than once", id));
    }

    let mut attributes: HashMap<String, Value> = decl
        .attributes
        .iter()
        .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
        .collect();
    schema.block.normalize(&mut attributes);

    Ok(Resource {
        id,
        attributes,
        read_only,
    })
}

/// Validate every block against its schema, collecting all errors
pub fn validate(parsed: &ParsedConfig) -> Result<(), String> {
    let schemas = get_schemas();
    let mut all_errors = Vec::new();

    for resource in parsed.all_blocks() {
        if let Some(schema) = schemas.get(&resource.id.resource_type)
            && let Err(errors) = schema.validate(&resource.attributes)
        {
            for error in errors {
                all_errors.push(format!("{}: {}", resource.id, error));
            }
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors.join("\n"))
    }
}

/// Fill in the provider region for resources that do not name one
pub fn apply_default_region(parsed: &mut ParsedConfig, region: &str) {
    if region.is_empty() {
        return;
    }
    for resource in &mut parsed.resources {
        resource
            .attributes
            .entry("region".to_string())
            .or_insert_with(|| Value::String(region.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "provider": { "region": "cn-north-4", "project_id": "p-1" },
        "backend": { "type": "local", "path": "live.state.json" },
        "resources": [
            {
                "type": "live_channel",
                "name": "main",
                "attributes": {
                    "domain_name": "play.example.com",
                    "app_name": "live",
                    "state": "ON",
                    "name": null,
                    "input": {
                        "input_protocol": "RTMP_PUSH",
                        "sources": { "url": "rtmp://origin/live" }
                    }
                }
            }
        ],
        "data": [
            { "type": "live_channels", "name": "all", "attributes": { "domain_name": "play.example.com" } }
        ]
    }"#;

    #[test]
    fn parses_sections() {
        let parsed = parse(SAMPLE).unwrap();
        assert_eq!(parsed.provider.region, "cn-north-4");
        assert_eq!(parsed.provider.project_id.as_deref(), Some("p-1"));
        assert_eq!(parsed.backend.get_string("path"), Some("live.state.json"));
        assert_eq!(parsed.resources.len(), 1);
        assert_eq!(parsed.data.len(), 1);
        assert!(parsed.data[0].read_only);
        assert!(!parsed.resources[0].read_only);
        assert!(parsed.find_data(&ResourceId::new("live_channels", "all")).is_some());
    }

    #[test]
    fn nulls_are_dropped_and_blocks_wrapped() {
        let parsed = parse(SAMPLE).unwrap();
        let channel = &parsed.resources[0];
        assert!(!channel.attributes.contains_key("name"));

        let input = channel.attributes["input"].as_list().unwrap();
        assert_eq!(input.len(), 1);
        let sources = input[0].as_map().unwrap()["sources"].as_list().unwrap();
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn missing_backend_defaults_to_local() {
        let parsed = parse(r#"{"resources": []}"#).unwrap();
        assert_eq!(parsed.backend.backend_type, "local");
        assert!(parsed.backend.get_string("path").is_none());
    }

    #[test]
    fn rejects_unknown_types_and_duplicates() {
        let unknown = r#"{"resources": [{"type": "live_stream", "name": "a"}]}"#;
        assert!(parse(unknown).unwrap_err().contains("unknown type 'live_stream'"));

        let duplicate = r#"{"resources": [
            {"type": "live_channel", "name": "a"},
            {"type": "live_channel", "name": "a"}
        ]}"#;
        assert!(parse(duplicate).unwrap_err().contains("declared more than once"));

        let misplaced = r#"{"data": [{"type": "live_channel", "name": "a"}]}"#;
        assert!(parse(misplaced).unwrap_err().contains("cannot be declared under 'data'"));

        let dotted = r#"{"resources": [{"type": "live_channel", "name": "a.b"}]}"#;
        assert!(parse(dotted).unwrap_err().contains("Invalid name"));
    }

    #[test]
    fn validation_reports_every_error() {
        let parsed = parse(
            r#"{"resources": [
                {"type": "live_channel", "name": "a", "attributes": {"state": "MAYBE"}},
                {"type": "live_channel", "name": "b", "attributes": {}}
            ]}"#,
        )
        .unwrap();
        let errors = validate(&parsed).unwrap_err();
        assert!(errors.contains("live_channel.a"));
        assert!(errors.contains("live_channel.b"));
    }

    #[test]
    fn default_region_fills_only_missing() {
        let mut parsed = parse(
            r#"{"resources": [
                {"type": "live_channel", "name": "a"},
                {"type": "live_channel", "name": "b", "attributes": {"region": "ap-southeast-1"}}
            ]}"#,
        )
        .unwrap();
        apply_default_region(&mut parsed, "cn-north-4");
        assert_eq!(parsed.resources[0].attributes["region"], Value::from("cn-north-4"));
        assert_eq!(parsed.resources[1].attributes["region"], Value::from("ap-southeast-1"));
    }
}
