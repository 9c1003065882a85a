//! Plugin Manifest - declared identity, capabilities and config schema
//!
//! Manifests arrive as raw JSON (camelCase keys). [`parse_manifest`] checks
//! every field and reports all problems at once so a plugin author can fix
//! the whole file in one pass.

use lazy_static::lazy_static;
use plughost_foundation::{Error, Result};
use regex::Regex;
use semver::{Version, VersionReq};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::schema::{json_type, ConfigSchema};

lazy_static! {
    static ref PLUGIN_ID: Regex = Regex::new(r"^[a-z0-9][a-z0-9._-]*$").unwrap();
}

// ============================================================================
// CapabilityType
// ============================================================================

/// Role a plugin declares; decides which instance methods the host expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityType {
    Render,
    MessageTransform,
    Tool,
    Storage,
    UiExtension,
}

impl CapabilityType {
    pub const ALL: [CapabilityType; 5] = [
        Self::Render,
        Self::MessageTransform,
        Self::Tool,
        Self::Storage,
        Self::UiExtension,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::MessageTransform => "message-transform",
            Self::Tool => "tool",
            Self::Storage => "storage",
            Self::UiExtension => "ui-extension",
        }
    }
}

impl fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown capability '{}'", s))
    }
}

// ============================================================================
// PluginManifest
// ============================================================================

/// Validated plugin manifest
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// Globally unique id (`^[a-z0-9][a-z0-9._-]*$`)
    pub id: String,

    /// Display name
    pub name: String,

    pub version: Version,

    pub description: String,

    pub author: String,

    /// Declared capabilities, deduplicated in declaration order
    #[serde(rename = "capabilityTypes")]
    pub capabilities: Vec<CapabilityType>,

    /// Host versions this plugin runs on
    pub host_version_range: VersionReq,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    /// Ids of plugins this one expects to be present
    pub dependencies: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<ConfigSchema>,

    /// Bundled and mandatory; can never be disabled
    pub is_core: bool,
}

impl PluginManifest {
    pub fn has_capability(&self, capability: CapabilityType) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Whether the host version satisfies `hostVersionRange`
    pub fn is_compatible_with(&self, host_version: &Version) -> bool {
        self.host_version_range.matches(host_version)
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse and validate a raw manifest
///
/// Pure function: never touches storage or runs plugin code.
pub fn parse_manifest(raw: &Value) -> Result<PluginManifest> {
    let object = raw.as_object().ok_or_else(|| {
        Error::ManifestValidation(format!("manifest must be an object, got {}", json_type(raw)))
    })?;

    let mut issues = Vec::new();

    let id = required_string(object, "id", &mut issues);
    if let Some(id) = &id {
        if !PLUGIN_ID.is_match(id) {
            issues.push(format!(
                "id '{}' must match ^[a-z0-9][a-z0-9._-]*$",
                id
            ));
        }
    }

    let name = required_string(object, "name", &mut issues);
    let description = required_string(object, "description", &mut issues);
    let author = required_string(object, "author", &mut issues);

    let version = required_string(object, "version", &mut issues).and_then(|v| {
        Version::parse(&v)
            .map_err(|e| issues.push(format!("version '{}' is not a semantic version: {}", v, e)))
            .ok()
    });

    let host_version_range =
        required_string(object, "hostVersionRange", &mut issues).and_then(|r| {
            VersionReq::parse(&r)
                .map_err(|e| {
                    issues.push(format!(
                        "hostVersionRange '{}' is not a version requirement: {}",
                        r, e
                    ))
                })
                .ok()
        });

    let capabilities = parse_capabilities(object.get("capabilityTypes"), &mut issues);

    let homepage = optional_string(object, "homepage", &mut issues);

    let dependencies = match object.get("dependencies") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let mut deps = Vec::with_capacity(items.len());
            for item in items {
                match item.as_str() {
                    Some(dep) => deps.push(dep.to_string()),
                    None => issues.push(format!("dependencies entries must be strings, got {}", item)),
                }
            }
            deps
        }
        Some(other) => {
            issues.push(format!(
                "dependencies must be an array, got {}",
                json_type(other)
            ));
            Vec::new()
        }
    };

    let config_schema = match object.get("configSchema") {
        None | Some(Value::Null) => None,
        Some(raw) => match ConfigSchema::from_value(raw) {
            Ok(schema) => Some(schema),
            Err(mut schema_issues) => {
                issues.append(&mut schema_issues);
                None
            }
        },
    };

    let is_core = match object.get("isCore") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            issues.push(format!("isCore must be a boolean, got {}", json_type(other)));
            false
        }
    };

    match (id, name, version, description, author, host_version_range) {
        (Some(id), Some(name), Some(version), Some(description), Some(author), Some(range))
            if issues.is_empty() =>
        {
            Ok(PluginManifest {
                id,
                name,
                version,
                description,
                author,
                capabilities,
                host_version_range: range,
                homepage,
                dependencies,
                config_schema,
                is_core,
            })
        }
        _ => Err(Error::ManifestValidation(issues.join("; "))),
    }
}

fn required_string(
    object: &Map<String, Value>,
    key: &str,
    issues: &mut Vec<String>,
) -> Option<String> {
    match object.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::String(_)) => {
            issues.push(format!("{} must not be empty", key));
            None
        }
        Some(other) => {
            issues.push(format!("{} must be a string, got {}", key, json_type(other)));
            None
        }
        None => {
            issues.push(format!("missing required field '{}'", key));
            None
        }
    }
}

fn optional_string(
    object: &Map<String, Value>,
    key: &str,
    issues: &mut Vec<String>,
) -> Option<String> {
    match object.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            issues.push(format!("{} must be a string, got {}", key, json_type(other)));
            None
        }
    }
}

fn parse_capabilities(raw: Option<&Value>, issues: &mut Vec<String>) -> Vec<CapabilityType> {
    let items = match raw {
        Some(Value::Array(items)) => items,
        Some(other) => {
            issues.push(format!(
                "capabilityTypes must be an array, got {}",
                json_type(other)
            ));
            return Vec::new();
        }
        None => {
            issues.push("missing required field 'capabilityTypes'".to_string());
            return Vec::new();
        }
    };

    let mut capabilities = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str().map(CapabilityType::from_str) {
            Some(Ok(cap)) => {
                if !capabilities.contains(&cap) {
                    capabilities.push(cap);
                }
            }
            Some(Err(e)) => issues.push(format!("capabilityTypes: {}", e)),
            None => issues.push(format!("capabilityTypes entries must be strings, got {}", item)),
        }
    }

    if items.is_empty() {
        issues.push("capabilityTypes must declare at least one capability".to_string());
    }
    capabilities
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "id": "acme.footer",
            "name": "Footer",
            "version": "1.2.0",
            "description": "Adds a footer",
            "author": "Acme",
            "capabilityTypes": ["render", "ui-extension", "render"],
            "hostVersionRange": ">=1.0.0, <2.0.0"
        })
    }

    #[test]
    fn test_parse_valid_manifest() {
        let manifest = parse_manifest(&base()).unwrap();
        assert_eq!(manifest.id, "acme.footer");
        assert_eq!(manifest.version, Version::new(1, 2, 0));
        assert_eq!(
            manifest.capabilities,
            vec![CapabilityType::Render, CapabilityType::UiExtension]
        );
        assert!(!manifest.is_core);
        assert!(manifest.dependencies.is_empty());
        assert!(manifest.config_schema.is_none());
    }

    #[test]
    fn test_host_compatibility() {
        let manifest = parse_manifest(&base()).unwrap();
        assert!(manifest.is_compatible_with(&Version::new(1, 4, 0)));
        assert!(!manifest.is_compatible_with(&Version::new(2, 0, 0)));
    }

    #[test]
    fn test_collects_all_issues() {
        let mut raw = base();
        raw["id"] = json!("Bad Id");
        raw["version"] = json!("one");
        raw["capabilityTypes"] = json!(["teleport"]);
        raw.as_object_mut().unwrap().remove("author");

        let err = parse_manifest(&raw).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, Error::ManifestValidation(_)));
        assert!(message.contains("id 'Bad Id'"));
        assert!(message.contains("not a semantic version"));
        assert!(message.contains("unknown capability 'teleport'"));
        assert!(message.contains("missing required field 'author'"));
    }

    #[test]
    fn test_empty_capabilities_rejected() {
        let mut raw = base();
        raw["capabilityTypes"] = json!([]);
        let err = parse_manifest(&raw).unwrap_err();
        assert!(err.to_string().contains("at least one capability"));
    }

    #[test]
    fn test_schema_issues_reported() {
        let mut raw = base();
        raw["configSchema"] = json!({
            "retries": { "type": "number", "min": 5, "max": 1 },
            "mode": { "type": "choice", "options": ["a"], "default": "b" }
        });
        let message = parse_manifest(&raw).unwrap_err().to_string();
        assert!(message.contains("configSchema.retries"));
        assert!(message.contains("configSchema.mode"));
    }

    #[test]
    fn test_optional_fields() {
        let mut raw = base();
        raw["homepage"] = json!("https://example.com");
        raw["dependencies"] = json!(["acme.base"]);
        raw["isCore"] = json!(true);
        raw["configSchema"] = json!({ "retries": { "type": "number", "default": 3 } });

        let manifest = parse_manifest(&raw).unwrap();
        assert_eq!(manifest.homepage.as_deref(), Some("https://example.com"));
        assert_eq!(manifest.dependencies, vec!["acme.base".to_string()]);
        assert!(manifest.is_core);
        assert_eq!(manifest.config_schema.unwrap().len(), 1);
    }

    #[test]
    fn test_non_object() {
        assert!(matches!(
            parse_manifest(&json!("nope")),
            Err(Error::ManifestValidation(_))
        ));
    }
}
