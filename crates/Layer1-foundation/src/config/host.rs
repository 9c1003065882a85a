//! Host Config - plugin runtime settings
//!
//! Loaded from `plughost.json`, global first and then the project file, the
//! project layer overriding only the keys it sets.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Config file name
pub const HOST_CONFIG_FILE: &str = "plughost.json";

/// Host API version plugins are checked against when nothing is configured
pub const DEFAULT_HOST_VERSION: &str = "1.0.0";

// ============================================================================
// HostConfig
// ============================================================================

/// Plugin host runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// File format version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Host version matched against each manifest's `hostVersionRange`
    #[serde(default = "default_host_version")]
    pub host_version: String,

    /// Script sandbox limits
    #[serde(default)]
    pub sandbox: SandboxLimits,

    /// Hook dispatch settings
    #[serde(default)]
    pub hooks: HookSettings,

    /// Plugin manager settings
    #[serde(default)]
    pub plugins: PluginSettings,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            host_version: default_host_version(),
            sandbox: SandboxLimits::default(),
            hooks: HookSettings::default(),
            plugins: PluginSettings::default(),
        }
    }
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// Global + project merged load
    pub fn load() -> Result<Self> {
        let mut layers = Vec::new();
        if let Ok(global) = JsonStore::global() {
            layers.push(global);
        }
        if let Ok(project) = JsonStore::current_project() {
            layers.push(project);
        }
        Self::load_layers(&layers)
    }

    /// Merge every layer that has a config file, later layers win
    pub fn load_layers(stores: &[JsonStore]) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;

        for store in stores {
            if let Some(layer) = store.load_optional::<Value>(HOST_CONFIG_FILE)? {
                debug!(
                    "Merging host config from {}",
                    store.file_path(HOST_CONFIG_FILE).display()
                );
                merge_json(&mut merged, layer);
            }
        }

        let config: HostConfig = serde_json::from_value(merged)
            .map_err(|e| Error::Config(format!("Invalid {}: {}", HOST_CONFIG_FILE, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to the user-level store
    pub fn save_global(&self) -> Result<()> {
        JsonStore::global()?.save(HOST_CONFIG_FILE, self)
    }

    /// Reject limits that would make every plugin fail
    pub fn validate(&self) -> Result<()> {
        if self.host_version.trim().is_empty() {
            return Err(Error::Config("hostVersion must not be empty".into()));
        }
        if self.sandbox.max_operations == 0 {
            return Err(Error::Config("sandbox.maxOperations must be > 0".into()));
        }
        let containers = self.sandbox.max_array_size.saturating_add(self.sandbox.max_map_size);
        if self.sandbox.max_array_size == 0
            || self.sandbox.max_map_size == 0
            || containers > MAX_CONTAINER_ELEMENTS
        {
            return Err(Error::Config(format!(
                "sandbox.maxArraySize and sandbox.maxMapSize must be > 0 and add up to at most {}",
                MAX_CONTAINER_ELEMENTS
            )));
        }
        if self.sandbox.max_source_bytes == 0 {
            return Err(Error::Config("sandbox.maxSourceBytes must be > 0".into()));
        }
        if self.hooks.max_result_depth == 0 {
            return Err(Error::Config("hooks.maxResultDepth must be > 0".into()));
        }
        Ok(())
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn with_host_version(mut self, version: impl Into<String>) -> Self {
        self.host_version = version.into();
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxLimits) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_hooks(mut self, hooks: HookSettings) -> Self {
        self.hooks = hooks;
        self
    }
}

// ============================================================================
// SandboxLimits
// ============================================================================

/// Upper bound for `maxArraySize + maxMapSize`
///
/// Nested arrays and maps count toward these limits, so their sum is also the
/// deepest value a script can build. Script calls run on a stack sized for it.
pub const MAX_CONTAINER_ELEMENTS: usize = 8_192;

/// Resource limits applied to every plugin script engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxLimits {
    /// Operations a single evaluation or call may perform
    pub max_operations: u64,
    /// Function call nesting
    pub max_call_levels: usize,
    /// Expression nesting (statements and function bodies)
    pub max_expr_depth: usize,
    /// Longest string a script may build
    pub max_string_size: usize,
    /// Largest array a script may build, nested arrays included
    pub max_array_size: usize,
    /// Largest object map a script may build, nested maps included
    pub max_map_size: usize,
    /// Largest accepted plugin source
    pub max_source_bytes: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 32,
            max_expr_depth: 64,
            max_string_size: 1024 * 1024,
            max_array_size: 1_024,
            max_map_size: 1_024,
            max_source_bytes: 512 * 1024,
        }
    }
}

// ============================================================================
// HookSettings
// ============================================================================

/// Hook dispatch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HookSettings {
    /// Priority used by `hooks.register(name, handler)` without a priority
    pub default_priority: i32,
    /// Maximum nesting of container/list hook results
    pub max_result_depth: usize,
    /// Per-handler timeout in milliseconds (`null` disables it)
    pub handler_timeout_ms: Option<u64>,
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            default_priority: 100,
            max_result_depth: 8,
            handler_timeout_ms: Some(5_000),
        }
    }
}

impl HookSettings {
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }
}

// ============================================================================
// PluginSettings
// ============================================================================

/// Plugin manager settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginSettings {
    /// Enabled state for external plugins the user never toggled
    pub enable_external_by_default: bool,
    /// Lifecycle events kept in the event history
    pub event_history_size: usize,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            enable_external_by_default: true,
            event_history_size: 100,
        }
    }
}

fn default_version() -> u32 {
    1
}

fn default_host_version() -> String {
    DEFAULT_HOST_VERSION.to_string()
}

/// Deep-merge `overlay` into `base`; objects merge per key, everything else is replaced
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert_eq!(config.host_version, DEFAULT_HOST_VERSION);
        assert_eq!(config.hooks.default_priority, 100);
        assert_eq!(config.hooks.handler_timeout(), Some(Duration::from_secs(5)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_layers_override_only_set_keys() {
        let global = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();

        JsonStore::new(global.path())
            .save(
                HOST_CONFIG_FILE,
                &json!({ "hostVersion": "2.1.0", "sandbox": { "maxOperations": 500 } }),
            )
            .unwrap();
        JsonStore::new(project.path())
            .save(HOST_CONFIG_FILE, &json!({ "sandbox": { "maxCallLevels": 8 } }))
            .unwrap();

        let config = HostConfig::load_layers(&[
            JsonStore::new(global.path()),
            JsonStore::new(project.path()),
        ])
        .unwrap();

        assert_eq!(config.host_version, "2.1.0");
        assert_eq!(config.sandbox.max_operations, 500);
        assert_eq!(config.sandbox.max_call_levels, 8);
        assert_eq!(config.sandbox.max_map_size, SandboxLimits::default().max_map_size);
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let dir = TempDir::new().unwrap();
        JsonStore::new(dir.path())
            .save(HOST_CONFIG_FILE, &json!({ "hooks": { "maxResultDepth": 0 } }))
            .unwrap();

        let err = HostConfig::load_layers(&[JsonStore::new(dir.path())]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_container_limits_bounded() {
        let unlimited = HostConfig::default().with_sandbox(SandboxLimits {
            max_array_size: 0,
            ..SandboxLimits::default()
        });
        assert!(matches!(unlimited.validate(), Err(Error::Config(_))));

        let too_large = HostConfig::default().with_sandbox(SandboxLimits {
            max_array_size: MAX_CONTAINER_ELEMENTS,
            max_map_size: 1,
            ..SandboxLimits::default()
        });
        assert!(matches!(too_large.validate(), Err(Error::Config(_))));

        let at_bound = HostConfig::default().with_sandbox(SandboxLimits {
            max_array_size: MAX_CONTAINER_ELEMENTS / 2,
            max_map_size: MAX_CONTAINER_ELEMENTS / 2,
            ..SandboxLimits::default()
        });
        assert!(at_bound.validate().is_ok());
    }
}
