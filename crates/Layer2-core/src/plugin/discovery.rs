//! Plugin Discovery - input of the plugin manager
//!
//! Enumerating plugin folders belongs to the host. The manager only
//! consumes `(manifest, source, is_external)` entries from a
//! [`PluginSource`] and asks it again for a single plugin on reload.

use async_trait::async_trait;
use parking_lot::RwLock;
use plughost_foundation::{Error, Result};
use serde_json::Value;

// ============================================================================
// DiscoveredPlugin
// ============================================================================

/// Raw plugin as found by the host, not yet validated
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    /// Manifest as structured data
    pub manifest: Value,

    /// Script text
    pub source: String,

    /// Installed by the user rather than bundled with the host
    pub is_external: bool,
}

impl DiscoveredPlugin {
    pub fn external(manifest: Value, source: impl Into<String>) -> Self {
        Self {
            manifest,
            source: source.into(),
            is_external: true,
        }
    }

    pub fn bundled(manifest: Value, source: impl Into<String>) -> Self {
        Self {
            manifest,
            source: source.into(),
            is_external: false,
        }
    }

    /// `id` as written in the raw manifest, if any
    pub fn declared_id(&self) -> Option<&str> {
        self.manifest.get("id").and_then(Value::as_str)
    }
}

// ============================================================================
// PluginSource
// ============================================================================

#[async_trait]
pub trait PluginSource: Send + Sync {
    /// Every plugin currently available, in load order
    async fn discover(&self) -> Result<Vec<DiscoveredPlugin>>;

    /// Fresh manifest and source of one plugin
    async fn rediscover(&self, id: &str) -> Result<DiscoveredPlugin>;
}

/// In-memory source
///
/// Entries keep insertion order; `replace` swaps an entry in place so a
/// following reload picks it up.
#[derive(Default)]
pub struct StaticPluginSource {
    entries: RwLock<Vec<DiscoveredPlugin>>,
}

impl StaticPluginSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugins(plugins: Vec<DiscoveredPlugin>) -> Self {
        Self {
            entries: RwLock::new(plugins),
        }
    }

    pub fn insert(&self, plugin: DiscoveredPlugin) {
        self.entries.write().push(plugin);
    }

    /// Replace the entry with the same declared id, or append
    pub fn replace(&self, plugin: DiscoveredPlugin) {
        let mut entries = self.entries.write();
        let existing = plugin
            .declared_id()
            .and_then(|id| entries.iter().position(|e| e.declared_id() == Some(id)));
        match existing {
            Some(index) => entries[index] = plugin,
            None => entries.push(plugin),
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.declared_id() != Some(id));
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl PluginSource for StaticPluginSource {
    async fn discover(&self) -> Result<Vec<DiscoveredPlugin>> {
        Ok(self.entries.read().clone())
    }

    async fn rediscover(&self, id: &str) -> Result<DiscoveredPlugin> {
        self.entries
            .read()
            .iter()
            .find(|e| e.declared_id() == Some(id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("plugin source for '{}'", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replace_keeps_position() {
        let source = StaticPluginSource::new();
        source.insert(DiscoveredPlugin::external(json!({"id": "a"}), "v1"));
        source.insert(DiscoveredPlugin::external(json!({"id": "b"}), "v1"));

        source.replace(DiscoveredPlugin::external(json!({"id": "a"}), "v2"));

        let all = source.discover().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].source, "v2");
        assert_eq!(source.rediscover("a").await.unwrap().source, "v2");
    }

    #[tokio::test]
    async fn test_rediscover_missing() {
        let source = StaticPluginSource::new();
        assert!(matches!(
            source.rediscover("ghost").await,
            Err(Error::NotFound(_))
        ));

        source.insert(DiscoveredPlugin::bundled(json!({"id": "x"}), ""));
        assert!(source.remove("x"));
        assert!(source.is_empty());
    }
}
