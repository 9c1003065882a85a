//! Persisted plugin state
//!
//! The host persists two things per plugin id: whether the user enabled it
//! and its config value map. [`SettingsStore`] is the seam the storage
//! technology plugs into; the two stores here cover tests and the CLI.

use super::json::JsonStore;
use crate::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Plugin config values keyed by field key
pub type ConfigValues = Map<String, Value>;

/// File name used by [`JsonSettingsStore`]
pub const PLUGIN_STATE_FILE: &str = "plugins.json";

// ============================================================================
// PersistedPluginState
// ============================================================================

/// Everything the host persists about plugins
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedPluginState {
    /// Enabled flag per plugin id
    #[serde(default)]
    pub enabled: BTreeMap<String, bool>,

    /// Config values per plugin id
    #[serde(default)]
    pub config: BTreeMap<String, ConfigValues>,
}

// ============================================================================
// SettingsStore
// ============================================================================

/// Storage collaborator for persisted plugin state
///
/// Calls are expected to be short and bounded: plugin scripts reach
/// `save_config` synchronously through `config.set`.
pub trait SettingsStore: Send + Sync {
    /// Persisted enabled flag, `None` if the user never toggled the plugin
    fn load_enabled(&self, plugin_id: &str) -> Result<Option<bool>>;

    fn save_enabled(&self, plugin_id: &str, enabled: bool) -> Result<()>;

    /// Persisted config map, empty if nothing was saved
    fn load_config(&self, plugin_id: &str) -> Result<ConfigValues>;

    /// Replace the persisted config map in a single write
    fn save_config(&self, plugin_id: &str, values: &ConfigValues) -> Result<()>;

    /// Forget everything stored for a plugin
    fn remove_plugin(&self, plugin_id: &str) -> Result<()>;
}

// ============================================================================
// MemorySettingsStore
// ============================================================================

/// In-process store
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    state: RwLock<PersistedPluginState>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing state
    pub fn with_state(state: PersistedPluginState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> PersistedPluginState {
        self.state.read().clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load_enabled(&self, plugin_id: &str) -> Result<Option<bool>> {
        Ok(self.state.read().enabled.get(plugin_id).copied())
    }

    fn save_enabled(&self, plugin_id: &str, enabled: bool) -> Result<()> {
        self.state
            .write()
            .enabled
            .insert(plugin_id.to_string(), enabled);
        Ok(())
    }

    fn load_config(&self, plugin_id: &str) -> Result<ConfigValues> {
        Ok(self
            .state
            .read()
            .config
            .get(plugin_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_config(&self, plugin_id: &str, values: &ConfigValues) -> Result<()> {
        self.state
            .write()
            .config
            .insert(plugin_id.to_string(), values.clone());
        Ok(())
    }

    fn remove_plugin(&self, plugin_id: &str) -> Result<()> {
        let mut state = self.state.write();
        state.enabled.remove(plugin_id);
        state.config.remove(plugin_id);
        Ok(())
    }
}

// ============================================================================
// JsonSettingsStore
// ============================================================================

/// `plugins.json` backed store with an in-memory cache
pub struct JsonSettingsStore {
    store: JsonStore,
    cache: RwLock<PersistedPluginState>,
}

impl JsonSettingsStore {
    /// Open (or lazily create) `plugins.json` inside the given store
    pub fn open(store: JsonStore) -> Result<Self> {
        let state = store
            .load_optional::<PersistedPluginState>(PLUGIN_STATE_FILE)?
            .unwrap_or_default();
        debug!(
            "Loaded plugin state from {} ({} plugins)",
            store.file_path(PLUGIN_STATE_FILE).display(),
            state.enabled.len().max(state.config.len())
        );
        Ok(Self {
            store,
            cache: RwLock::new(state),
        })
    }

    /// Apply a mutation and write the file; the cache only changes when the write succeeds
    fn update(&self, mutate: impl FnOnce(&mut PersistedPluginState)) -> Result<()> {
        let mut cache = self.cache.write();
        let mut next = cache.clone();
        mutate(&mut next);
        self.store.save(PLUGIN_STATE_FILE, &next)?;
        *cache = next;
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load_enabled(&self, plugin_id: &str) -> Result<Option<bool>> {
        Ok(self.cache.read().enabled.get(plugin_id).copied())
    }

    fn save_enabled(&self, plugin_id: &str, enabled: bool) -> Result<()> {
        self.update(|state| {
            state.enabled.insert(plugin_id.to_string(), enabled);
        })
    }

    fn load_config(&self, plugin_id: &str) -> Result<ConfigValues> {
        Ok(self
            .cache
            .read()
            .config
            .get(plugin_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_config(&self, plugin_id: &str, values: &ConfigValues) -> Result<()> {
        self.update(|state| {
            state.config.insert(plugin_id.to_string(), values.clone());
        })
    }

    fn remove_plugin(&self, plugin_id: &str) -> Result<()> {
        self.update(|state| {
            state.enabled.remove(plugin_id);
            state.config.remove(plugin_id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn values(v: Value) -> ConfigValues {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemorySettingsStore::new();
        assert_eq!(store.load_enabled("a").unwrap(), None);

        store.save_enabled("a", false).unwrap();
        store.save_config("a", &values(json!({ "retries": 4 }))).unwrap();

        assert_eq!(store.load_enabled("a").unwrap(), Some(false));
        assert_eq!(store.load_config("a").unwrap()["retries"], json!(4));

        store.remove_plugin("a").unwrap();
        assert!(store.load_config("a").unwrap().is_empty());
        assert_eq!(store.snapshot(), PersistedPluginState::default());
    }

    #[test]
    fn test_json_store_persists_across_instances() {
        let temp = TempDir::new().unwrap();
        let store = JsonSettingsStore::open(JsonStore::new(temp.path())).unwrap();
        store.save_enabled("demo", true).unwrap();
        store
            .save_config("demo", &values(json!({ "mode": "fast" })))
            .unwrap();

        let reopened = JsonSettingsStore::open(JsonStore::new(temp.path())).unwrap();
        assert_eq!(reopened.load_enabled("demo").unwrap(), Some(true));
        assert_eq!(reopened.load_config("demo").unwrap()["mode"], json!("fast"));

        let raw = std::fs::read_to_string(temp.path().join(PLUGIN_STATE_FILE)).unwrap();
        assert!(raw.contains("\"enabled\""));
    }
}
