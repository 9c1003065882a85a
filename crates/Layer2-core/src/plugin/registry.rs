//! Plugin Registry - records owned by the manager

use plughost_foundation::{Error, Result};
use semver::Version;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::manifest::{CapabilityType, PluginManifest};
use super::traits::PluginStatus;
use crate::executor::ScriptPlugin;

// ============================================================================
// PluginRecord
// ============================================================================

/// Manager-side state of one plugin id
#[derive(Clone)]
pub struct PluginRecord {
    pub manifest: PluginManifest,

    /// Live instance, `None` when instantiation failed
    pub instance: Option<Arc<ScriptPlugin>>,

    pub enabled: bool,

    pub loaded: bool,

    /// `on_load` already ran for the current instance
    pub initialized: bool,

    /// Most recent failure attributed to the plugin
    pub last_error: Option<String>,

    pub is_external: bool,

    /// Registration order, kept across reloads
    pub load_order: usize,
}

impl PluginRecord {
    /// Record of a freshly instantiated plugin, not yet enabled
    pub fn loaded(manifest: PluginManifest, instance: Arc<ScriptPlugin>, is_external: bool) -> Self {
        Self {
            manifest,
            instance: Some(instance),
            enabled: false,
            loaded: true,
            initialized: false,
            last_error: None,
            is_external,
            load_order: 0,
        }
    }

    /// Record of a plugin that never reached `loaded`
    pub fn failed(manifest: PluginManifest, error: impl Into<String>, is_external: bool) -> Self {
        Self {
            manifest,
            instance: None,
            enabled: false,
            loaded: false,
            initialized: false,
            last_error: Some(error.into()),
            is_external,
            load_order: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn status(&self) -> PluginStatus {
        if !self.loaded {
            PluginStatus::Failed
        } else if self.enabled {
            PluginStatus::Active
        } else {
            PluginStatus::Disabled
        }
    }

    /// Enabled, loaded and declaring `capability`
    pub fn serves(&self, capability: CapabilityType) -> bool {
        self.enabled && self.loaded && self.manifest.has_capability(capability)
    }

    pub fn view(&self) -> PluginRecordView {
        PluginRecordView {
            id: self.manifest.id.clone(),
            name: self.manifest.name.clone(),
            version: self.manifest.version.clone(),
            description: self.manifest.description.clone(),
            capabilities: self.manifest.capabilities.clone(),
            enabled: self.enabled,
            loaded: self.loaded,
            is_core: self.manifest.is_core,
            is_external: self.is_external,
            last_error: self.last_error.clone(),
            status: self.status(),
            toolbar_buttons: self
                .instance
                .as_ref()
                .map(|i| i.toolbar_buttons())
                .unwrap_or_default(),
        }
    }
}

/// Snapshot of a record handed to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRecordView {
    pub id: String,
    pub name: String,
    pub version: Version,
    pub description: String,
    pub capabilities: Vec<CapabilityType>,
    pub enabled: bool,
    pub loaded: bool,
    pub is_core: bool,
    pub is_external: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub status: PluginStatus,
    /// Ids of toolbar buttons currently shown for the plugin
    pub toolbar_buttons: Vec<String>,
}

/// Counts over all records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSummary {
    pub total: usize,
    pub active: usize,
    pub disabled: usize,
    pub failed: usize,
    pub core: usize,
    pub external: usize,
}

// ============================================================================
// PluginRegistry
// ============================================================================

pub struct PluginRegistry {
    /// id -> record
    plugins: RwLock<HashMap<String, PluginRecord>>,

    load_counter: RwLock<usize>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
            load_counter: RwLock::new(0),
        }
    }

    /// Store a new record; its `load_order` is assigned here
    pub async fn insert(&self, mut record: PluginRecord) -> Result<PluginRecordView> {
        let mut plugins = self.plugins.write().await;
        let id = record.manifest.id.clone();

        if plugins.contains_key(&id) {
            return Err(Error::DuplicatePlugin(id));
        }

        let mut counter = self.load_counter.write().await;
        *counter += 1;
        record.load_order = *counter;

        let view = record.view();
        plugins.insert(id.clone(), record);

        info!(plugin = %id, status = %view.status, "Stored plugin record");
        Ok(view)
    }

    pub async fn get(&self, id: &str) -> Option<PluginRecord> {
        self.plugins.read().await.get(id).cloned()
    }

    pub async fn view(&self, id: &str) -> Option<PluginRecordView> {
        self.plugins.read().await.get(id).map(PluginRecord::view)
    }

    /// Mutate a record in place
    pub async fn update<F>(&self, id: &str, f: F) -> Option<PluginRecordView>
    where
        F: FnOnce(&mut PluginRecord),
    {
        let mut plugins = self.plugins.write().await;
        let record = plugins.get_mut(id)?;
        f(record);
        debug!(plugin = %id, status = %record.status(), "Updated plugin record");
        Some(record.view())
    }

    pub async fn remove(&self, id: &str) -> Option<PluginRecord> {
        let removed = self.plugins.write().await.remove(id);
        if removed.is_some() {
            info!(plugin = %id, "Removed plugin record");
        }
        removed
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.plugins.read().await.contains_key(id)
    }

    /// All records in registration order
    pub async fn records(&self) -> Vec<PluginRecord> {
        let plugins = self.plugins.read().await;
        let mut ordered: Vec<_> = plugins.values().cloned().collect();
        ordered.sort_by_key(|r| r.load_order);
        ordered
    }

    pub async fn list(&self) -> Vec<PluginRecordView> {
        self.records().await.iter().map(PluginRecord::view).collect()
    }

    /// Enabled, loaded instances declaring `capability`, in registration order
    pub async fn serving(&self, capability: CapabilityType) -> Vec<Arc<ScriptPlugin>> {
        let plugins = self.plugins.read().await;
        let mut serving: Vec<_> = plugins.values().filter(|r| r.serves(capability)).collect();
        serving.sort_by_key(|r| r.load_order);
        serving
            .into_iter()
            .filter_map(|r| r.instance.clone())
            .collect()
    }

    /// Declared dependencies that are not registered
    pub async fn missing_dependencies(&self, manifest: &PluginManifest) -> Vec<String> {
        let plugins = self.plugins.read().await;
        manifest
            .dependencies
            .iter()
            .filter(|dep| !plugins.contains_key(dep.as_str()))
            .cloned()
            .collect()
    }

    pub async fn summary(&self) -> PluginSummary {
        let plugins = self.plugins.read().await;
        let mut summary = PluginSummary {
            total: plugins.len(),
            ..Default::default()
        };
        for record in plugins.values() {
            match record.status() {
                PluginStatus::Active => summary.active += 1,
                PluginStatus::Disabled => summary.disabled += 1,
                PluginStatus::Failed => summary.failed += 1,
            }
            if record.manifest.is_core {
                summary.core += 1;
            }
            if record.is_external {
                summary.external += 1;
            }
        }
        summary
    }

    pub async fn len(&self) -> usize {
        self.plugins.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plugins.read().await.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
