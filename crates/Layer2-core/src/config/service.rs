//! ConfigService - per-plugin config values against a SettingsStore

use parking_lot::{Mutex, RwLock};
use plughost_foundation::{ConfigValues, Error, Result, SettingsStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::form::{describe_schema, FieldDescriptor};
use crate::plugin::ConfigSchema;

// ============================================================================
// ConfigService
// ============================================================================

/// Validated config reads and writes, scoped by plugin id
///
/// Every write is checked against the plugin's schema before it reaches the
/// store. A rejected write leaves the persisted values untouched.
pub struct ConfigService {
    store: Arc<dyn SettingsStore>,
    schemas: RwLock<HashMap<String, Arc<ConfigSchema>>>,
    /// Serializes load-merge-write cycles
    write_lock: Mutex<()>,
}

impl ConfigService {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            schemas: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    // ========================================================================
    // Schemas
    // ========================================================================

    /// Make a plugin's schema known; plugins without one get an empty schema
    pub fn register_schema(&self, plugin_id: &str, schema: Option<ConfigSchema>) {
        debug!(plugin = plugin_id, "Registering config schema");
        self.schemas
            .write()
            .insert(plugin_id.to_string(), Arc::new(schema.unwrap_or_default()));
    }

    pub fn unregister_schema(&self, plugin_id: &str) {
        self.schemas.write().remove(plugin_id);
    }

    pub fn schema(&self, plugin_id: &str) -> Option<Arc<ConfigSchema>> {
        self.schemas.read().get(plugin_id).cloned()
    }

    fn require_schema(&self, plugin_id: &str) -> Result<Arc<ConfigSchema>> {
        self.schema(plugin_id)
            .ok_or_else(|| Error::NotFound(format!("config schema for plugin {}", plugin_id)))
    }

    // ========================================================================
    // Pure schema operations
    // ========================================================================

    /// Default value of every field that declares one
    pub fn get_defaults(schema: &ConfigSchema) -> ConfigValues {
        schema
            .fields()
            .iter()
            .filter_map(|f| f.default.clone().map(|d| (f.key.clone(), d)))
            .collect()
    }

    /// Check a single value against its field
    pub fn validate(schema: &ConfigSchema, key: &str, value: &Value) -> Result<()> {
        let field = schema
            .field(key)
            .ok_or_else(|| Error::config_validation(key, "unknown config key"))?;
        field
            .check(value)
            .map_err(|message| Error::config_validation(key, message))
    }

    // ========================================================================
    // Persisted values
    // ========================================================================

    /// Defaults overlaid with persisted values
    pub fn load(&self, plugin_id: &str) -> Result<ConfigValues> {
        let schema = self.require_schema(plugin_id)?;
        let persisted = self.store.load_config(plugin_id)?;
        Ok(effective_values(plugin_id, &schema, &persisted))
    }

    /// Validate every given key, then merge them into the persisted map in one write
    ///
    /// Returns the effective values after the write.
    pub fn save(&self, plugin_id: &str, values: &ConfigValues) -> Result<ConfigValues> {
        let schema = self.require_schema(plugin_id)?;

        for (key, value) in values {
            Self::validate(&schema, key, value)?;
        }

        let _guard = self.write_lock.lock();
        let mut persisted = self.store.load_config(plugin_id)?;
        for (key, value) in values {
            persisted.insert(key.clone(), value.clone());
        }
        self.store.save_config(plugin_id, &persisted)?;

        debug!(plugin = plugin_id, keys = values.len(), "Saved plugin config");
        Ok(effective_values(plugin_id, &schema, &persisted))
    }

    /// Current value of one key; `None` for keys without value or default
    pub fn get(&self, plugin_id: &str, key: &str) -> Result<Option<Value>> {
        Ok(self.load(plugin_id)?.remove(key))
    }

    pub fn set(&self, plugin_id: &str, key: &str, value: Value) -> Result<ConfigValues> {
        let mut values = ConfigValues::new();
        values.insert(key.to_string(), value);
        self.save(plugin_id, &values)
    }

    /// Form descriptors for a registered plugin, with current values
    pub fn describe(&self, plugin_id: &str) -> Result<Vec<FieldDescriptor>> {
        let schema = self.require_schema(plugin_id)?;
        let current = self.load(plugin_id)?;
        Ok(describe_schema(&schema, Some(&current)))
    }
}

/// Persisted values that still validate, defaults for the rest
fn effective_values(plugin_id: &str, schema: &ConfigSchema, persisted: &ConfigValues) -> ConfigValues {
    let mut values = ConfigValues::new();
    for field in schema.fields() {
        let stored = persisted.get(&field.key).filter(|v| match field.check(v) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    plugin = plugin_id,
                    key = %field.key,
                    "Ignoring persisted config value: {}",
                    e
                );
                false
            }
        });
        if let Some(value) = stored.or(field.default.as_ref()) {
            values.insert(field.key.clone(), value.clone());
        }
    }
    values
}
