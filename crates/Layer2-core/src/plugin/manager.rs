//! Plugin Manager - lifecycle orchestration
//!
//! The manager owns every [`PluginRecord`] and is the only place where
//! plugins change state. Mutations (register, enable, disable, reload,
//! remove, config saves) are serialized by one lifecycle lock; queries and
//! hook execution never take it.
//!
//! Plugin faults never escape as panics. Manifest errors and duplicate ids
//! are returned to the caller and store nothing; execution errors and
//! lifecycle failures end up in the record's `last_error`.

use parking_lot::RwLock;
use plughost_foundation::{ConfigValues, Error, HostConfig, PluginSettings, Result, SettingsStore};
use semver::Version;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use super::discovery::{DiscoveredPlugin, PluginSource};
use super::events::{EventBus, PluginEvent, PluginEventKind};
use super::manifest::{parse_manifest, CapabilityType, PluginManifest};
use super::registry::{PluginRecord, PluginRecordView, PluginRegistry, PluginSummary};
use super::traits::{PluginInstance, ToolDefinition};
use crate::config::{ConfigService, FieldDescriptor};
use crate::executor::{HostServices, PluginExecutor, ScriptPlugin};
use crate::hook::{HookContext, HookContribution, HookDispatcher, HookName, HookResult};

/// Tool together with the plugin providing it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginTool {
    pub plugin_id: String,
    #[serde(flatten)]
    pub definition: ToolDefinition,
}

/// Outcome of [`PluginManager::load_all`]
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    /// Stored records, including failed ones
    pub records: Vec<PluginRecordView>,
    /// Plugins that were not stored at all
    pub rejected: Vec<RejectedPlugin>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedPlugin {
    /// Id declared in the raw manifest, if readable
    pub id: Option<String>,
    pub error: String,
}

pub struct PluginManager {
    executor: PluginExecutor,

    registry: PluginRegistry,

    events: EventBus,

    /// Where `reload` fetches fresh manifests and sources
    source: RwLock<Option<Arc<dyn PluginSource>>>,

    lifecycle: Mutex<()>,

    host_version: Version,

    settings: PluginSettings,
}

impl PluginManager {
    /// Manager with a fresh dispatcher and config service over `store`
    pub fn new(config: &HostConfig, store: Arc<dyn SettingsStore>) -> Result<Self> {
        let dispatcher = Arc::new(HookDispatcher::new(&config.hooks));
        let configs = Arc::new(ConfigService::new(store));
        Self::with_services(config, HostServices::new(dispatcher, configs))
    }

    /// Manager over host-supplied services (UI, session, ...)
    pub fn with_services(config: &HostConfig, services: HostServices) -> Result<Self> {
        config.validate()?;
        let host_version = Version::parse(&config.host_version).map_err(|e| {
            Error::Config(format!(
                "hostVersion '{}' is not a semantic version: {}",
                config.host_version, e
            ))
        })?;

        Ok(Self {
            executor: PluginExecutor::new(services, config),
            registry: PluginRegistry::new(),
            events: EventBus::with_capacity(256, config.plugins.event_history_size),
            source: RwLock::new(None),
            lifecycle: Mutex::new(()),
            host_version,
            settings: config.plugins.clone(),
        })
    }

    /// Attach the source used by `reload`
    pub fn with_source(self, source: Arc<dyn PluginSource>) -> Self {
        *self.source.write() = Some(source);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn dispatcher(&self) -> &Arc<HookDispatcher> {
        &self.services().dispatcher
    }

    pub fn config(&self) -> &Arc<ConfigService> {
        &self.services().config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.events.subscribe()
    }

    pub fn host_version(&self) -> &Version {
        &self.host_version
    }

    fn services(&self) -> &HostServices {
        self.executor.services()
    }

    fn store(&self) -> &Arc<dyn SettingsStore> {
        self.config().store()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Validate, instantiate and store one plugin
    ///
    /// Returns the stored record, which may be failed (`loaded = false`)
    /// when the script could not be instantiated.
    pub async fn register(&self, discovered: DiscoveredPlugin) -> Result<PluginRecordView> {
        let _guard = self.lifecycle.lock().await;
        self.register_locked(discovered).await
    }

    /// Register everything `source` discovers and keep it for reloads
    ///
    /// Plugins that are rejected do not stop the others from loading.
    pub async fn load_all(&self, source: Arc<dyn PluginSource>) -> Result<LoadReport> {
        *self.source.write() = Some(source.clone());
        let discovered = source.discover().await?;

        let _guard = self.lifecycle.lock().await;
        let mut report = LoadReport::default();
        for plugin in discovered {
            let declared = plugin.declared_id().map(str::to_string);
            match self.register_locked(plugin).await {
                Ok(view) => report.records.push(view),
                Err(e) => {
                    error!(plugin = ?declared, error = %e, "Rejected plugin");
                    report.rejected.push(RejectedPlugin {
                        id: declared,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            stored = report.records.len(),
            rejected = report.rejected.len(),
            "Loaded plugins"
        );
        Ok(report)
    }

    async fn register_locked(&self, discovered: DiscoveredPlugin) -> Result<PluginRecordView> {
        let manifest = self.admit(parse_manifest(&discovered.manifest)?, discovered.is_external);
        let id = manifest.id.clone();

        if self.registry.contains(&id).await {
            return Err(Error::DuplicatePlugin(id));
        }

        let missing = self.registry.missing_dependencies(&manifest).await;
        if !missing.is_empty() {
            warn!(plugin = %id, missing = ?missing, "Plugin dependencies are not registered");
        }
        // Equal-priority handlers run in registration order, whenever enabled
        self.dispatcher().reserve_owner(&id);

        let instantiated = self
            .check_compatible(&manifest)
            .and_then(|_| self.executor.instantiate(&manifest, &discovered.source));
        let instance = match instantiated {
            Ok(instance) => instance,
            Err(e) => {
                error!(plugin = %id, error = %e, "Plugin failed to load");
                let record = PluginRecord::failed(manifest, e.to_string(), discovered.is_external);
                let view = self.registry.insert(record).await?;
                self.publish(PluginEventKind::Failed, &id, json!({ "error": e.to_string() }))
                    .await;
                return Ok(view);
            }
        };

        let start_enabled = self.should_start_enabled(&manifest, discovered.is_external);
        let record = PluginRecord::loaded(manifest.clone(), instance.clone(), discovered.is_external);
        self.registry.insert(record).await?;
        self.publish(PluginEventKind::Registered, &id, Value::Null).await;

        if start_enabled {
            // Failure is recorded on the record; registration itself succeeded
            let _ = self
                .bring_up(&id, &instance, false, manifest.is_core, false)
                .await;
        }

        self.registry
            .view(&id)
            .await
            .ok_or_else(|| Error::Internal(format!("record of '{}' vanished", id)))
    }

    /// Only bundled plugins may be core
    fn admit(&self, mut manifest: PluginManifest, is_external: bool) -> PluginManifest {
        if is_external && manifest.is_core {
            warn!(plugin = %manifest.id, "External plugin declares isCore; ignoring");
            manifest.is_core = false;
        }
        manifest
    }

    fn check_compatible(&self, manifest: &PluginManifest) -> Result<()> {
        if manifest.is_compatible_with(&self.host_version) {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "plugin requires host version {}, host is {}",
                manifest.host_version_range, self.host_version
            )))
        }
    }

    fn should_start_enabled(&self, manifest: &PluginManifest, is_external: bool) -> bool {
        if manifest.is_core {
            return true;
        }
        let fallback = !is_external || self.settings.enable_external_by_default;
        match self.store().load_enabled(&manifest.id) {
            Ok(Some(enabled)) => enabled,
            Ok(None) => fallback,
            Err(e) => {
                warn!(plugin = %manifest.id, error = %e, "Failed to read enabled state");
                fallback
            }
        }
    }

    // ========================================================================
    // Enable / disable
    // ========================================================================

    pub async fn enable(&self, id: &str) -> Result<PluginRecordView> {
        let _guard = self.lifecycle.lock().await;
        let (record, instance) = self.toggleable(id).await?;
        if record.enabled {
            return Ok(record.view());
        }

        let view = self
            .bring_up(id, &instance, record.initialized, false, true)
            .await?;
        self.persist_enabled(id, true);
        Ok(view)
    }

    pub async fn disable(&self, id: &str) -> Result<PluginRecordView> {
        let _guard = self.lifecycle.lock().await;
        let (record, instance) = self.toggleable(id).await?;
        if !record.enabled {
            self.persist_enabled(id, false);
            return Ok(record.view());
        }

        let failure = self.tear_down(id, &instance, true, false).await;
        let view = self
            .registry
            .update(id, |r| {
                r.enabled = false;
                if failure.is_some() {
                    r.last_error = failure.clone();
                }
            })
            .await
            .ok_or_else(|| Error::NotFound(format!("plugin '{}'", id)))?;

        self.persist_enabled(id, false);
        info!(plugin = %id, "Plugin disabled");
        self.publish(PluginEventKind::Disabled, id, Value::Null).await;
        Ok(view)
    }

    /// Record and instance of a plugin the user may toggle
    async fn toggleable(&self, id: &str) -> Result<(PluginRecord, Arc<ScriptPlugin>)> {
        let record = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("plugin '{}'", id)))?;
        if record.manifest.is_core {
            return Err(Error::CorePluginLocked(id.to_string()));
        }
        let instance = record
            .instance
            .clone()
            .ok_or_else(|| Error::PluginNotLoaded(id.to_string()))?;
        Ok((record, instance))
    }

    /// Run setup lifecycle methods, then put the hooks in place
    ///
    /// A failed setup leaves the plugin disabled with `last_error`, except
    /// for core plugins which stay enabled.
    async fn bring_up(
        &self,
        id: &str,
        instance: &Arc<ScriptPlugin>,
        initialized: bool,
        is_core: bool,
        call_enable: bool,
    ) -> Result<PluginRecordView> {
        let setup = async {
            if !initialized {
                instance.on_load().await?;
                self.registry.update(id, |r| r.initialized = true).await;
            }
            if call_enable {
                instance.on_enable().await?;
            }
            Ok::<(), Error>(())
        }
        .await;

        let error = match setup {
            Ok(()) => None,
            Err(e) => {
                warn!(plugin = %id, error = %e, "Plugin setup failed");
                Some(e)
            }
        };
        let keep_enabled = error.is_none() || is_core;
        if keep_enabled {
            instance.activate();
        }

        let message = error.as_ref().map(|e| e.to_string());
        let view = self
            .registry
            .update(id, |r| {
                r.enabled = keep_enabled;
                r.last_error = message.clone();
            })
            .await
            .ok_or_else(|| Error::NotFound(format!("plugin '{}'", id)))?;

        match error {
            None => {
                info!(plugin = %id, hooks = instance.declared_hooks().len(), "Plugin enabled");
                self.publish(PluginEventKind::Enabled, id, Value::Null).await;
                Ok(view)
            }
            Some(e) => {
                self.publish(PluginEventKind::Failed, id, json!({ "error": e.to_string() }))
                    .await;
                Err(e)
            }
        }
    }

    /// Take the plugin out of the dispatcher and the host UI
    ///
    /// Failures of `on_disable` / `on_unload` never stop the teardown; the
    /// first one is returned for the record.
    async fn tear_down(
        &self,
        id: &str,
        instance: &Arc<ScriptPlugin>,
        was_enabled: bool,
        unload: bool,
    ) -> Option<String> {
        let mut failure = None;

        if was_enabled {
            if let Err(e) = instance.on_disable().await {
                warn!(plugin = %id, error = %e, "on_disable failed; continuing teardown");
                failure = Some(e.to_string());
            }
        }

        instance.deactivate();
        instance.remove_ui();

        if unload {
            if let Err(e) = instance.on_unload().await {
                warn!(plugin = %id, error = %e, "on_unload failed; continuing teardown");
                failure.get_or_insert(e.to_string());
            }
        }

        debug!(plugin = %id, unload, "Plugin torn down");
        failure
    }

    fn persist_enabled(&self, id: &str, enabled: bool) {
        if let Err(e) = self.store().save_enabled(id, enabled) {
            warn!(plugin = %id, error = %e, "Failed to persist enabled state");
        }
    }

    // ========================================================================
    // Reload / remove
    // ========================================================================

    /// Replace an external plugin's instance with a freshly discovered one
    ///
    /// Errors before the old instance is torn down (source lookup, manifest,
    /// host version) leave the record untouched. Errors after it leave the
    /// record failed with `last_error`.
    pub async fn reload(&self, id: &str) -> Result<PluginRecordView> {
        let _guard = self.lifecycle.lock().await;
        let record = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("plugin '{}'", id)))?;
        if !record.is_external {
            return Err(Error::NotExternal(id.to_string()));
        }

        let source = self
            .source
            .read()
            .clone()
            .ok_or_else(|| Error::Config("no plugin source attached to the manager".into()))?;
        let discovered = source.rediscover(id).await?;
        let manifest = self.admit(parse_manifest(&discovered.manifest)?, true);
        if manifest.id != id {
            return Err(Error::InvalidInput(format!(
                "source for '{}' declares id '{}'",
                id, manifest.id
            )));
        }
        self.check_compatible(&manifest)?;

        info!(plugin = %id, version = %manifest.version, "Reloading plugin");

        let restart = if record.loaded {
            record.enabled
        } else {
            self.should_start_enabled(&manifest, true)
        };
        // A plugin that was running gets on_enable again, like a re-enable
        let re_enable = record.loaded && record.enabled;

        let mut teardown_error = None;
        if let Some(old) = &record.instance {
            teardown_error = self.tear_down(id, old, record.enabled, true).await;
        }
        drop(record);

        let new_manifest = manifest.clone();
        self.registry
            .update(id, move |r| {
                r.manifest = new_manifest;
                r.instance = None;
                r.loaded = false;
                r.enabled = false;
                r.initialized = false;
            })
            .await;

        let instance = match self.executor.instantiate(&manifest, &discovered.source) {
            Ok(instance) => instance,
            Err(e) => {
                error!(plugin = %id, error = %e, "Reloaded plugin failed to load");
                let message = e.to_string();
                self.registry
                    .update(id, |r| r.last_error = Some(message.clone()))
                    .await;
                self.publish(PluginEventKind::Failed, id, json!({ "error": message }))
                    .await;
                return Err(e);
            }
        };

        let view = self
            .registry
            .update(id, |r| {
                r.instance = Some(instance.clone());
                r.loaded = true;
                r.last_error = teardown_error.clone();
            })
            .await
            .ok_or_else(|| Error::NotFound(format!("plugin '{}'", id)))?;

        let view = if restart {
            self.bring_up(id, &instance, false, manifest.is_core, re_enable)
                .await?
        } else {
            view
        };

        self.publish(
            PluginEventKind::Reloaded,
            id,
            json!({ "version": manifest.version.to_string() }),
        )
        .await;
        Ok(view)
    }

    /// Tear down and forget an external plugin, persisted state included
    pub async fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let record = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("plugin '{}'", id)))?;
        if !record.is_external {
            return Err(Error::NotExternal(id.to_string()));
        }

        if let Some(instance) = &record.instance {
            self.tear_down(id, instance, record.enabled, true).await;
        }

        self.registry.remove(id).await;
        self.dispatcher().forget_owner(id);
        self.config().unregister_schema(id);
        if let Err(e) = self.store().remove_plugin(id) {
            warn!(plugin = %id, error = %e, "Failed to drop persisted plugin state");
        }

        self.publish(PluginEventKind::Removed, id, Value::Null).await;
        Ok(())
    }

    /// Tear down every loaded plugin and drop all records
    ///
    /// Persisted state is kept.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;
        for record in self.registry.records().await {
            if let Some(instance) = &record.instance {
                self.tear_down(record.id(), instance, record.enabled, true)
                    .await;
            }
            self.registry.remove(record.id()).await;
            self.dispatcher().forget_owner(record.id());
        }
        info!("Plugin manager shut down");
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Enabled, loaded instances declaring `capability`, in registration order
    pub async fn get_by_capability(&self, capability: CapabilityType) -> Vec<Arc<dyn PluginInstance>> {
        self.registry
            .serving(capability)
            .await
            .into_iter()
            .map(|plugin| plugin as Arc<dyn PluginInstance>)
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<PluginRecordView> {
        self.registry.view(id).await
    }

    /// All records in registration order
    pub async fn list(&self) -> Vec<PluginRecordView> {
        self.registry.list().await
    }

    pub async fn summary(&self) -> PluginSummary {
        self.registry.summary().await
    }

    // ========================================================================
    // Hooks
    // ========================================================================

    /// Run a hook; the current session is filled in when `ctx` has none
    pub async fn execute_hook(&self, hook: HookName, ctx: HookContext) -> Vec<HookResult> {
        let ctx = self.with_session(ctx);
        self.dispatcher().execute(hook, &ctx).await
    }

    /// Like [`execute_hook`](Self::execute_hook), with the contributing plugin
    pub async fn execute_hook_detailed(&self, hook: HookName, ctx: HookContext) -> Vec<HookContribution> {
        let ctx = self.with_session(ctx);
        self.dispatcher().execute_detailed(hook, &ctx).await
    }

    fn with_session(&self, mut ctx: HookContext) -> HookContext {
        if ctx.session.is_none() {
            ctx.session = self.services().session.current();
        }
        ctx
    }

    // ========================================================================
    // Config
    // ========================================================================

    /// Effective config of a plugin
    pub fn load_config(&self, id: &str) -> Result<ConfigValues> {
        self.config().load(id)
    }

    /// Settings form of a plugin
    pub fn describe_config(&self, id: &str) -> Result<Vec<FieldDescriptor>> {
        self.config().describe(id)
    }

    /// Validate and persist `values`, then notify the plugin
    ///
    /// Nothing is written unless every value is valid.
    pub async fn save_config(&self, id: &str, values: ConfigValues) -> Result<ConfigValues> {
        let _guard = self.lifecycle.lock().await;
        let record = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("plugin '{}'", id)))?;

        let saved = self.config().save(id, &values)?;
        info!(plugin = %id, keys = values.len(), "Plugin config saved");

        if let Some(instance) = record.instance.as_ref().filter(|_| record.loaded) {
            if let Err(e) = instance.on_config_change(&saved).await {
                warn!(plugin = %id, error = %e, "on_config_change failed");
                let message = e.to_string();
                self.registry
                    .update(id, |r| r.last_error = Some(message.clone()))
                    .await;
            }
        }

        self.publish(PluginEventKind::ConfigChanged, id, Value::Object(saved.clone()))
            .await;
        Ok(saved)
    }

    // ========================================================================
    // Capability conveniences
    // ========================================================================

    /// Render `content` with the first renderer that accepts it
    pub async fn render_content(&self, content: &str) -> Option<HookContribution> {
        for plugin in self.registry.serving(CapabilityType::Render).await {
            let Some(renderer) = plugin.as_renderer() else {
                continue;
            };
            match renderer.can_render(content).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(plugin = %plugin.id(), error = %e, "can_render failed");
                    continue;
                }
            }
            match renderer.render(content).await {
                Ok(Some(result)) => {
                    return Some(HookContribution {
                        plugin_id: plugin.id().to_string(),
                        result,
                    })
                }
                Ok(None) => {}
                Err(e) => warn!(plugin = %plugin.id(), error = %e, "render failed"),
            }
        }
        None
    }

    /// Pass an outgoing message through every transformer in order
    pub async fn process_outgoing(&self, message: &str) -> String {
        self.transform_chain(message, true).await
    }

    /// Pass an incoming message through every transformer in order
    pub async fn process_incoming(&self, message: &str) -> String {
        self.transform_chain(message, false).await
    }

    async fn transform_chain(&self, message: &str, outgoing: bool) -> String {
        let mut current = message.to_string();
        for plugin in self.registry.serving(CapabilityType::MessageTransform).await {
            let Some(transformer) = plugin.as_transformer() else {
                continue;
            };
            let transformed = if outgoing {
                transformer.process_outgoing(&current).await
            } else {
                transformer.process_incoming(&current).await
            };
            match transformed {
                Ok(next) => current = next,
                Err(e) => warn!(plugin = %plugin.id(), error = %e, "Transformer failed; skipped"),
            }
        }
        current
    }

    /// Tools of all enabled tool plugins
    pub async fn tools(&self) -> Vec<PluginTool> {
        let mut tools = Vec::new();
        for plugin in self.registry.serving(CapabilityType::Tool).await {
            let Some(tool) = plugin.as_tool() else {
                continue;
            };
            match tool.definition().await {
                Ok(definition) => tools.push(PluginTool {
                    plugin_id: plugin.id().to_string(),
                    definition,
                }),
                Err(e) => warn!(plugin = %plugin.id(), error = %e, "get_tool failed"),
            }
        }
        tools
    }

    /// Run the first enabled tool named `name`
    pub async fn execute_tool(&self, name: &str, args: Value) -> Result<Value> {
        for plugin in self.registry.serving(CapabilityType::Tool).await {
            let Some(tool) = plugin.as_tool() else {
                continue;
            };
            match tool.definition().await {
                Ok(definition) if definition.name == name => {
                    debug!(plugin = %plugin.id(), tool = name, "Executing tool");
                    return tool.execute(args).await;
                }
                Ok(_) => {}
                Err(e) => warn!(plugin = %plugin.id(), error = %e, "get_tool failed"),
            }
        }
        Err(Error::NotFound(format!("tool '{}'", name)))
    }

    async fn publish(&self, kind: PluginEventKind, id: &str, detail: Value) {
        self.events.publish(PluginEvent::new(kind, id, detail)).await;
    }
}
