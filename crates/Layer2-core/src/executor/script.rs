//! ScriptPlugin - a rhai-backed plugin instance

use async_trait::async_trait;
use plughost_foundation::{ConfigValues, Error, Result};
use rhai::{Dynamic, FuncArgs};
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;

use super::api::{PluginHooks, UiApi};
use super::engine::{to_dynamic, ScriptRuntime};
use crate::hook::{HookContext, HookName, HookResult, PendingHandler};
use crate::plugin::{
    CapabilityType, MessageTransformer, PluginInstance, PluginManifest, Renderer, ToolDefinition,
    ToolProvider, UiExtension,
};

/// Instance produced by [`PluginExecutor`](super::PluginExecutor)
///
/// Built-in and external plugins are both this type.
pub struct ScriptPlugin {
    manifest: PluginManifest,
    runtime: Arc<ScriptRuntime>,
    hooks: Arc<PluginHooks>,
    ui: UiApi,
    /// Mount point of a ui-extension, resolved at instantiation
    location: Option<HookName>,
    default_priority: i32,
}

impl std::fmt::Debug for ScriptPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptPlugin")
            .field("manifest", &self.manifest)
            .field("location", &self.location)
            .field("default_priority", &self.default_priority)
            .finish_non_exhaustive()
    }
}

impl ScriptPlugin {
    pub(crate) fn new(
        manifest: PluginManifest,
        runtime: Arc<ScriptRuntime>,
        hooks: Arc<PluginHooks>,
        ui: UiApi,
        default_priority: i32,
    ) -> Self {
        Self {
            manifest,
            runtime,
            hooks,
            ui,
            location: None,
            default_priority,
        }
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    /// Check that every declared capability has its methods
    pub(crate) fn check_capabilities(&mut self) -> std::result::Result<(), String> {
        let has = |name: &str, arity: usize| self.runtime.has_function(name, arity);

        for capability in &self.manifest.capabilities {
            let missing: Vec<&str> = match capability {
                CapabilityType::Render => [("can_render", 1), ("render", 1)]
                    .iter()
                    .filter(|(n, a)| !has(n, *a))
                    .map(|(n, _)| *n)
                    .collect(),
                CapabilityType::MessageTransform => {
                    if has("process_outgoing", 1) || has("process_incoming", 1) {
                        Vec::new()
                    } else {
                        vec!["process_outgoing or process_incoming"]
                    }
                }
                CapabilityType::Tool => [("get_tool", 0), ("execute", 1)]
                    .iter()
                    .filter(|(n, a)| !has(n, *a))
                    .map(|(n, _)| *n)
                    .collect(),
                CapabilityType::UiExtension => [("location", 0), ("component", 1)]
                    .iter()
                    .filter(|(n, a)| !has(n, *a))
                    .map(|(n, _)| *n)
                    .collect(),
                CapabilityType::Storage => Vec::new(),
            };
            if !missing.is_empty() {
                return Err(format!(
                    "capability '{}' requires {}",
                    capability,
                    missing.join(", ")
                ));
            }
        }

        if self.manifest.has_capability(CapabilityType::UiExtension) {
            let location = self.runtime.call_json("location", ())?;
            let location = location
                .as_str()
                .ok_or_else(|| format!("location() must return a hook name, got {}", location))?
                .parse::<HookName>()?;
            self.location = Some(location);
        }
        Ok(())
    }

    // ========================================================================
    // Hook activation
    // ========================================================================

    /// Put the plugin's handlers into the dispatcher
    pub fn activate(&self) {
        let extra = match self.location {
            Some(location) => vec![PendingHandler {
                hook: location,
                priority: self.default_priority,
                handler: self.hooks.handler_for(location, "component", &[]),
            }],
            None => Vec::new(),
        };
        self.hooks.activate(extra);
    }

    /// Remove every handler of the plugin from the dispatcher
    pub fn deactivate(&self) {
        self.hooks.deactivate();
    }

    pub fn is_active(&self) -> bool {
        self.hooks.is_active()
    }

    /// `(hook, priority)` pairs the script registered
    pub fn declared_hooks(&self) -> Vec<(HookName, i32)> {
        self.hooks.declared()
    }

    pub fn toolbar_buttons(&self) -> Vec<String> {
        self.ui.buttons()
    }

    /// Take down toolbar buttons the plugin added
    pub fn remove_ui(&self) {
        self.ui.remove_all();
    }

    // ========================================================================
    // Calls into the script
    // ========================================================================

    async fn lifecycle(&self, method: &str, args: Vec<Dynamic>) -> Result<()> {
        if !self.runtime.has_function(method, args.len()) {
            return Ok(());
        }
        self.runtime
            .call(method, args)
            .map(|_| ())
            .map_err(|message| Error::lifecycle(&self.manifest.id, method, message))
    }

    fn invoke(&self, method: &str, args: impl FuncArgs + Send) -> Result<Value> {
        self.runtime
            .call_json(method, args)
            .map_err(|message| Error::execution(&self.manifest.id, format!("{}: {}", method, message)))
    }

    fn text_arg(text: &str) -> (Dynamic,) {
        (Dynamic::from(text.to_string()),)
    }

    fn json_arg(&self, value: &Value) -> Result<(Dynamic,)> {
        to_dynamic(value)
            .map(|d| (d,))
            .map_err(|message| Error::execution(&self.manifest.id, message))
    }

    fn transform(&self, method: &str, message: &str) -> Result<String> {
        if !self.runtime.has_function(method, 1) {
            return Ok(message.to_string());
        }
        match self.invoke(method, Self::text_arg(message))? {
            Value::String(s) => Ok(s),
            other => Err(Error::execution(
                &self.manifest.id,
                format!("{} must return a string, got {}", method, other),
            )),
        }
    }

    #[cfg(test)]
    pub(crate) fn call_for_test(&self, method: &str) -> Value {
        self.runtime.call_json(method, ()).unwrap()
    }

    fn to_result(&self, method: &str, value: &Value) -> Result<Option<HookResult>> {
        HookResult::from_value(value, self.hooks.max_result_depth())
            .map_err(|message| Error::execution(&self.manifest.id, format!("{}: {}", method, message)))
    }
}

#[async_trait]
impl PluginInstance for ScriptPlugin {
    fn id(&self) -> &str {
        &self.manifest.id
    }

    async fn on_load(&self) -> Result<()> {
        self.lifecycle("on_load", Vec::new()).await
    }

    async fn on_unload(&self) -> Result<()> {
        self.lifecycle("on_unload", Vec::new()).await
    }

    async fn on_enable(&self) -> Result<()> {
        self.lifecycle("on_enable", Vec::new()).await
    }

    async fn on_disable(&self) -> Result<()> {
        self.lifecycle("on_disable", Vec::new()).await
    }

    async fn on_config_change(&self, values: &ConfigValues) -> Result<()> {
        let values = to_dynamic(&Value::Object(values.clone()))
            .map_err(|message| Error::lifecycle(&self.manifest.id, "on_config_change", message))?;
        self.lifecycle("on_config_change", vec![values]).await
    }

    fn as_renderer(&self) -> Option<&dyn Renderer> {
        self.manifest
            .has_capability(CapabilityType::Render)
            .then_some(self as &dyn Renderer)
    }

    fn as_transformer(&self) -> Option<&dyn MessageTransformer> {
        self.manifest
            .has_capability(CapabilityType::MessageTransform)
            .then_some(self as &dyn MessageTransformer)
    }

    fn as_tool(&self) -> Option<&dyn ToolProvider> {
        self.manifest
            .has_capability(CapabilityType::Tool)
            .then_some(self as &dyn ToolProvider)
    }

    fn as_ui_extension(&self) -> Option<&dyn UiExtension> {
        self.location.map(|_| self as &dyn UiExtension)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl Renderer for ScriptPlugin {
    async fn can_render(&self, content: &str) -> Result<bool> {
        match self.invoke("can_render", Self::text_arg(content))? {
            Value::Bool(b) => Ok(b),
            other => Err(Error::execution(
                &self.manifest.id,
                format!("can_render must return a boolean, got {}", other),
            )),
        }
    }

    async fn render(&self, content: &str) -> Result<Option<HookResult>> {
        let value = self.invoke("render", Self::text_arg(content))?;
        self.to_result("render", &value)
    }
}

#[async_trait]
impl MessageTransformer for ScriptPlugin {
    async fn process_outgoing(&self, message: &str) -> Result<String> {
        self.transform("process_outgoing", message)
    }

    async fn process_incoming(&self, message: &str) -> Result<String> {
        self.transform("process_incoming", message)
    }
}

#[async_trait]
impl ToolProvider for ScriptPlugin {
    async fn definition(&self) -> Result<ToolDefinition> {
        let value = self.invoke("get_tool", ())?;
        serde_json::from_value(value).map_err(|e| {
            Error::execution(&self.manifest.id, format!("get_tool returned an invalid tool: {}", e))
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let args = self.json_arg(&args)?;
        self.invoke("execute", args)
    }
}

#[async_trait]
impl UiExtension for ScriptPlugin {
    fn location(&self) -> HookName {
        self.location.unwrap_or(HookName::SidebarPanel)
    }

    async fn component(&self, ctx: &HookContext) -> Result<Option<HookResult>> {
        let location = self.location();
        let args = self.json_arg(&ctx.to_value(location))?;
        let value = self.invoke("component", args)?;
        self.to_result("component", &value)
    }
}
