//! # Plugin Executor
//!
//! Turns a manifest plus script source into a live [`ScriptPlugin`].
//!
//! Plugin scripts are [rhai](https://rhai.rs) programs run in a fresh,
//! limited engine per plugin. The only host access a script gets is the
//! `PluginApi` object handed to its constructor. The script's last
//! expression names the constructor:
//!
//! ```text
//! fn create(api) {
//!     api.hooks.register("render.user-message-footer", Fn("footer"), 10);
//!     #{ api: api, greeting: "hi" }
//! }
//!
//! fn footer(ctx) {
//!     #{ type: "badge", label: this.greeting }
//! }
//!
//! Fn("create")
//! ```
//!
//! The map the constructor returns becomes `this` for every later call.

mod api;
mod engine;
mod host;
mod script;

pub use api::{ConfigApi, HooksApi, PluginApi, SessionApi, UiApi};
pub use host::{
    HostServices, HostUi, NoSession, NoopHostUi, NotificationLevel, SessionMessage,
    SessionProvider, SessionSnapshot, StaticSession, ToolbarButton,
};
pub use script::ScriptPlugin;

use plughost_foundation::{Error, HostConfig, Result, SandboxLimits};
use rhai::{Dynamic, FnPtr, Scope};
use std::sync::Arc;
use tracing::{debug, info};

use api::PluginHooks;
use engine::{build_engine, on_script_stack, ScriptRuntime};
use crate::plugin::PluginManifest;

/// Name of the scope constant holding the capability object
pub const API_CONSTANT: &str = "plugin_api";

pub struct PluginExecutor {
    services: HostServices,
    limits: SandboxLimits,
    default_priority: i32,
}

impl PluginExecutor {
    pub fn new(services: HostServices, config: &HostConfig) -> Self {
        Self {
            services,
            limits: config.sandbox.clone(),
            default_priority: config.hooks.default_priority,
        }
    }

    pub fn services(&self) -> &HostServices {
        &self.services
    }

    /// Evaluate `source` and construct the plugin instance
    ///
    /// Every failure comes back as [`Error::Execution`]; nothing thrown by
    /// the script escapes.
    pub fn instantiate(&self, manifest: &PluginManifest, source: &str) -> Result<Arc<ScriptPlugin>> {
        let id = manifest.id.as_str();
        let fail = |message: String| Error::execution(id, message);

        if source.len() > self.limits.max_source_bytes {
            return Err(fail(format!(
                "source is {} bytes, limit is {}",
                source.len(),
                self.limits.max_source_bytes
            )));
        }

        self.services
            .config
            .register_schema(id, manifest.config_schema.clone());

        let engine = build_engine(id, &self.limits);
        let ast = engine
            .compile(source)
            .map_err(|e| fail(format!("failed to compile: {}", e)))?;
        let runtime = Arc::new(ScriptRuntime::new(id, engine, ast));

        let hooks = Arc::new(PluginHooks::new(
            &runtime,
            self.services.dispatcher.clone(),
            self.default_priority,
        ));
        let ui = UiApi::new(id, self.services.ui.clone());
        let api = PluginApi::new(hooks.clone(), ui.clone(), &self.services);

        let constructed = self.construct(&runtime, api);
        let instance = match constructed {
            Ok(instance) => instance,
            Err(message) => {
                ui.remove_all();
                return Err(fail(message));
            }
        };
        runtime.set_instance(instance);

        let mut plugin = ScriptPlugin::new(
            manifest.clone(),
            runtime,
            hooks,
            ui.clone(),
            self.default_priority,
        );
        if let Err(message) = plugin.check_capabilities() {
            ui.remove_all();
            return Err(fail(message));
        }

        info!(plugin = id, version = %manifest.version, "Plugin instantiated");
        Ok(Arc::new(plugin))
    }

    /// Run the script body, then call the constructor it evaluates to
    fn construct(&self, runtime: &ScriptRuntime, api: PluginApi) -> std::result::Result<Dynamic, String> {
        let instance = on_script_stack(|| {
            let mut scope = Scope::new();
            scope.push_constant(API_CONSTANT, api.clone());

            let exported = runtime
                .engine
                .eval_ast_with_scope::<Dynamic>(&mut scope, &runtime.ast)
                .map_err(|e| e.to_string())?;
            let type_name = exported.type_name();
            let constructor = exported.try_cast::<FnPtr>().ok_or_else(|| {
                format!(
                    "script must evaluate to a constructor such as Fn(\"create\"), got {}",
                    type_name
                )
            })?;

            let curried = constructor.curry().len();
            let instance = if runtime.has_function(constructor.fn_name(), curried + 1) {
                constructor.call::<Dynamic>(&runtime.engine, &runtime.ast, (api,))
            } else if runtime.has_function(constructor.fn_name(), curried) {
                constructor.call::<Dynamic>(&runtime.engine, &runtime.ast, ())
            } else {
                return Err(format!(
                    "constructor '{}' is not a function defined by the script",
                    constructor.fn_name()
                ));
            };
            let instance = instance.map_err(|e| e.to_string())?;
            if !instance.is_map() {
                return Err(format!(
                    "constructor must return an object map, got {}",
                    instance.type_name()
                ));
            }
            Ok(instance)
        })?;
        debug!(plugin = %runtime.plugin_id, "Constructor returned instance");
        Ok(instance)
    }
}
