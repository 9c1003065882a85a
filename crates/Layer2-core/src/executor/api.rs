//! PluginApi - the capability object handed to plugin scripts
//!
//! A fresh object is built for every instantiation. It is the only host
//! access a script has:
//!
//! ```text
//! api.hooks.register(name, handler, priority?)
//! api.config.get(key, fallback?) / api.config.set(key, value) / api.config.all()
//! api.ui.add_toolbar_button(#{ id, label, icon?, tooltip? })
//! api.ui.remove_toolbar_button(id)
//! api.ui.show_notification(message, level?)
//! api.session.get_current()
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use plughost_foundation::{Error, Result};
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, Map};
use std::sync::{Arc, Weak};
use tracing::debug;

use super::engine::{from_dynamic, to_dynamic, ScriptRuntime};
use super::host::{HostServices, HostUi, NotificationLevel, SessionProvider, ToolbarButton};
use crate::config::ConfigService;
use crate::hook::{HookContext, HookDispatcher, HookHandler, HookName, HookResult, PendingHandler};

type ScriptResult<T> = std::result::Result<T, Box<EvalAltResult>>;

// ============================================================================
// PluginApi
// ============================================================================

#[derive(Clone)]
pub struct PluginApi {
    plugin_id: String,
    hooks: HooksApi,
    config: ConfigApi,
    ui: UiApi,
    session: SessionApi,
}

impl PluginApi {
    pub(crate) fn new(hooks: Arc<PluginHooks>, ui: UiApi, services: &HostServices) -> Self {
        let plugin_id = hooks.plugin_id.clone();
        Self {
            config: ConfigApi {
                plugin_id: plugin_id.clone(),
                service: services.config.clone(),
            },
            hooks: HooksApi { hooks },
            ui,
            session: SessionApi {
                provider: services.session.clone(),
            },
            plugin_id,
        }
    }
}

/// Expose the capability types to an engine
pub(crate) fn register_api(engine: &mut Engine) {
    engine
        .register_type_with_name::<PluginApi>("PluginApi")
        .register_get("plugin_id", |api: &mut PluginApi| api.plugin_id.clone())
        .register_get("hooks", |api: &mut PluginApi| api.hooks.clone())
        .register_get("config", |api: &mut PluginApi| api.config.clone())
        .register_get("ui", |api: &mut PluginApi| api.ui.clone())
        .register_get("session", |api: &mut PluginApi| api.session.clone());

    engine
        .register_type_with_name::<HooksApi>("HooksApi")
        .register_fn(
            "register",
            |h: &mut HooksApi, name: &str, handler: FnPtr, priority: i64| {
                h.register(name, handler, Some(priority))
            },
        )
        .register_fn("register", |h: &mut HooksApi, name: &str, handler: FnPtr| {
            h.register(name, handler, None)
        })
        .register_fn(
            "register",
            |h: &mut HooksApi, name: &str, handler: &str, priority: i64| -> ScriptResult<()> {
                h.register(name, FnPtr::new(handler)?, Some(priority))
            },
        )
        .register_fn("register", |h: &mut HooksApi, name: &str, handler: &str| -> ScriptResult<()> {
            h.register(name, FnPtr::new(handler)?, None)
        });

    engine
        .register_type_with_name::<ConfigApi>("ConfigApi")
        .register_fn("get", |c: &mut ConfigApi, key: &str| c.get(key, Dynamic::UNIT))
        .register_fn("get", |c: &mut ConfigApi, key: &str, fallback: Dynamic| {
            c.get(key, fallback)
        })
        .register_fn("set", |c: &mut ConfigApi, key: &str, value: Dynamic| c.set(key, value))
        .register_fn("all", |c: &mut ConfigApi| c.all());

    engine
        .register_type_with_name::<UiApi>("UiApi")
        .register_fn("add_toolbar_button", |u: &mut UiApi, button: Map| {
            u.add_toolbar_button(button)
        })
        .register_fn("remove_toolbar_button", |u: &mut UiApi, id: &str| {
            u.remove_toolbar_button(id);
        })
        .register_fn("show_notification", |u: &mut UiApi, message: &str| {
            u.show_notification(message, "info")
        })
        .register_fn(
            "show_notification",
            |u: &mut UiApi, message: &str, level: &str| u.show_notification(message, level),
        );

    engine
        .register_type_with_name::<SessionApi>("SessionApi")
        .register_fn("get_current", |s: &mut SessionApi| s.get_current());
}

// ============================================================================
// hooks
// ============================================================================

#[derive(Clone)]
pub struct HooksApi {
    hooks: Arc<PluginHooks>,
}

impl HooksApi {
    fn register(&mut self, name: &str, handler: FnPtr, priority: Option<i64>) -> ScriptResult<()> {
        let hook: HookName = name.parse::<HookName>()?;
        let priority = match priority {
            Some(p) => Some(
                i32::try_from(p).map_err(|_| format!("hook priority {} is out of range", p))?,
            ),
            None => None,
        };
        self.hooks.declare(hook, handler, priority).map_err(Into::into)
    }
}

#[derive(Clone)]
struct DeclaredHook {
    hook: HookName,
    priority: i32,
    fn_name: String,
    curry: Vec<Dynamic>,
}

struct HookState {
    declared: Vec<DeclaredHook>,
    active: bool,
}

/// Hooks a plugin declared, and whether they are live in the dispatcher
///
/// Declarations survive disable/enable; only activation touches the
/// dispatcher. Handlers hold a weak reference to the runtime.
pub(crate) struct PluginHooks {
    plugin_id: String,
    dispatcher: Arc<HookDispatcher>,
    runtime: Weak<ScriptRuntime>,
    default_priority: i32,
    state: Mutex<HookState>,
}

impl PluginHooks {
    pub(crate) fn new(
        runtime: &Arc<ScriptRuntime>,
        dispatcher: Arc<HookDispatcher>,
        default_priority: i32,
    ) -> Self {
        Self {
            plugin_id: runtime.plugin_id.clone(),
            dispatcher,
            runtime: Arc::downgrade(runtime),
            default_priority,
            state: Mutex::new(HookState {
                declared: Vec::new(),
                active: false,
            }),
        }
    }

    fn declare(&self, hook: HookName, handler: FnPtr, priority: Option<i32>) -> std::result::Result<(), String> {
        let arity = handler.curry().len() + 1;
        let defined = self
            .runtime
            .upgrade()
            .map_or(false, |rt| rt.has_function(handler.fn_name(), arity));
        if !defined {
            return Err(format!(
                "hook handler '{}' must be a script function taking {} argument(s)",
                handler.fn_name(),
                arity
            ));
        }

        let declared = DeclaredHook {
            hook,
            priority: priority.unwrap_or(self.default_priority),
            fn_name: handler.fn_name().to_string(),
            curry: handler.curry().to_vec(),
        };

        let mut state = self.state.lock();
        // Re-running on_enable must not stack the same handler twice
        let repeated = declared.curry.is_empty()
            && state.declared.iter().any(|d| {
                d.hook == declared.hook
                    && d.fn_name == declared.fn_name
                    && d.priority == declared.priority
                    && d.curry.is_empty()
            });
        if repeated {
            return Ok(());
        }
        if state.active {
            self.dispatcher.register(
                hook,
                &self.plugin_id,
                self.handler_for(declared.hook, &declared.fn_name, &declared.curry),
                declared.priority,
            );
        }
        debug!(plugin = %self.plugin_id, hook = %hook, "Hook declared");
        state.declared.push(declared);
        Ok(())
    }

    /// Make every declared hook live, plus `extra`, in one dispatcher update
    pub(crate) fn activate(&self, extra: Vec<PendingHandler>) {
        let mut state = self.state.lock();
        if state.active {
            return;
        }
        let mut batch: Vec<PendingHandler> = state
            .declared
            .iter()
            .map(|d| PendingHandler {
                hook: d.hook,
                priority: d.priority,
                handler: self.handler_for(d.hook, &d.fn_name, &d.curry),
            })
            .collect();
        batch.extend(extra);
        self.dispatcher.register_all(&self.plugin_id, batch);
        state.active = true;
    }

    pub(crate) fn deactivate(&self) {
        let mut state = self.state.lock();
        state.active = false;
        self.dispatcher.unregister_all(&self.plugin_id);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub(crate) fn max_result_depth(&self) -> usize {
        self.dispatcher.max_result_depth()
    }

    /// `(hook, priority)` of every declaration, in declaration order
    pub(crate) fn declared(&self) -> Vec<(HookName, i32)> {
        self.state
            .lock()
            .declared
            .iter()
            .map(|d| (d.hook, d.priority))
            .collect()
    }

    pub(crate) fn handler_for(&self, hook: HookName, fn_name: &str, curry: &[Dynamic]) -> Arc<dyn HookHandler> {
        Arc::new(ScriptHookHandler {
            runtime: self.runtime.clone(),
            plugin_id: self.plugin_id.clone(),
            hook,
            fn_name: fn_name.to_string(),
            curry: curry.to_vec(),
            max_depth: self.dispatcher.max_result_depth(),
        })
    }
}

/// Calls a script function with the hook context
struct ScriptHookHandler {
    runtime: Weak<ScriptRuntime>,
    plugin_id: String,
    hook: HookName,
    fn_name: String,
    curry: Vec<Dynamic>,
    max_depth: usize,
}

#[async_trait]
impl HookHandler for ScriptHookHandler {
    async fn handle(&self, ctx: &HookContext) -> Result<Option<HookResult>> {
        let fail = |message: String| Error::handler(&self.plugin_id, self.hook.as_str(), message);

        let runtime = self
            .runtime
            .upgrade()
            .ok_or_else(|| fail("plugin instance is gone".to_string()))?;

        let mut args = self.curry.clone();
        args.push(to_dynamic(&ctx.to_value(self.hook)).map_err(fail)?);

        let value = runtime.call_json(&self.fn_name, args).map_err(fail)?;
        HookResult::from_value(&value, self.max_depth).map_err(fail)
    }
}

// ============================================================================
// config
// ============================================================================

#[derive(Clone)]
pub struct ConfigApi {
    plugin_id: String,
    service: Arc<ConfigService>,
}

impl ConfigApi {
    fn get(&mut self, key: &str, fallback: Dynamic) -> ScriptResult<Dynamic> {
        match self.service.get(&self.plugin_id, key) {
            Ok(Some(value)) => Ok(to_dynamic(&value)?),
            Ok(None) => Ok(fallback),
            Err(e) => Err(e.to_string().into()),
        }
    }

    /// Validated write; a rejected value is thrown into the script
    fn set(&mut self, key: &str, value: Dynamic) -> ScriptResult<()> {
        let value = from_dynamic(&value)?;
        self.service
            .set(&self.plugin_id, key, value)
            .map(|_| ())
            .map_err(|e| e.to_string().into())
    }

    fn all(&mut self) -> ScriptResult<Dynamic> {
        let values = self
            .service
            .load(&self.plugin_id)
            .map_err(|e| e.to_string())?;
        Ok(to_dynamic(&serde_json::Value::Object(values))?)
    }
}

// ============================================================================
// ui
// ============================================================================

#[derive(Clone)]
pub struct UiApi {
    plugin_id: String,
    host: Arc<dyn HostUi>,
    /// Buttons this plugin currently shows
    buttons: Arc<Mutex<Vec<String>>>,
}

impl UiApi {
    pub(crate) fn new(plugin_id: &str, host: Arc<dyn HostUi>) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            host,
            buttons: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn add_toolbar_button(&mut self, button: Map) -> ScriptResult<String> {
        let button: ToolbarButton = from_dynamic(&Dynamic::from_map(button))
            .and_then(|value| serde_json::from_value(value).map_err(|e| e.to_string()))
            .map_err(|e| format!("invalid toolbar button: {}", e))?;
        let id = button.id.clone();
        {
            let mut buttons = self.buttons.lock();
            if buttons.contains(&id) {
                self.host.remove_toolbar_button(&self.plugin_id, &id);
            } else {
                buttons.push(id.clone());
            }
        }
        self.host.add_toolbar_button(&self.plugin_id, button);
        Ok(id)
    }

    fn remove_toolbar_button(&mut self, id: &str) {
        self.buttons.lock().retain(|b| b != id);
        self.host.remove_toolbar_button(&self.plugin_id, id);
    }

    fn show_notification(&mut self, message: &str, level: &str) -> ScriptResult<()> {
        let level: NotificationLevel = level.parse::<NotificationLevel>()?;
        self.host.show_notification(&self.plugin_id, message, level);
        Ok(())
    }

    /// Take down every button the plugin added
    pub(crate) fn remove_all(&self) {
        let buttons = std::mem::take(&mut *self.buttons.lock());
        for id in buttons {
            self.host.remove_toolbar_button(&self.plugin_id, &id);
        }
    }

    pub(crate) fn buttons(&self) -> Vec<String> {
        self.buttons.lock().clone()
    }
}

// ============================================================================
// session
// ============================================================================

#[derive(Clone)]
pub struct SessionApi {
    provider: Arc<dyn SessionProvider>,
}

impl SessionApi {
    fn get_current(&mut self) -> ScriptResult<Dynamic> {
        match self.provider.current() {
            Some(snapshot) => Ok(rhai::serde::to_dynamic(&snapshot)?),
            None => Ok(Dynamic::UNIT),
        }
    }
}
