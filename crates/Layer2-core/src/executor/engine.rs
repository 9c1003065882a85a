//! Sandboxed rhai engine and the per-plugin script runtime

use parking_lot::Mutex;
use plughost_foundation::SandboxLimits;
use rhai::{CallFnOptions, Dynamic, Engine, FuncArgs, Scope, AST};
use serde_json::Value;
use std::collections::HashSet;
use std::thread;
use tracing::{debug, info};

use super::api::register_api;
use crate::hook::panic_message;

/// Stack of the thread every script call runs on
///
/// Sized for the deepest nesting `HostConfig::validate` lets the array and
/// map limits reach (`MAX_CONTAINER_ELEMENTS`).
const SCRIPT_STACK_SIZE: usize = 32 * 1024 * 1024;

/// Deepest array/map nesting converted to JSON
const MAX_VALUE_DEPTH: usize = 64;

/// Fresh engine with the sandbox limits applied
///
/// No module resolution, no `eval`. Script output goes to tracing.
pub(crate) fn build_engine(plugin_id: &str, limits: &SandboxLimits) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);

    engine.set_module_resolver(rhai::module_resolvers::DummyModuleResolver::new());
    engine.disable_symbol("eval");

    let id = plugin_id.to_string();
    engine.on_print(move |text| info!(plugin = %id, "{}", text));
    let id = plugin_id.to_string();
    engine.on_debug(move |text, _source, pos| debug!(plugin = %id, %pos, "{}", text));

    register_api(&mut engine);
    engine
}

// ============================================================================
// ScriptRuntime
// ============================================================================

/// Compiled plugin script plus the instance object its methods run against
///
/// `this` sits behind a mutex: calls into one instance never overlap.
pub(crate) struct ScriptRuntime {
    pub(crate) plugin_id: String,
    pub(crate) engine: Engine,
    pub(crate) ast: AST,
    this: Mutex<Dynamic>,
    functions: HashSet<(String, usize)>,
}

impl ScriptRuntime {
    pub(crate) fn new(plugin_id: &str, engine: Engine, ast: AST) -> Self {
        let functions = ast
            .iter_functions()
            .map(|f| (f.name.to_string(), f.params.len()))
            .collect();
        Self {
            plugin_id: plugin_id.to_string(),
            engine,
            ast,
            this: Mutex::new(Dynamic::UNIT),
            functions,
        }
    }

    pub(crate) fn has_function(&self, name: &str, arity: usize) -> bool {
        self.functions.contains(&(name.to_string(), arity))
    }

    /// Install the object produced by the constructor
    pub(crate) fn set_instance(&self, instance: Dynamic) {
        *self.this.lock() = instance;
    }

    /// Call a script function with `this` bound to the instance
    pub(crate) fn call(&self, name: &str, args: impl FuncArgs + Send) -> Result<Dynamic, String> {
        self.call_with(name, args, Ok)
    }

    /// Like [`call`](Self::call), converting the return value to JSON
    pub(crate) fn call_json(&self, name: &str, args: impl FuncArgs + Send) -> Result<Value, String> {
        self.call_with(name, args, |value| from_dynamic(&value))
    }

    /// The return value is converted and dropped on the script thread
    fn call_with<T: Send>(
        &self,
        name: &str,
        args: impl FuncArgs + Send,
        convert: impl FnOnce(Dynamic) -> Result<T, String> + Send,
    ) -> Result<T, String> {
        let mut guard = self.this.lock();
        let this: &mut Dynamic = &mut guard;
        on_script_stack(|| {
            let mut scope = Scope::new();
            let options = CallFnOptions::new()
                .eval_ast(false)
                .rewind_scope(true)
                .bind_this_ptr(this);
            let value = self
                .engine
                .call_fn_with_options::<Dynamic>(options, &mut scope, &self.ast, name, args)
                .map_err(|e| e.to_string())?;
            convert(value)
        })
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        let this = std::mem::take(self.this.get_mut());
        if let Err(e) = on_script_stack(move || {
            drop(this);
            Ok(())
        }) {
            debug!(plugin = %self.plugin_id, "Dropping instance state failed: {}", e);
        }
    }
}

/// Run plugin code on a thread with [`SCRIPT_STACK_SIZE`] of stack
///
/// Script errors come back as messages, panics are turned into messages too.
pub(crate) fn on_script_stack<T: Send>(
    f: impl FnOnce() -> Result<T, String> + Send,
) -> Result<T, String> {
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("plugin-script".into())
            .stack_size(SCRIPT_STACK_SIZE)
            .spawn_scoped(scope, f)
            .map_err(|e| format!("failed to start script thread: {}", e))?;
        handle
            .join()
            .map_err(|panic| format!("script engine panicked: {}", panic_message(panic.as_ref())))?
    })
}

pub(crate) fn to_dynamic(value: &Value) -> Result<Dynamic, String> {
    rhai::serde::to_dynamic(value).map_err(|e| e.to_string())
}

pub(crate) fn from_dynamic(value: &Dynamic) -> Result<Value, String> {
    if nested_deeper_than(value, MAX_VALUE_DEPTH) {
        return Err(format!(
            "unsupported return value: nested deeper than {} levels",
            MAX_VALUE_DEPTH
        ));
    }
    rhai::serde::from_dynamic::<Value>(value).map_err(|e| format!("unsupported return value: {}", e))
}

/// Recursion stops at `levels`, whatever the value's real depth
fn nested_deeper_than(value: &Dynamic, levels: usize) -> bool {
    if let Ok(array) = value.as_array_ref() {
        return levels == 0 || array.iter().any(|v| nested_deeper_than(v, levels - 1));
    }
    if let Ok(map) = value.as_map_ref() {
        return levels == 0 || map.values().any(|v| nested_deeper_than(v, levels - 1));
    }
    false
}
