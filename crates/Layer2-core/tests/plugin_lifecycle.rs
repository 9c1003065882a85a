//! End-to-end plugin lifecycle through the manager

use parking_lot::Mutex;
use plughost_core::config::ConfigService;
use plughost_core::executor::{HostServices, HostUi, NotificationLevel, ToolbarButton};
use plughost_core::hook::{HookContext, HookDispatcher, HookName, HookResult};
use plughost_core::plugin::{
    CapabilityType, DiscoveredPlugin, PluginEventKind, PluginManager, PluginStatus,
    StaticPluginSource,
};
use plughost_foundation::{
    ConfigValues, Error, HostConfig, JsonSettingsStore, JsonStore, MemorySettingsStore,
    SettingsStore,
};
use serde_json::{json, Value};
use std::sync::Arc;

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Default)]
struct RecordingUi {
    buttons: Mutex<Vec<String>>,
}

impl HostUi for RecordingUi {
    fn add_toolbar_button(&self, _plugin_id: &str, button: ToolbarButton) {
        self.buttons.lock().push(button.id);
    }

    fn remove_toolbar_button(&self, _plugin_id: &str, button_id: &str) {
        self.buttons.lock().retain(|b| b != button_id);
    }

    fn show_notification(&self, _plugin_id: &str, _message: &str, _level: NotificationLevel) {}
}

fn manager_with(store: Arc<dyn SettingsStore>, ui: Arc<RecordingUi>) -> PluginManager {
    let config = HostConfig::default();
    let dispatcher = Arc::new(HookDispatcher::new(&config.hooks));
    let configs = Arc::new(ConfigService::new(store));
    let services = HostServices::new(dispatcher, configs).with_ui(ui);
    PluginManager::with_services(&config, services).unwrap()
}

fn manager() -> PluginManager {
    manager_with(
        Arc::new(MemorySettingsStore::new()),
        Arc::new(RecordingUi::default()),
    )
}

fn manifest(id: &str, capabilities: &[&str]) -> Value {
    json!({
        "id": id,
        "name": id,
        "version": "1.0.0",
        "description": "lifecycle fixture",
        "author": "tests",
        "capabilityTypes": capabilities,
        "hostVersionRange": "^1.0",
    })
}

/// Plugin contributing a badge under user messages
fn footer_script(label: &str, priority: i64) -> String {
    format!(
        r#"
fn create(api) {{
    api.hooks.register("render.user-message-footer", "footer", {priority});
    #{{ label: "{label}" }}
}}

fn footer(ctx) {{
    #{{ type: "badge", label: this.label }}
}}

Fn("create")
"#
    )
}

fn footer_plugin(id: &str, label: &str, priority: i64) -> DiscoveredPlugin {
    DiscoveredPlugin::external(manifest(id, &["storage"]), footer_script(label, priority))
}

fn render_plugin(id: &str) -> DiscoveredPlugin {
    DiscoveredPlugin::external(
        manifest(id, &["render"]),
        r#"
        fn create() { #{} }
        fn can_render(content) { content.starts_with("```") }
        fn render(content) { #{ type: "text", content: content } }
        Fn("create")
        "#,
    )
}

async fn footers(manager: &PluginManager) -> Vec<HookResult> {
    manager
        .execute_hook(
            HookName::UserMessageFooter,
            HookContext::new(json!({ "content": "hello" })),
        )
        .await
}

fn values(value: Value) -> ConfigValues {
    value.as_object().cloned().unwrap()
}

// ============================================================================
// Registration and capability queries
// ============================================================================

#[tokio::test]
async fn test_get_by_capability_includes_plugin_once() {
    let manager = manager();
    for id in ["acme.a", "acme.b", "acme.c"] {
        manager.register(render_plugin(id)).await.unwrap();
    }
    manager
        .register(footer_plugin("acme.footer", "F", 10))
        .await
        .unwrap();

    let renderers = manager.get_by_capability(CapabilityType::Render).await;
    let ids: Vec<_> = renderers.iter().map(|p| p.id().to_string()).collect();
    assert_eq!(ids, vec!["acme.a", "acme.b", "acme.c"]);
    assert!(renderers.iter().all(|p| p.as_renderer().is_some()));

    let rendered = manager.render_content("```rust\nfn main() {}\n```").await.unwrap();
    assert_eq!(rendered.plugin_id, "acme.a");
    assert!(manager.render_content("plain text").await.is_none());

    assert!(manager
        .get_by_capability(CapabilityType::Tool)
        .await
        .is_empty());
}

#[tokio::test]
async fn test_duplicate_id_leaves_existing_record() {
    let manager = manager();
    manager
        .register(footer_plugin("acme.footer", "first", 10))
        .await
        .unwrap();

    let err = manager
        .register(footer_plugin("acme.footer", "second", 10))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicatePlugin(ref id) if id == "acme.footer"));

    assert_eq!(manager.list().await.len(), 1);
    assert_eq!(footers(&manager).await, vec![HookResult::badge("first")]);
}

#[tokio::test]
async fn test_invalid_manifest_stores_nothing() {
    let manager = manager();
    let mut raw = manifest("acme.bad", &["render"]);
    raw["capabilityTypes"] = json!([]);

    let err = manager
        .register(DiscoveredPlugin::external(raw, "Fn(\"create\")"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ManifestValidation(_)));
    assert!(manager.get("acme.bad").await.is_none());
}

#[tokio::test]
async fn test_execution_error_is_recorded_not_raised() {
    let manager = manager();
    manager
        .register(footer_plugin("acme.good", "good", 10))
        .await
        .unwrap();

    let view = manager
        .register(DiscoveredPlugin::external(
            manifest("acme.broken", &["storage"]),
            "fn create() { throw \"no\"; } Fn(\"create\")",
        ))
        .await
        .unwrap();
    assert!(!view.loaded);
    assert_eq!(view.status, PluginStatus::Failed);
    assert!(view.last_error.unwrap().contains("no"));

    assert!(matches!(
        manager.enable("acme.broken").await,
        Err(Error::PluginNotLoaded(_))
    ));
    assert_eq!(footers(&manager).await, vec![HookResult::badge("good")]);

    let summary = manager.summary().await;
    assert_eq!(summary.total, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.active, 1);
}

#[tokio::test]
async fn test_incompatible_host_version_is_failed_record() {
    let manager = manager();
    let mut raw = manifest("acme.future", &["storage"]);
    raw["hostVersionRange"] = json!(">=2.0.0");

    let view = manager
        .register(DiscoveredPlugin::external(raw, footer_script("x", 1)))
        .await
        .unwrap();
    assert!(!view.loaded);
    assert!(view.last_error.unwrap().contains(">=2.0.0"));
    assert!(footers(&manager).await.is_empty());
}

// ============================================================================
// Enable / disable
// ============================================================================

#[tokio::test]
async fn test_core_plugin_cannot_be_disabled() {
    let manager = manager();
    let mut raw = manifest("builtin.core", &["storage"]);
    raw["isCore"] = json!(true);
    manager
        .register(DiscoveredPlugin::bundled(raw, footer_script("core", 1)))
        .await
        .unwrap();

    let err = manager.disable("builtin.core").await.unwrap_err();
    assert!(matches!(err, Error::CorePluginLocked(_)));
    assert!(matches!(
        manager.enable("builtin.core").await,
        Err(Error::CorePluginLocked(_))
    ));

    let view = manager.get("builtin.core").await.unwrap();
    assert!(view.enabled);
    assert!(view.is_core);
    assert_eq!(footers(&manager).await, vec![HookResult::badge("core")]);
}

#[tokio::test]
async fn test_external_plugin_cannot_claim_core() {
    let manager = manager();
    let mut raw = manifest("acme.sneaky", &["storage"]);
    raw["isCore"] = json!(true);
    manager
        .register(DiscoveredPlugin::external(raw, footer_script("s", 1)))
        .await
        .unwrap();

    assert!(!manager.get("acme.sneaky").await.unwrap().is_core);
    manager.disable("acme.sneaky").await.unwrap();
}

#[tokio::test]
async fn test_disable_removes_contribution_and_enable_restores_it() {
    let manager = manager();
    manager
        .register(footer_plugin("acme.a", "A", 10))
        .await
        .unwrap();
    manager
        .register(footer_plugin("acme.b", "B", 20))
        .await
        .unwrap();

    manager.disable("acme.a").await.unwrap();
    let detailed = manager
        .execute_hook_detailed(HookName::UserMessageFooter, HookContext::default())
        .await;
    assert!(detailed.iter().all(|c| c.plugin_id != "acme.a"));
    assert_eq!(detailed.len(), 1);
    assert!(manager.get_by_capability(CapabilityType::Storage).await.len() == 1);

    manager.enable("acme.a").await.unwrap();
    assert_eq!(
        footers(&manager).await,
        vec![HookResult::badge("A"), HookResult::badge("B")]
    );

    // Repeated toggles do not stack handlers
    manager.disable("acme.a").await.unwrap();
    manager.enable("acme.a").await.unwrap();
    assert_eq!(footers(&manager).await.len(), 2);
}

#[tokio::test]
async fn test_setup_failure_leaves_plugin_disabled() {
    let manager = manager();
    let source = r#"
        fn create(api) {
            api.hooks.register("render.user-message-footer", "footer", 1);
            #{}
        }
        fn footer(ctx) { "x" }
        fn on_enable() { throw "cannot enable"; }
        Fn("create")
    "#;
    manager
        .register(DiscoveredPlugin::external(manifest("acme.picky", &["storage"]), source))
        .await
        .unwrap();
    manager.disable("acme.picky").await.unwrap();

    let err = manager.enable("acme.picky").await.unwrap_err();
    assert!(matches!(err, Error::Lifecycle { ref method, .. } if method == "on_enable"));

    let view = manager.get("acme.picky").await.unwrap();
    assert!(!view.enabled);
    assert!(view.loaded);
    assert!(view.last_error.unwrap().contains("cannot enable"));
    assert!(footers(&manager).await.is_empty());
}

#[tokio::test]
async fn test_toolbar_buttons_follow_plugin_state() {
    let ui = Arc::new(RecordingUi::default());
    let manager = manager_with(Arc::new(MemorySettingsStore::new()), ui.clone());
    let source = r#"
        fn create(api) {
            api.ui.add_toolbar_button(#{ id: "export", label: "Export" });
            #{ api: api }
        }
        fn on_enable() {
            this.api.ui.add_toolbar_button(#{ id: "export", label: "Export" });
        }
        Fn("create")
    "#;
    manager
        .register(DiscoveredPlugin::external(manifest("acme.export", &["storage"]), source))
        .await
        .unwrap();
    assert_eq!(*ui.buttons.lock(), vec!["export".to_string()]);

    manager.disable("acme.export").await.unwrap();
    assert!(ui.buttons.lock().is_empty());

    manager.enable("acme.export").await.unwrap();
    assert_eq!(*ui.buttons.lock(), vec!["export".to_string()]);
    assert_eq!(
        manager.get("acme.export").await.unwrap().toolbar_buttons,
        vec!["export".to_string()]
    );

    manager.remove("acme.export").await.unwrap();
    assert!(ui.buttons.lock().is_empty());
}

#[tokio::test]
async fn test_enabled_state_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let open = || -> Arc<dyn SettingsStore> {
        Arc::new(JsonSettingsStore::open(JsonStore::new(dir.path())).unwrap())
    };

    let first = manager_with(open(), Arc::new(RecordingUi::default()));
    first
        .register(footer_plugin("acme.footer", "F", 1))
        .await
        .unwrap();
    first.disable("acme.footer").await.unwrap();

    let second = manager_with(open(), Arc::new(RecordingUi::default()));
    let view = second
        .register(footer_plugin("acme.footer", "F", 1))
        .await
        .unwrap();
    assert!(view.loaded);
    assert!(!view.enabled);
    assert!(footers(&second).await.is_empty());
}

// ============================================================================
// Hook ordering
// ============================================================================

#[tokio::test]
async fn test_lower_priority_runs_first() {
    let manager = manager();
    manager
        .register(footer_plugin("acme.a", "A", 10))
        .await
        .unwrap();
    manager
        .register(footer_plugin("acme.b", "B", 5))
        .await
        .unwrap();

    assert_eq!(
        footers(&manager).await,
        vec![HookResult::badge("B"), HookResult::badge("A")]
    );
}

#[tokio::test]
async fn test_throwing_handler_is_omitted() {
    let manager = manager();
    manager
        .register(footer_plugin("acme.first", "1", 1))
        .await
        .unwrap();
    manager
        .register(DiscoveredPlugin::external(
            manifest("acme.thrower", &["storage"]),
            r#"
            fn create(api) {
                api.hooks.register("render.user-message-footer", "footer", 2);
                #{}
            }
            fn footer(ctx) { throw "handler exploded"; }
            Fn("create")
            "#,
        ))
        .await
        .unwrap();
    manager
        .register(footer_plugin("acme.third", "3", 3))
        .await
        .unwrap();

    assert_eq!(
        footers(&manager).await,
        vec![HookResult::badge("1"), HookResult::badge("3")]
    );
    // The thrower stays enabled; only its contribution is dropped
    assert!(manager.get("acme.thrower").await.unwrap().enabled);
}

#[tokio::test]
async fn test_deeply_nested_values_fail_the_handler_only() {
    let depth = HostConfig::default().sandbox.max_array_size - 8;
    let script = format!(
        r#"
fn create(api) {{
    api.hooks.register("render.user-message-footer", "past_limit", 1);
    api.hooks.register("render.user-message-footer", "built_then_dropped", 2);
    api.hooks.register("render.user-message-footer", "at_limit", 3);
    #{{}}
}}

fn nest(n) {{
    let x = [];
    for i in 0..n {{ x = [x]; }}
    x
}}

fn past_limit(ctx) {{ nest(9000) }}
fn built_then_dropped(ctx) {{ let x = nest({depth}); () }}
fn at_limit(ctx) {{ nest({depth}) }}

Fn("create")
"#
    );
    let manager = manager();
    manager
        .register(DiscoveredPlugin::external(manifest("acme.deep", &["storage"]), script))
        .await
        .unwrap();
    manager
        .register(footer_plugin("acme.footer", "ok", 10))
        .await
        .unwrap();

    assert_eq!(footers(&manager).await, vec![HookResult::badge("ok")]);
    assert_eq!(footers(&manager).await, vec![HookResult::badge("ok")]);
    assert!(manager.get("acme.deep").await.unwrap().enabled);
}

// ============================================================================
// Config
// ============================================================================

fn retries_plugin() -> DiscoveredPlugin {
    let mut raw = manifest("acme.retry", &["storage"]);
    raw["configSchema"] = json!({
        "retries": { "type": "number", "min": 1, "max": 5, "default": 3 }
    });
    DiscoveredPlugin::external(raw, "fn create() { #{} } Fn(\"create\")")
}

#[tokio::test]
async fn test_retries_scenario() {
    let manager = manager();
    manager.register(retries_plugin()).await.unwrap();

    let schema = manager.config().schema("acme.retry").unwrap();
    assert_eq!(
        Value::Object(ConfigService::get_defaults(&schema)),
        json!({ "retries": 3 })
    );

    let err = manager
        .save_config("acme.retry", values(json!({ "retries": 10 })))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConfigValidation { ref key, .. } if key == "retries"));
    assert_eq!(
        Value::Object(manager.load_config("acme.retry").unwrap()),
        json!({ "retries": 3 })
    );

    manager
        .save_config("acme.retry", values(json!({ "retries": 4 })))
        .await
        .unwrap();
    assert_eq!(
        Value::Object(manager.load_config("acme.retry").unwrap()),
        json!({ "retries": 4 })
    );
}

#[tokio::test]
async fn test_save_config_is_all_or_nothing() {
    let store = Arc::new(MemorySettingsStore::new());
    let manager = manager_with(store.clone(), Arc::new(RecordingUi::default()));

    let mut raw = manifest("acme.five", &["storage"]);
    raw["configSchema"] = json!({
        "a": { "type": "string", "default": "x" },
        "b": { "type": "number", "min": 0, "max": 10, "default": 1 },
        "c": { "type": "boolean", "default": false },
        "d": { "type": "choice", "options": ["red", "blue"], "default": "red" },
        "e": { "type": "number", "default": 0 }
    });
    manager
        .register(DiscoveredPlugin::external(raw, "fn create() { #{} } Fn(\"create\")"))
        .await
        .unwrap();

    let before = json!({ "a": "y", "b": 2, "c": true, "d": "blue", "e": 7 });
    manager
        .save_config("acme.five", values(before.clone()))
        .await
        .unwrap();

    let err = manager
        .save_config(
            "acme.five",
            values(json!({ "a": "z", "b": 3, "c": false, "d": "green", "e": 8 })),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConfigValidation { ref key, .. } if key == "d"));

    assert_eq!(Value::Object(manager.load_config("acme.five").unwrap()), before);
    assert_eq!(
        Value::Object(store.snapshot().config["acme.five"].clone()),
        before
    );
}

#[tokio::test]
async fn test_save_config_notifies_plugin() {
    let manager = manager();
    let mut raw = manifest("acme.watch", &["storage"]);
    raw["configSchema"] = json!({ "label": { "type": "string", "default": "old" } });
    let source = r#"
        fn create(api) {
            api.hooks.register("render.user-message-footer", "footer");
            #{ api: api, seen: "none" }
        }
        fn on_config_change(values) { this.seen = values.label; }
        fn footer(ctx) { `${this.seen}/${this.api.config.get("label")}` }
        Fn("create")
    "#;
    manager
        .register(DiscoveredPlugin::external(raw, source))
        .await
        .unwrap();
    let mut events = manager.subscribe();

    assert_eq!(footers(&manager).await, vec![HookResult::string("none/old")]);

    manager
        .save_config("acme.watch", values(json!({ "label": "new" })))
        .await
        .unwrap();
    assert_eq!(footers(&manager).await, vec![HookResult::string("new/new")]);

    let event = events.try_recv().unwrap();
    assert_eq!(event.kind, PluginEventKind::ConfigChanged);
    assert_eq!(event.detail, json!({ "label": "new" }));
}

// ============================================================================
// Reload / remove
// ============================================================================

#[tokio::test]
async fn test_reload_with_throwing_constructor() {
    let source = Arc::new(StaticPluginSource::new());
    source.insert(footer_plugin("acme.stable", "stable", 1));
    source.insert(footer_plugin("acme.flaky", "flaky", 2));

    let manager = manager();
    let report = manager.load_all(source.clone()).await.unwrap();
    assert_eq!(report.records.len(), 2);
    let stable_before = manager.get("acme.stable").await.unwrap();

    source.replace(DiscoveredPlugin::external(
        manifest("acme.flaky", &["storage"]),
        "fn create(api) { throw \"constructor exploded\"; } Fn(\"create\")",
    ));
    let err = manager.reload("acme.flaky").await.unwrap_err();
    assert!(matches!(err, Error::Execution { .. }));

    let flaky = manager.get("acme.flaky").await.unwrap();
    assert!(!flaky.loaded);
    assert!(flaky.last_error.unwrap().contains("constructor exploded"));

    assert_eq!(manager.get("acme.stable").await.unwrap(), stable_before);
    assert_eq!(footers(&manager).await, vec![HookResult::badge("stable")]);

    // A fixed source brings it back
    source.replace(footer_plugin("acme.flaky", "fixed", 2));
    let view = manager.reload("acme.flaky").await.unwrap();
    assert!(view.loaded && view.enabled);
    assert!(view.last_error.is_none());
    assert_eq!(
        footers(&manager).await,
        vec![HookResult::badge("stable"), HookResult::badge("fixed")]
    );
}

#[tokio::test]
async fn test_reload_failure_before_teardown_keeps_instance() {
    let source = Arc::new(StaticPluginSource::new());
    source.insert(footer_plugin("acme.footer", "v1", 1));
    let manager = manager();
    manager.load_all(source.clone()).await.unwrap();

    let mut broken = manifest("acme.footer", &["storage"]);
    broken["version"] = json!("not-a-version");
    source.replace(DiscoveredPlugin::external(broken, footer_script("v2", 1)));

    let err = manager.reload("acme.footer").await.unwrap_err();
    assert!(matches!(err, Error::ManifestValidation(_)));
    let view = manager.get("acme.footer").await.unwrap();
    assert!(view.loaded && view.enabled);
    assert_eq!(footers(&manager).await, vec![HookResult::badge("v1")]);
}

#[tokio::test]
async fn test_reload_keeps_disabled_state_and_order() {
    let source = Arc::new(StaticPluginSource::new());
    source.insert(footer_plugin("acme.a", "A", 1));
    source.insert(footer_plugin("acme.b", "B", 1));
    let manager = manager();
    manager.load_all(source.clone()).await.unwrap();

    manager.disable("acme.a").await.unwrap();
    source.replace(footer_plugin("acme.a", "A2", 1));
    let view = manager.reload("acme.a").await.unwrap();
    assert!(view.loaded);
    assert!(!view.enabled);

    manager.enable("acme.a").await.unwrap();
    assert_eq!(
        footers(&manager).await,
        vec![HookResult::badge("A2"), HookResult::badge("B")]
    );
    let ids: Vec<_> = manager.list().await.into_iter().map(|v| v.id).collect();
    assert_eq!(ids, vec!["acme.a", "acme.b"]);
}

fn export_plugin() -> DiscoveredPlugin {
    DiscoveredPlugin::external(
        manifest("acme.export", &["storage"]),
        r#"
        fn create(api) { #{ api: api } }
        fn on_enable() {
            this.api.hooks.register("toolbar.button", "button");
            this.api.ui.add_toolbar_button(#{ id: "export", label: "Export" });
        }
        fn button(ctx) { "enabled-hook" }
        Fn("create")
        "#,
    )
}

async fn toolbar(manager: &PluginManager) -> Vec<HookResult> {
    manager
        .execute_hook(HookName::ToolbarButton, HookContext::default())
        .await
}

#[tokio::test]
async fn test_reload_runs_on_enable_again() {
    let ui = Arc::new(RecordingUi::default());
    let source = Arc::new(StaticPluginSource::new());
    source.insert(export_plugin());
    let manager = manager_with(Arc::new(MemorySettingsStore::new()), ui.clone())
        .with_source(source.clone());
    manager.register(export_plugin()).await.unwrap();

    manager.disable("acme.export").await.unwrap();
    manager.enable("acme.export").await.unwrap();
    assert_eq!(toolbar(&manager).await, vec![HookResult::string("enabled-hook")]);

    let view = manager.reload("acme.export").await.unwrap();
    assert!(view.loaded && view.enabled);
    assert_eq!(toolbar(&manager).await, vec![HookResult::string("enabled-hook")]);
    assert_eq!(*ui.buttons.lock(), vec!["export".to_string()]);
    assert_eq!(view.toolbar_buttons, vec!["export".to_string()]);
}

#[tokio::test]
async fn test_shutdown_takes_everything_down() {
    let ui = Arc::new(RecordingUi::default());
    let manager = manager_with(Arc::new(MemorySettingsStore::new()), ui.clone());
    manager
        .register(footer_plugin("acme.a", "A", 1))
        .await
        .unwrap();
    manager
        .register(footer_plugin("acme.b", "B", 2))
        .await
        .unwrap();
    manager.register(export_plugin()).await.unwrap();
    manager.disable("acme.export").await.unwrap();
    manager.enable("acme.export").await.unwrap();
    assert_eq!(footers(&manager).await.len(), 2);
    assert_eq!(ui.buttons.lock().len(), 1);

    manager.shutdown().await;

    assert!(manager.list().await.is_empty());
    assert_eq!(manager.dispatcher().handler_count(HookName::UserMessageFooter), 0);
    assert_eq!(manager.dispatcher().handler_count(HookName::ToolbarButton), 0);
    assert!(footers(&manager).await.is_empty());
    assert!(toolbar(&manager).await.is_empty());
    assert!(ui.buttons.lock().is_empty());
}

#[tokio::test]
async fn test_bundled_plugins_cannot_be_reloaded_or_removed() {
    let manager = manager();
    let raw = manifest("builtin.thing", &["storage"]);
    manager
        .register(DiscoveredPlugin::bundled(raw, "fn create() { #{} } Fn(\"create\")"))
        .await
        .unwrap();

    assert!(matches!(
        manager.reload("builtin.thing").await,
        Err(Error::NotExternal(_))
    ));
    assert!(matches!(
        manager.remove("builtin.thing").await,
        Err(Error::NotExternal(_))
    ));
    assert!(matches!(
        manager.reload("acme.ghost").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_remove_forgets_plugin() {
    let store = Arc::new(MemorySettingsStore::new());
    let manager = manager_with(store.clone(), Arc::new(RecordingUi::default()));
    manager.register(retries_plugin()).await.unwrap();
    manager
        .save_config("acme.retry", values(json!({ "retries": 2 })))
        .await
        .unwrap();

    manager.remove("acme.retry").await.unwrap();

    assert!(manager.get("acme.retry").await.is_none());
    assert!(manager.config().schema("acme.retry").is_none());
    assert!(!store.snapshot().config.contains_key("acme.retry"));

    // Same id can be registered again
    manager.register(retries_plugin()).await.unwrap();
    assert_eq!(
        Value::Object(manager.load_config("acme.retry").unwrap()),
        json!({ "retries": 3 })
    );
}

#[tokio::test]
async fn test_lifecycle_events() {
    let manager = manager();
    let mut events = manager.subscribe();

    manager
        .register(footer_plugin("acme.footer", "F", 1))
        .await
        .unwrap();
    manager.disable("acme.footer").await.unwrap();

    let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            PluginEventKind::Registered,
            PluginEventKind::Enabled,
            PluginEventKind::Disabled
        ]
    );
    assert_eq!(manager.events().history_for("acme.footer").await.len(), 3);
}
