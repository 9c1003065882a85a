//! Plugin commands
//!
//! A plugin folder holds `manifest.json` and `main.rhai`. Folders named on
//! the command line are loaded as external plugins after the bundled ones.

use anyhow::{bail, Context, Result};
use plughost_core::config::{describe_schema, ConfigService};
use plughost_core::executor::{HostServices, StaticSession};
use plughost_core::hook::{HookContext, HookDispatcher, HookName};
use plughost_core::plugin::{
    bundled_plugins, parse_manifest, DiscoveredPlugin, PluginManager, PluginRecordView,
    StaticPluginSource,
};
use plughost_core::SessionSnapshot;
use plughost_foundation::{
    HostConfig, JsonSettingsStore, JsonStore, MemorySettingsStore, SettingsStore,
};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SCRIPT_FILE: &str = "main.rhai";

/// Options shared by every command that loads plugins
#[derive(Debug, Clone, Default)]
pub struct HostOptions {
    /// Directory of `plugins.json`; the user config dir when unset
    pub state_dir: Option<PathBuf>,
    /// Skip the bundled plugins
    pub no_bundled: bool,
    /// JSON file with the session snapshot handed to plugins
    pub session: Option<PathBuf>,
}

/// Read a plugin folder without validating it
pub fn read_plugin_dir(dir: &Path) -> Result<DiscoveredPlugin> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let raw = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
    let manifest: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", manifest_path.display()))?;

    let script_path = dir.join(SCRIPT_FILE);
    let source = std::fs::read_to_string(&script_path)
        .with_context(|| format!("Failed to read {}", script_path.display()))?;

    debug!("Read plugin folder {}", dir.display());
    Ok(DiscoveredPlugin::external(manifest, source))
}

fn load_host_config() -> HostConfig {
    HostConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load host config, using defaults: {}", e);
        HostConfig::default()
    })
}

fn open_store(options: &HostOptions) -> Result<Arc<dyn SettingsStore>> {
    let store = match &options.state_dir {
        Some(dir) => JsonStore::new(dir.clone()),
        None => JsonStore::global()?,
    };
    Ok(Arc::new(JsonSettingsStore::open(store)?))
}

fn build_manager(config: &HostConfig, store: Arc<dyn SettingsStore>, options: &HostOptions) -> Result<PluginManager> {
    let dispatcher = Arc::new(HookDispatcher::new(&config.hooks));
    let configs = Arc::new(ConfigService::new(store));
    let mut services = HostServices::new(dispatcher, configs);

    if let Some(path) = &options.session {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file {}", path.display()))?;
        let snapshot: SessionSnapshot = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a session snapshot", path.display()))?;
        services = services.with_session(Arc::new(StaticSession(snapshot)));
    }

    Ok(PluginManager::with_services(config, services)?)
}

/// Manager with the bundled plugins and `dirs` loaded
pub async fn open_host(options: &HostOptions, dirs: &[PathBuf]) -> Result<PluginManager> {
    let config = load_host_config();
    let manager = build_manager(&config, open_store(options)?, options)?;

    let source = StaticPluginSource::new();
    if !options.no_bundled {
        for plugin in bundled_plugins()? {
            source.insert(plugin);
        }
    }
    for dir in dirs {
        source.insert(read_plugin_dir(dir)?);
    }

    let report = manager.load_all(Arc::new(source)).await?;
    for rejected in &report.rejected {
        eprintln!(
            "✗ {}: {}",
            rejected.id.as_deref().unwrap_or("<unknown>"),
            rejected.error
        );
    }
    Ok(manager)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

/// Check manifests and try to instantiate each script in isolation
pub async fn validate(dirs: &[PathBuf]) -> Result<()> {
    if dirs.is_empty() {
        bail!("No plugin folders given");
    }

    let config = load_host_config();
    let mut failures = 0;

    for dir in dirs {
        let outcome = async {
            let plugin = read_plugin_dir(dir)?;
            let manifest = parse_manifest(&plugin.manifest)?;

            // Throwaway manager so nothing is persisted
            let store: Arc<dyn SettingsStore> = Arc::new(MemorySettingsStore::new());
            let manager = build_manager(&config, store, &HostOptions::default())?;
            let view = manager.register(plugin).await?;
            if let Some(error) = view.last_error {
                bail!(error);
            }
            Ok::<_, anyhow::Error>(manifest)
        }
        .await;

        match outcome {
            Ok(manifest) => {
                let capabilities: Vec<_> = manifest.capabilities.iter().map(|c| c.as_str()).collect();
                println!(
                    "✓ {} v{} [{}]",
                    manifest.id,
                    manifest.version,
                    capabilities.join(", ")
                );
            }
            Err(e) => {
                failures += 1;
                println!("✗ {}: {:#}", dir.display(), e);
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} plugins failed validation", failures, dirs.len());
    }
    Ok(())
}

/// Print the settings form of a plugin folder
pub fn schema(dir: &Path) -> Result<()> {
    let plugin = read_plugin_dir(dir)?;
    let manifest = parse_manifest(&plugin.manifest)?;
    match &manifest.config_schema {
        Some(schema) => print_json(&describe_schema(schema, None)),
        None => {
            println!("{} has no configSchema", manifest.id);
            Ok(())
        }
    }
}

pub async fn list(options: &HostOptions, dirs: &[PathBuf]) -> Result<()> {
    let manager = open_host(options, dirs).await?;
    let views = manager.list().await;

    println!(
        "{:<28} {:<10} {:<10} {:<8} {}",
        "ID", "VERSION", "STATUS", "SOURCE", "CAPABILITIES"
    );
    println!("{}", "-".repeat(80));
    for view in &views {
        print_row(view);
    }

    let summary = manager.summary().await;
    println!(
        "\n{} plugins: {} active, {} disabled, {} failed",
        summary.total, summary.active, summary.disabled, summary.failed
    );
    Ok(())
}

fn print_row(view: &PluginRecordView) {
    let source = if view.is_core {
        "core"
    } else if view.is_external {
        "external"
    } else {
        "bundled"
    };
    let capabilities: Vec<_> = view.capabilities.iter().map(|c| c.as_str()).collect();
    println!(
        "{:<28} {:<10} {:<10} {:<8} {}",
        view.id,
        view.version.to_string(),
        view.status.to_string(),
        source,
        capabilities.join(",")
    );
    if let Some(error) = &view.last_error {
        println!("    └─ {}", error);
    }
}

/// Run a hook and print each contribution with its plugin
pub async fn hook(options: &HostOptions, dirs: &[PathBuf], name: &str, context: Option<&str>) -> Result<()> {
    let hook: HookName = name.parse().map_err(anyhow::Error::msg)?;
    let data = match context {
        Some(raw) => serde_json::from_str(raw).context("--context is not valid JSON")?,
        None => Value::Null,
    };

    let manager = open_host(options, dirs).await?;
    let contributions = manager
        .execute_hook_detailed(hook, HookContext::new(data))
        .await;
    print_json(&contributions)
}

/// Without a name, list tools; otherwise run the named tool
pub async fn tool(options: &HostOptions, dirs: &[PathBuf], name: Option<&str>, args: Option<&str>) -> Result<()> {
    let manager = open_host(options, dirs).await?;

    let Some(name) = name else {
        return print_json(&manager.tools().await);
    };
    let args = match args {
        Some(raw) => serde_json::from_str(raw).context("--args is not valid JSON")?,
        None => Value::Object(Default::default()),
    };
    let output = manager.execute_tool(name, args).await?;
    print_json(&output)
}

/// Persist the enabled flag of a plugin
pub async fn set_enabled(options: &HostOptions, dirs: &[PathBuf], id: &str, enabled: bool) -> Result<()> {
    let manager = open_host(options, dirs).await?;
    let view = if enabled {
        manager.enable(id).await?
    } else {
        manager.disable(id).await?
    };
    print_row(&view);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_plugin(dir: &Path, manifest: &Value, script: &str) {
        std::fs::write(dir.join(MANIFEST_FILE), manifest.to_string()).unwrap();
        std::fs::write(dir.join(SCRIPT_FILE), script).unwrap();
    }

    #[test]
    fn test_read_plugin_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_plugin(
            dir.path(),
            &json!({ "id": "acme.echo" }),
            "fn create() { #{} } Fn(\"create\")",
        );

        let plugin = read_plugin_dir(dir.path()).unwrap();
        assert!(plugin.is_external);
        assert_eq!(plugin.declared_id(), Some("acme.echo"));
        assert!(plugin.source.contains("create"));
    }

    #[test]
    fn test_read_plugin_dir_missing_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "{}").unwrap();

        let err = read_plugin_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains(SCRIPT_FILE));
    }

    #[tokio::test]
    async fn test_open_host_with_state_dir() {
        let state = tempfile::tempdir().unwrap();
        let plugin_dir = tempfile::tempdir().unwrap();
        write_plugin(
            plugin_dir.path(),
            &json!({
                "id": "acme.echo",
                "name": "Echo",
                "version": "0.1.0",
                "description": "Echoes the message back",
                "author": "acme",
                "capabilityTypes": ["storage"],
                "hostVersionRange": "*"
            }),
            r#"
            fn create(api) {
                api.hooks.register("message.before-send", "echo", 1);
                #{}
            }
            fn echo(ctx) { ctx.data.content }
            Fn("create")
            "#,
        );

        let options = HostOptions {
            state_dir: Some(state.path().to_path_buf()),
            no_bundled: true,
            session: None,
        };
        let manager = open_host(&options, &[plugin_dir.path().to_path_buf()])
            .await
            .unwrap();

        let results = manager
            .execute_hook(
                HookName::BeforeSend,
                HookContext::new(json!({ "content": "ping" })),
            )
            .await;
        assert_eq!(results, vec![plughost_core::HookResult::string("ping")]);

        manager.disable("acme.echo").await.unwrap();
        assert!(state.path().join("plugins.json").exists());
    }
}
