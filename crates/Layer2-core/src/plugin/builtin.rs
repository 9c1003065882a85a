//! Bundled plugins
//!
//! Compiled into the crate and loaded through the same executor as
//! external plugins; only their provenance differs.

use plughost_foundation::{Error, Result};

use super::discovery::{DiscoveredPlugin, StaticPluginSource};

struct Bundled {
    id: &'static str,
    manifest: &'static str,
    source: &'static str,
}

const BUNDLED: &[Bundled] = &[
    Bundled {
        id: "builtin.message-stats",
        manifest: include_str!("../../plugins/builtin.message-stats/manifest.json"),
        source: include_str!("../../plugins/builtin.message-stats/main.rhai"),
    },
    Bundled {
        id: "builtin.text-tools",
        manifest: include_str!("../../plugins/builtin.text-tools/manifest.json"),
        source: include_str!("../../plugins/builtin.text-tools/main.rhai"),
    },
];

/// Ids of the bundled plugins
pub fn bundled_ids() -> Vec<&'static str> {
    BUNDLED.iter().map(|b| b.id).collect()
}

/// Bundled plugins as discovery entries (`is_external = false`)
pub fn bundled_plugins() -> Result<Vec<DiscoveredPlugin>> {
    BUNDLED
        .iter()
        .map(|b| {
            let manifest = serde_json::from_str(b.manifest).map_err(|e| {
                Error::Internal(format!("bundled manifest of '{}' is not JSON: {}", b.id, e))
            })?;
            Ok(DiscoveredPlugin::bundled(manifest, b.source))
        })
        .collect()
}

/// Source holding the bundled plugins, ready for external ones to be added
pub fn bundled_source() -> Result<StaticPluginSource> {
    Ok(StaticPluginSource::with_plugins(bundled_plugins()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::{HookContext, HookName, HookResult};
    use crate::plugin::{parse_manifest, CapabilityType, PluginManager};
    use plughost_foundation::{ConfigValues, HostConfig, MemorySettingsStore};
    use serde_json::json;
    use std::sync::Arc;

    fn manager() -> PluginManager {
        PluginManager::new(&HostConfig::default(), Arc::new(MemorySettingsStore::new())).unwrap()
    }

    #[test]
    fn test_bundled_manifests_are_valid() {
        let plugins = bundled_plugins().unwrap();
        assert_eq!(plugins.len(), bundled_ids().len());
        for plugin in &plugins {
            let manifest = parse_manifest(&plugin.manifest).unwrap();
            assert!(bundled_ids().contains(&manifest.id.as_str()));
            assert!(!plugin.is_external);
        }
    }

    #[tokio::test]
    async fn test_message_stats_badge() {
        let manager = manager();
        let report = manager
            .load_all(Arc::new(bundled_source().unwrap()))
            .await
            .unwrap();
        assert!(report.rejected.is_empty());
        for view in &report.records {
            assert!(view.loaded, "{} failed: {:?}", view.id, view.last_error);
            assert!(view.enabled);
        }

        let stats = manager.get("builtin.message-stats").await.unwrap();
        assert_eq!(stats.capabilities, vec![CapabilityType::UiExtension]);
        let extensions = manager.get_by_capability(CapabilityType::UiExtension).await;
        assert_eq!(extensions.len(), 1);
        assert_eq!(extensions[0].id(), "builtin.message-stats");
        assert!(manager.get_by_capability(CapabilityType::Render).await.is_empty());

        let ctx = HookContext::new(json!({ "content": "hello plugin world" }));
        let assistant = manager
            .execute_hook(HookName::AssistantMessageFooter, ctx.clone())
            .await;
        assert_eq!(assistant, vec![HookResult::badge("3 words")]);

        let user = manager.execute_hook(HookName::UserMessageFooter, ctx).await;
        assert_eq!(user, vec![HookResult::badge("3 words")]);

        let mut values = ConfigValues::new();
        values.insert("showCharacters".into(), json!(true));
        manager
            .save_config("builtin.message-stats", values)
            .await
            .unwrap();

        let user = manager
            .execute_hook(
                HookName::UserMessageFooter,
                HookContext::new(json!({ "content": "one" })),
            )
            .await;
        assert_eq!(user, vec![HookResult::badge("1 word, 3 chars")]);

        // No content, no badge
        let empty = manager
            .execute_hook(HookName::UserMessageFooter, HookContext::default())
            .await;
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_text_tools() {
        let manager = manager();
        manager
            .load_all(Arc::new(bundled_source().unwrap()))
            .await
            .unwrap();

        let tools = manager.tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].plugin_id, "builtin.text-tools");
        assert_eq!(tools[0].definition.name, "text_stats");

        let stats = manager
            .execute_tool("text_stats", json!({ "text": "a b\nc" }))
            .await
            .unwrap();
        assert_eq!(stats["words"], 3);
        assert_eq!(stats["characters"], 5);
        assert_eq!(stats["lines"], 2);

        assert!(manager.execute_tool("text_stats", json!({})).await.is_err());
        assert_eq!(manager.process_outgoing("  hi there \n").await, "hi there");
        assert_eq!(manager.process_incoming("  kept  ").await, "  kept  ");

        manager.disable("builtin.text-tools").await.unwrap();
        assert!(manager.tools().await.is_empty());
        assert_eq!(manager.process_outgoing("  hi  ").await, "  hi  ");
    }
}
