//! Plugin traits - live instance and capability interfaces
//!
//! A plugin's declared capabilities decide which of the `as_*` accessors
//! return `Some`. The manager asks the instance for a capability interface
//! instead of probing for individual methods.

use async_trait::async_trait;
use plughost_foundation::{ConfigValues, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;

use crate::hook::{HookContext, HookName, HookResult};

// ============================================================================
// PluginInstance
// ============================================================================

/// Live plugin object produced by the executor
///
/// Lifecycle methods are optional in plugin code; missing ones succeed.
#[async_trait]
pub trait PluginInstance: Send + Sync {
    fn id(&self) -> &str;

    /// Called once before the plugin first becomes active
    async fn on_load(&self) -> Result<()> {
        Ok(())
    }

    /// Called when the instance is discarded (reload, removal)
    async fn on_unload(&self) -> Result<()> {
        Ok(())
    }

    async fn on_enable(&self) -> Result<()> {
        Ok(())
    }

    async fn on_disable(&self) -> Result<()> {
        Ok(())
    }

    /// Called after the host saved new config values
    async fn on_config_change(&self, _values: &ConfigValues) -> Result<()> {
        Ok(())
    }

    fn as_renderer(&self) -> Option<&dyn Renderer> {
        None
    }

    fn as_transformer(&self) -> Option<&dyn MessageTransformer> {
        None
    }

    fn as_tool(&self) -> Option<&dyn ToolProvider> {
        None
    }

    fn as_ui_extension(&self) -> Option<&dyn UiExtension> {
        None
    }

    /// Downcasting helper
    fn as_any(&self) -> &dyn Any;
}

// ============================================================================
// Capability interfaces
// ============================================================================

/// `render` capability
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn can_render(&self, content: &str) -> Result<bool>;

    async fn render(&self, content: &str) -> Result<Option<HookResult>>;
}

/// `message-transform` capability
///
/// Plugins may implement one direction only; the other passes messages
/// through unchanged.
#[async_trait]
pub trait MessageTransformer: Send + Sync {
    async fn process_outgoing(&self, message: &str) -> Result<String>;

    async fn process_incoming(&self, message: &str) -> Result<String>;
}

/// Declaration of a callable tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the arguments
    #[serde(default)]
    pub parameters: Value,
}

/// `tool` capability
#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn definition(&self) -> Result<ToolDefinition>;

    async fn execute(&self, args: Value) -> Result<Value>;
}

/// `ui-extension` capability
#[async_trait]
pub trait UiExtension: Send + Sync {
    /// Extension point the component is mounted on
    fn location(&self) -> HookName;

    async fn component(&self, ctx: &HookContext) -> Result<Option<HookResult>>;
}

// ============================================================================
// PluginStatus
// ============================================================================

/// Coarse state shown to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    /// Loaded and enabled
    Active,
    /// Loaded, not enabled
    Disabled,
    /// Not loaded; see `last_error`
    Failed,
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginStatus::Active => write!(f, "active"),
            PluginStatus::Disabled => write!(f, "disabled"),
            PluginStatus::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    #[async_trait]
    impl PluginInstance for Bare {
        fn id(&self) -> &str {
            "bare"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[tokio::test]
    async fn test_defaults() {
        let plugin = Bare;
        assert!(plugin.on_load().await.is_ok());
        assert!(plugin.on_config_change(&ConfigValues::new()).await.is_ok());
        assert!(plugin.as_renderer().is_none());
        assert!(plugin.as_tool().is_none());
        assert!(plugin.as_any().downcast_ref::<Bare>().is_some());
    }

    #[test]
    fn test_tool_definition_defaults() {
        let def: ToolDefinition =
            serde_json::from_value(serde_json::json!({ "name": "count" })).unwrap();
        assert_eq!(def.description, "");
        assert!(def.parameters.is_null());
    }
}
