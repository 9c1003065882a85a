//! # Plugin System
//!
//! Manifests, live instances and their orchestration.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       PluginManager                          │
//! │   register / enable / disable / reload / remove / queries    │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │                   PluginRegistry                       │  │
//! │  │   PluginRecord { manifest, instance, enabled, ... }    │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │         │                  │                   │            │
//! │   parse_manifest     PluginExecutor       HookDispatcher    │
//! │   (manifest.rs)      (rhai sandbox)       ConfigService     │
//! │                                           EventBus          │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲
//!          │ DiscoveredPlugin { manifest, source, is_external }
//!     PluginSource (host enumerates folders; bundled plugins built in)
//! ```
//!
//! ## Capabilities
//!
//! A manifest's `capabilityTypes` decide which capability interfaces a
//! [`PluginInstance`] exposes: [`Renderer`], [`MessageTransformer`],
//! [`ToolProvider`], [`UiExtension`]. `storage` plugins only use config.
//!
//! ## Example
//!
//! ```ignore
//! let manager = PluginManager::new(&HostConfig::load()?, store)?;
//! manager.load_all(Arc::new(bundled_source()?)).await?;
//!
//! let badges = manager
//!     .execute_hook(HookName::UserMessageFooter, HookContext::new(json!({ "content": text })))
//!     .await;
//! for renderer in manager.get_by_capability(CapabilityType::Render).await {
//!     // ...
//! }
//! ```

mod builtin;
mod discovery;
mod events;
mod manager;
mod manifest;
mod registry;
mod schema;
mod traits;

pub use builtin::{bundled_ids, bundled_plugins, bundled_source};
pub use discovery::{DiscoveredPlugin, PluginSource, StaticPluginSource};
pub use events::{EventBus, PluginEvent, PluginEventKind};
pub use manager::{LoadReport, PluginManager, PluginTool, RejectedPlugin};
pub use manifest::{parse_manifest, CapabilityType, PluginManifest};
pub use registry::{PluginRecord, PluginRecordView, PluginRegistry, PluginSummary};
pub use schema::{ChoiceOption, ConfigField, ConfigSchema, FieldKind};
pub use traits::{
    MessageTransformer, PluginInstance, PluginStatus, Renderer, ToolDefinition, ToolProvider,
    UiExtension,
};
