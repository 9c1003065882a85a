//! plughost-core: plugin runtime of the host
//!
//! Layer2 - everything between a plugin folder and the host UI
//!
//! # Modules
//!
//! - `plugin`: manifests, records and the `PluginManager`
//! - `executor`: sandboxed rhai instantiation and the `PluginApi` capability object
//! - `hook`: priority-ordered `HookDispatcher` and typed `HookResult`s
//! - `config`: schema-driven per-plugin config (`ConfigService`, settings forms)
//!
//! # Example
//!
//! ```ignore
//! use plughost_core::{bundled_source, HookContext, HookName, PluginManager};
//! use plughost_foundation::{HostConfig, MemorySettingsStore};
//!
//! let manager = PluginManager::new(&HostConfig::default(), Arc::new(MemorySettingsStore::new()))?;
//! let report = manager.load_all(Arc::new(bundled_source()?)).await?;
//!
//! // Contributions under a user message, ordered by priority
//! let results = manager
//!     .execute_hook(HookName::UserMessageFooter, HookContext::new(json!({ "content": "hi" })))
//!     .await;
//!
//! // Settings form of one plugin
//! let form = manager.describe_config("builtin.message-stats")?;
//! ```

pub mod config;
pub mod executor;
pub mod hook;
pub mod plugin;

// Re-exports: Plugin
pub use plugin::{
    bundled_source,
    parse_manifest,
    CapabilityType,
    DiscoveredPlugin,
    // Events
    EventBus,
    LoadReport,
    PluginEvent,
    PluginEventKind,
    // Traits
    PluginInstance,
    // Manager
    PluginManager,
    // Manifest
    PluginManifest,
    PluginRecordView,
    PluginSource,
    PluginStatus,
    PluginSummary,
    StaticPluginSource,
};

// Re-exports: Executor
pub use executor::{
    HostServices, HostUi, NotificationLevel, PluginExecutor, ScriptPlugin, SessionProvider,
    SessionSnapshot, ToolbarButton,
};

// Re-exports: Hook
pub use hook::{
    consume_results, flatten_results, HookContext, HookContribution, HookDispatcher, HookName,
    HookResult,
};

// Re-exports: Config
pub use config::{describe_schema, ConfigService, FieldDescriptor};
