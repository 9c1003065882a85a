//! # plughost-foundation
//!
//! Foundation layer for the plugin host:
//! - Error: host-wide error taxonomy and `Result` alias
//! - Storage: JSON documents and persisted plugin state
//! - Config: host runtime settings (sandbox limits, hook dispatch)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  plughost-core (manifest, executor, hooks, manager)      │
//! │                     │                                   │
//! │          ┌─────────┴─────────┐                         │
//! │          ▼                   ▼                         │
//! │     HostConfig         SettingsStore                    │
//! │   (plughost.json)   (enabled flags, config values)      │
//! │                              │                          │
//! │                    Memory / JSON (plugins.json)         │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    HookSettings, HostConfig, PluginSettings, SandboxLimits, DEFAULT_HOST_VERSION,
    HOST_CONFIG_FILE, MAX_CONTAINER_ELEMENTS,
};

// ============================================================================
// Storage
// ============================================================================
pub use storage::{
    ConfigValues, JsonSettingsStore, JsonStore, MemorySettingsStore, PersistedPluginState,
    SettingsStore, APP_DIR_NAME, PLUGIN_STATE_FILE,
};
