//! Storage module
//!
//! - `json`: JSON documents in a directory (host config, plugin state file)
//! - `settings`: persisted plugin state (enabled flags, config values)

mod json;
mod settings;

pub use json::{JsonStore, APP_DIR_NAME};
pub use settings::{
    ConfigValues, JsonSettingsStore, MemorySettingsStore, PersistedPluginState, SettingsStore,
    PLUGIN_STATE_FILE,
};
