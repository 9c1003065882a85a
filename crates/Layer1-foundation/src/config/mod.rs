//! Config - host runtime settings
//!
//! - `host.rs` - HostConfig (sandbox limits, hook dispatch, plugin defaults)

mod host;

pub use host::{
    HookSettings, HostConfig, PluginSettings, SandboxLimits, DEFAULT_HOST_VERSION,
    HOST_CONFIG_FILE, MAX_CONTAINER_ELEMENTS,
};
