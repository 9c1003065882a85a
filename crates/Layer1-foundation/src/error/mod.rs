//! Error types for the plugin host
//!
//! Every failure the host can observe is funneled through [`Error`].
//! Faults that originate in plugin code carry the plugin id so the manager
//! can attach them to the right record.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Plugin host error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Manifest
    // ========================================================================
    #[error("Invalid manifest: {0}")]
    ManifestValidation(String),

    // ========================================================================
    // Plugin code (executor, handlers, lifecycle)
    // ========================================================================
    #[error("Plugin {plugin_id} failed to execute: {message}")]
    Execution { plugin_id: String, message: String },

    #[error("Hook handler {hook} of plugin {plugin_id} failed: {message}")]
    Handler {
        plugin_id: String,
        hook: String,
        message: String,
    },

    #[error("Plugin {plugin_id} failed in {method}: {message}")]
    Lifecycle {
        plugin_id: String,
        method: String,
        message: String,
    },

    // ========================================================================
    // Plugin config values
    // ========================================================================
    #[error("Invalid value for '{key}': {message}")]
    ConfigValidation { key: String, message: String },

    // ========================================================================
    // Manager
    // ========================================================================
    #[error("Plugin {0} is already registered")]
    DuplicatePlugin(String),

    #[error("Plugin {0} is a core plugin and cannot be enabled or disabled")]
    CorePluginLocked(String),

    #[error("Plugin {0} is bundled with the host and cannot be reloaded or removed")]
    NotExternal(String),

    #[error("Plugin {0} is not loaded")]
    PluginNotLoaded(String),

    // ========================================================================
    // Host configuration / storage
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // General
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // ========================================================================
    // External conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Other
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error was raised by plugin code rather than by the host
    pub fn is_plugin_fault(&self) -> bool {
        matches!(
            self,
            Error::Execution { .. } | Error::Handler { .. } | Error::Lifecycle { .. }
        )
    }

    /// Whether the message can be shown to the user as-is
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::ManifestValidation(_)
                | Error::ConfigValidation { .. }
                | Error::DuplicatePlugin(_)
                | Error::CorePluginLocked(_)
                | Error::NotExternal(_)
                | Error::PluginNotLoaded(_)
                | Error::NotFound(_)
                | Error::InvalidInput(_)
        )
    }

    /// Plugin id the error is attributed to, if any
    pub fn plugin_id(&self) -> Option<&str> {
        match self {
            Error::Execution { plugin_id, .. }
            | Error::Handler { plugin_id, .. }
            | Error::Lifecycle { plugin_id, .. } => Some(plugin_id),
            Error::DuplicatePlugin(id)
            | Error::CorePluginLocked(id)
            | Error::NotExternal(id)
            | Error::PluginNotLoaded(id) => Some(id),
            _ => None,
        }
    }

    /// Execution error helper
    pub fn execution(plugin_id: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Execution {
            plugin_id: plugin_id.into(),
            message: message.into(),
        }
    }

    /// Hook handler error helper
    pub fn handler(
        plugin_id: impl Into<String>,
        hook: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Handler {
            plugin_id: plugin_id.into(),
            hook: hook.into(),
            message: message.into(),
        }
    }

    /// Lifecycle error helper
    pub fn lifecycle(
        plugin_id: impl Into<String>,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Lifecycle {
            plugin_id: plugin_id.into(),
            method: method.into(),
            message: message.into(),
        }
    }

    /// Config validation error helper
    pub fn config_validation(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            key: key.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Additional From impls
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
