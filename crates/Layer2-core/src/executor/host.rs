//! Host collaborators reachable from plugin code
//!
//! Plugins never see these directly; the capability object forwards to them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::config::ConfigService;
use crate::hook::HookDispatcher;

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    /// `user`, `assistant` or `system`
    pub role: String,
    pub content: String,
}

/// Read-only view of the active chat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
}

/// Supplies the current session, if any
pub trait SessionProvider: Send + Sync {
    fn current(&self) -> Option<SessionSnapshot>;
}

/// Provider for hosts without sessions
#[derive(Debug, Default)]
pub struct NoSession;

impl SessionProvider for NoSession {
    fn current(&self) -> Option<SessionSnapshot> {
        None
    }
}

/// Fixed snapshot, handy for tools and tests
#[derive(Debug, Clone)]
pub struct StaticSession(pub SessionSnapshot);

impl SessionProvider for StaticSession {
    fn current(&self) -> Option<SessionSnapshot> {
        Some(self.0.clone())
    }
}

// ============================================================================
// UI
// ============================================================================

/// Toolbar button a plugin asks the host to show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolbarButton {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "success" => Ok(Self::Success),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!(
                "unknown notification level '{}' (expected info, success, warning or error)",
                other
            )),
        }
    }
}

/// Host UI surface; calls must return quickly
pub trait HostUi: Send + Sync {
    fn add_toolbar_button(&self, plugin_id: &str, button: ToolbarButton);
    fn remove_toolbar_button(&self, plugin_id: &str, button_id: &str);
    fn show_notification(&self, plugin_id: &str, message: &str, level: NotificationLevel);
}

/// UI that only logs
#[derive(Debug, Default)]
pub struct NoopHostUi;

impl HostUi for NoopHostUi {
    fn add_toolbar_button(&self, plugin_id: &str, button: ToolbarButton) {
        info!(plugin = plugin_id, button = %button.id, "Toolbar button added");
    }

    fn remove_toolbar_button(&self, plugin_id: &str, button_id: &str) {
        info!(plugin = plugin_id, button = button_id, "Toolbar button removed");
    }

    fn show_notification(&self, plugin_id: &str, message: &str, level: NotificationLevel) {
        info!(plugin = plugin_id, level = %level, "{}", message);
    }
}

// ============================================================================
// HostServices
// ============================================================================

/// Everything the executor wires into a plugin's capability object
#[derive(Clone)]
pub struct HostServices {
    pub dispatcher: Arc<HookDispatcher>,
    pub config: Arc<ConfigService>,
    pub ui: Arc<dyn HostUi>,
    pub session: Arc<dyn SessionProvider>,
}

impl HostServices {
    pub fn new(dispatcher: Arc<HookDispatcher>, config: Arc<ConfigService>) -> Self {
        Self {
            dispatcher,
            config,
            ui: Arc::new(NoopHostUi),
            session: Arc::new(NoSession),
        }
    }

    pub fn with_ui(mut self, ui: Arc<dyn HostUi>) -> Self {
        self.ui = ui;
        self
    }

    pub fn with_session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = session;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_level_parse() {
        assert_eq!("warning".parse::<NotificationLevel>().unwrap(), NotificationLevel::Warning);
        assert!("loud".parse::<NotificationLevel>().is_err());
    }

    #[test]
    fn test_toolbar_button_optional_fields() {
        let button: ToolbarButton =
            serde_json::from_value(serde_json::json!({ "id": "export", "label": "Export" })).unwrap();
        assert_eq!(button.icon, None);
        assert_eq!(button.tooltip, None);
    }
}
