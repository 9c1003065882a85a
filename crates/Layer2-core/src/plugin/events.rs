//! Plugin Events - lifecycle notifications for the host

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

// ============================================================================
// PluginEvent
// ============================================================================

/// Lifecycle transition of one plugin
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginEvent {
    pub kind: PluginEventKind,

    pub plugin_id: String,

    /// Kind-specific data (error message, config values, ...)
    pub detail: Value,

    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl PluginEvent {
    pub fn new(kind: PluginEventKind, plugin_id: impl Into<String>, detail: Value) -> Self {
        Self {
            kind,
            plugin_id: plugin_id.into(),
            detail,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn simple(kind: PluginEventKind, plugin_id: impl Into<String>) -> Self {
        Self::new(kind, plugin_id, Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginEventKind {
    /// Stored and loaded
    Registered,
    /// Stored with `last_error`, or a lifecycle method failed
    Failed,
    Enabled,
    Disabled,
    Reloaded,
    Removed,
    ConfigChanged,
}

impl std::fmt::Display for PluginEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registered => write!(f, "registered"),
            Self::Failed => write!(f, "failed"),
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
            Self::Reloaded => write!(f, "reloaded"),
            Self::Removed => write!(f, "removed"),
            Self::ConfigChanged => write!(f, "config_changed"),
        }
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Broadcast of plugin events plus a bounded history
pub struct EventBus {
    sender: broadcast::Sender<PluginEvent>,

    /// Most recent events, oldest first
    history: RwLock<Vec<PluginEvent>>,

    history_size: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(256, 100)
    }

    pub fn with_capacity(channel_capacity: usize, history_size: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            sender,
            history: RwLock::new(Vec::with_capacity(history_size)),
            history_size,
        }
    }

    pub async fn publish(&self, event: PluginEvent) {
        debug!(plugin = %event.plugin_id, kind = %event.kind, "Publishing plugin event");

        if self.history_size > 0 {
            let mut history = self.history.write().await;
            if history.len() >= self.history_size {
                history.remove(0);
            }
            history.push(event.clone());
        }

        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.sender.subscribe()
    }

    pub async fn history(&self) -> Vec<PluginEvent> {
        self.history.read().await.clone()
    }

    /// History of one plugin
    pub async fn history_for(&self, plugin_id: &str) -> Vec<PluginEvent> {
        self.history
            .read()
            .await
            .iter()
            .filter(|e| e.plugin_id == plugin_id)
            .cloned()
            .collect()
    }

    pub async fn clear_history(&self) {
        self.history.write().await.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
