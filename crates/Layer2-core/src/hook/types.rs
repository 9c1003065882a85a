//! Hook types - extension points, call context and typed results

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::executor::SessionSnapshot;

// ============================================================================
// HookName
// ============================================================================

/// Extension points the host exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookName {
    /// Content under a user message
    UserMessageFooter,
    /// Content under an assistant message
    AssistantMessageFooter,
    /// Replacement or decoration of message bodies
    MessageContent,
    ToolbarButton,
    InputActions,
    SidebarPanel,
    SettingsSection,
    /// Observers of an outgoing message
    BeforeSend,
    /// Observers of an incoming message
    AfterReceive,
}

impl HookName {
    pub const ALL: [HookName; 9] = [
        Self::UserMessageFooter,
        Self::AssistantMessageFooter,
        Self::MessageContent,
        Self::ToolbarButton,
        Self::InputActions,
        Self::SidebarPanel,
        Self::SettingsSection,
        Self::BeforeSend,
        Self::AfterReceive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserMessageFooter => "render.user-message-footer",
            Self::AssistantMessageFooter => "render.assistant-message-footer",
            Self::MessageContent => "render.message-content",
            Self::ToolbarButton => "toolbar.button",
            Self::InputActions => "input.actions",
            Self::SidebarPanel => "sidebar.panel",
            Self::SettingsSection => "settings.section",
            Self::BeforeSend => "message.before-send",
            Self::AfterReceive => "message.after-receive",
        }
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|h| h.as_str() == s)
            .ok_or_else(|| format!("unknown hook '{}'", s))
    }
}

impl Serialize for HookName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// HookContext
// ============================================================================

/// Data handed to every handler of one hook invocation
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    /// Hook-specific payload (message, content, ...)
    pub data: Value,
    /// Read-only session snapshot
    pub session: Option<SessionSnapshot>,
}

impl HookContext {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            session: None,
        }
    }

    pub fn with_session(mut self, session: SessionSnapshot) -> Self {
        self.session = Some(session);
        self
    }

    /// JSON form passed to script handlers
    pub fn to_value(&self, hook: HookName) -> Value {
        json!({
            "hook": hook.as_str(),
            "data": self.data,
            "session": self.session,
        })
    }
}

// ============================================================================
// HookResult
// ============================================================================

/// Primitive contribution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Primitive {
    Bool(bool),
    Number(f64),
    String(String),
}

/// Structural contribution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HookElement {
    Text {
        content: String,
    },
    Badge {
        label: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        variant: Option<String>,
    },
    Button {
        label: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        action: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Link {
        label: String,
        href: String,
    },
    Icon {
        name: String,
    },
    Container {
        children: Vec<HookResult>,
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<String>,
    },
    /// Opaque renderable the host knows how to draw
    Custom {
        payload: Value,
    },
}

/// What a handler contributes to an extension point
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HookResult {
    Primitive(Primitive),
    Element(HookElement),
    List(Vec<HookResult>),
}

/// Wire shape of elements; children stay raw so nesting is checked by hand
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawElement {
    Text {
        content: String,
    },
    Badge {
        label: String,
        #[serde(default)]
        variant: Option<String>,
    },
    Button {
        label: String,
        #[serde(default)]
        action: Option<String>,
        #[serde(default)]
        id: Option<String>,
    },
    Link {
        label: String,
        href: String,
    },
    Icon {
        name: String,
    },
    Container {
        #[serde(default)]
        children: Vec<Value>,
        #[serde(default)]
        direction: Option<String>,
    },
    Custom {
        #[serde(default)]
        payload: Value,
    },
}

impl HookResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Element(HookElement::Text {
            content: content.into(),
        })
    }

    pub fn badge(label: impl Into<String>) -> Self {
        Self::Element(HookElement::Badge {
            label: label.into(),
            variant: None,
        })
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::Primitive(Primitive::String(value.into()))
    }

    /// Convert a handler's JSON return value
    ///
    /// `null` contributes nothing. Containers and lists may nest at most
    /// `max_depth` levels.
    pub fn from_value(value: &Value, max_depth: usize) -> Result<Option<Self>, String> {
        parse_result(value, 1, max_depth)
    }

    /// Nesting level; leaves count as 1
    pub fn depth(&self) -> usize {
        match self {
            Self::Primitive(_) => 1,
            Self::Element(HookElement::Container { children, .. }) | Self::List(children) => {
                1 + children.iter().map(HookResult::depth).max().unwrap_or(0)
            }
            Self::Element(_) => 1,
        }
    }

    /// Leaves in order, with lists expanded recursively
    pub fn flatten(self) -> Vec<HookResult> {
        match self {
            Self::List(items) => items.into_iter().flat_map(HookResult::flatten).collect(),
            other => vec![other],
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn parse_result(value: &Value, depth: usize, max_depth: usize) -> Result<Option<HookResult>, String> {
    if depth > max_depth {
        return Err(format!("result nesting exceeds the maximum depth of {}", max_depth));
    }

    let result = match value {
        Value::Null => return Ok(None),
        Value::Bool(b) => HookResult::Primitive(Primitive::Bool(*b)),
        Value::Number(n) => HookResult::Primitive(Primitive::Number(
            n.as_f64().ok_or_else(|| format!("unrepresentable number {}", n))?,
        )),
        Value::String(s) => HookResult::Primitive(Primitive::String(s.clone())),
        Value::Array(items) => HookResult::List(parse_children(items, depth, max_depth)?),
        Value::Object(object) => {
            if !object.contains_key("type") {
                return Err("result object is missing its `type` tag".to_string());
            }
            let raw: RawElement = serde_json::from_value(value.clone())
                .map_err(|e| format!("invalid result element: {}", e))?;
            HookResult::Element(match raw {
                RawElement::Text { content } => HookElement::Text { content },
                RawElement::Badge { label, variant } => HookElement::Badge { label, variant },
                RawElement::Button { label, action, id } => HookElement::Button { label, action, id },
                RawElement::Link { label, href } => HookElement::Link { label, href },
                RawElement::Icon { name } => HookElement::Icon { name },
                RawElement::Container { children, direction } => HookElement::Container {
                    children: parse_children(&children, depth, max_depth)?,
                    direction,
                },
                RawElement::Custom { payload } => HookElement::Custom { payload },
            })
        }
    };
    Ok(Some(result))
}

fn parse_children(items: &[Value], depth: usize, max_depth: usize) -> Result<Vec<HookResult>, String> {
    let mut children = Vec::with_capacity(items.len());
    for item in items {
        if let Some(child) = parse_result(item, depth + 1, max_depth)? {
            children.push(child);
        }
    }
    Ok(children)
}

// ============================================================================
// Consumption helpers
// ============================================================================

/// A result together with the plugin that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookContribution {
    pub plugin_id: String,
    pub result: HookResult,
}

/// Expand list results into their leaves, keeping order
pub fn flatten_results(results: Vec<HookResult>) -> Vec<HookResult> {
    results.into_iter().flat_map(HookResult::flatten).collect()
}

/// Consume every result on its own, so one bad result cannot hide the others
pub fn consume_results<R, F>(results: &[HookResult], mut consume: F) -> Vec<Result<R, String>>
where
    F: FnMut(&HookResult) -> Result<R, String>,
{
    results
        .iter()
        .map(|result| {
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| consume(result)))
                .unwrap_or_else(|panic| Err(panic_message(panic.as_ref())))
        })
        .collect()
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
