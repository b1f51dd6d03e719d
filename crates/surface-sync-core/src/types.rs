//! Surface model and the events that flow from transport to reconciler.

use serde::{Deserialize, Serialize};

/// Opaque renderer-specific values attached to a surface.
pub type Props = serde_json::Map<String, serde_json::Value>;

/// One addressable unit of remote content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub id: String,

    /// Renderer name. Unknown kinds are still delivered.
    #[serde(rename = "component")]
    pub kind: String,

    #[serde(default)]
    pub props: Props,

    /// Target for interaction callbacks, if the surface accepts them.
    #[serde(rename = "callbackUrl", default)]
    pub callback_target: Option<String>,

    /// Last server-side modification. Informational only.
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<String>,
}

impl Surface {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            props: Props::new(),
            callback_target: None,
            updated_at: None,
        }
    }

    /// Builder-style prop setter.
    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }
}

/// A synchronization event emitted by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Replace the whole surface set.
    Snapshot(Vec<Surface>),
    /// Create or update one surface.
    Upsert(Surface),
    /// Delete one surface by id.
    Remove(String),
}

impl SyncEvent {
    pub fn label(&self) -> &'static str {
        match self {
            SyncEvent::Snapshot(_) => "snapshot",
            SyncEvent::Upsert(_) => "upsert",
            SyncEvent::Remove(_) => "remove",
        }
    }
}

/// Transport connection mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Live,
    DegradedPolling,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Live => "live",
            ConnectionState::DegradedPolling => "degraded-polling",
        };
        f.write_str(s)
    }
}
