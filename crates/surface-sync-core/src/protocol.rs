//! Canvas wire protocol.
//!
//! The live channel carries JSON text frames tagged by `type`: `init`
//! (full surface list), `render` (one surface), and `delete` (one id).
//! The interaction callback posts a [`CallbackRequest`].

use serde::{Deserialize, Serialize};

use crate::types::{Surface, SyncEvent};

/// A message received on the live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanvasMessage {
    /// Full surface list, sent on connect.
    Init { surfaces: Vec<Surface> },
    /// One surface created or updated.
    Render { surface: Surface },
    /// One surface deleted.
    Delete { id: String },
}

impl CanvasMessage {
    /// Parse a text frame. Returns `None` for malformed JSON or an unknown `type`.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn into_event(self) -> SyncEvent {
        match self {
            CanvasMessage::Init { surfaces } => SyncEvent::Snapshot(surfaces),
            CanvasMessage::Render { surface } => SyncEvent::Upsert(surface),
            CanvasMessage::Delete { id } => SyncEvent::Remove(id),
        }
    }
}

/// Body of an interaction callback POST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackRequest {
    pub surface_id: String,
    pub action: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}
