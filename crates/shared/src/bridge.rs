//! Embedded game runtime message envelope
//!
//! Symmetric in both directions: `{ "type": "...", "data": {...} }`. The bridge
//! itself only looks at `type`; payload structs here describe what the scene
//! controller and the runtime agree on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use scenesync_domain::PostId;

/// Runtime → host: the runtime finished loading and accepts messages
pub const MSG_READY: &str = "READY";
/// Host → runtime: switch the rendered scene
pub const MSG_UPDATE_SCENE: &str = "UPDATE_SCENE";
/// Host → runtime: a post arrived in the active room
pub const MSG_NEW_POST: &str = "NEW_POST";
/// Runtime → host: the player liked a post in-game
pub const MSG_LIKE_POST: &str = "LIKE_POST";
/// Runtime → host: the player voted on a post in-game
pub const MSG_VOTE_POST: &str = "VOTE_POST";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl BridgeEnvelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Envelope carrying a serializable payload.
    pub fn with_payload<T: Serialize>(
        kind: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }

    pub fn ready() -> Self {
        Self::new(MSG_READY, Value::Null)
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScenePayload {
    pub scene_id: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostActionPayload {
    pub post_id: PostId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<u32>,
}
