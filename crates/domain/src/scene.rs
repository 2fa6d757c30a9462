use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::RoomId;

/// Scene id used when the caller supplies none
pub const FALLBACK_SCENE_ID: &str = "scene_A1";

/// Result of resolving an externally supplied scene id.
///
/// Immutable once resolved; a new external id produces a new identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneIdentity {
    external_id: String,
    canonical_room_id: RoomId,
}

impl SceneIdentity {
    pub(crate) fn new(external_id: String, canonical_room_id: RoomId) -> Self {
        Self {
            external_id,
            canonical_room_id,
        }
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.canonical_room_id
    }
}

/// UI selection label for a room (e.g. `ranch`, `idol`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneTag(String);

impl SceneTag {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
