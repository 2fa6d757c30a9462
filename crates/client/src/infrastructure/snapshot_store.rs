//! Snapshot provider backed by a fixed set of room snapshots.
//!
//! Loaded from a JSON array of `SceneSnapshot` objects, one per room.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use scenesync_domain::{RoomId, SceneSnapshot};

use crate::ports::outbound::{SnapshotError, SnapshotProvider};

#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotProvider {
    snapshots: HashMap<RoomId, SceneSnapshot>,
}

impl InMemorySnapshotProvider {
    pub fn new(snapshots: impl IntoIterator<Item = SceneSnapshot>) -> Self {
        Self {
            snapshots: snapshots
                .into_iter()
                .map(|snapshot| (snapshot.room_id.clone(), snapshot))
                .collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshots: Vec<SceneSnapshot> =
            serde_json::from_str(json).map_err(|e| SnapshotError::Invalid(e.to_string()))?;
        Ok(Self::new(snapshots))
    }

    pub fn from_path(path: &Path) -> Result<Self, SnapshotError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SnapshotError::Unavailable(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn insert(&mut self, snapshot: SceneSnapshot) {
        self.snapshots.insert(snapshot.room_id.clone(), snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl SnapshotProvider for InMemorySnapshotProvider {
    async fn get_snapshot(&self, room_id: &RoomId) -> Result<Option<SceneSnapshot>, SnapshotError> {
        Ok(self.snapshots.get(room_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_rooms_from_json() {
        let provider = InMemorySnapshotProvider::from_json(
            r#"[
                {"roomId": 4, "characters": [{"id": "c1", "name": "Mabel"}]},
                {"roomId": "3", "posts": []}
            ]"#,
        )
        .unwrap();

        assert_eq!(provider.len(), 2);
        let ranch = provider
            .get_snapshot(&RoomId::new("4").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ranch.characters[0].name, "Mabel");
        assert!(provider
            .get_snapshot(&RoomId::new("9").unwrap())
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn invalid_json_is_reported() {
        assert!(matches!(
            InMemorySnapshotProvider::from_json("{"),
            Err(SnapshotError::Invalid(_))
        ));
    }
}
