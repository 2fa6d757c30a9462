//! State handed to the presentational layer.

use scenesync_domain::{RoomId, SceneIdentity, SceneSnapshot, SceneTag};
use scenesync_shared::ConnectionState;

/// A snapshot section that can be filled from the default room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotSection {
    Characters,
    Posts,
    Votes,
}

/// Where the presented snapshot came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SnapshotSource {
    /// No scene active, or its snapshot is still loading
    #[default]
    Pending,
    /// Everything came from the provider for the active room
    Provider,
    /// The active room had no data; the default room's snapshot is shown
    DefaultFallback { from: RoomId },
    /// Some sections were empty and were filled from the default room
    PartialFallback {
        from: RoomId,
        sections: Vec<SnapshotSection>,
    },
    /// Neither the active nor the default room had data
    Empty,
}

impl SnapshotSource {
    /// Whether the view should label the content as default content.
    pub fn uses_default_content(&self) -> bool {
        matches!(
            self,
            SnapshotSource::DefaultFallback { .. } | SnapshotSource::PartialFallback { .. }
        )
    }
}

/// Everything the view renders for the active scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenePresentation {
    pub identity: Option<SceneIdentity>,
    pub tag: Option<SceneTag>,
    /// `None` while loading
    pub snapshot: Option<SceneSnapshot>,
    pub source: SnapshotSource,
    pub loading: bool,
    pub connection: ConnectionState,
}

impl ScenePresentation {
    pub fn idle(connection: ConnectionState) -> Self {
        Self {
            identity: None,
            tag: None,
            snapshot: None,
            source: SnapshotSource::Pending,
            loading: false,
            connection,
        }
    }

    /// Live data may be behind while the connection is down.
    pub fn is_stale(&self) -> bool {
        self.connection.is_offline()
    }
}
