//! Snapshot data source port
//!
//! Note: uses `async_trait` rather than returning `Pin<Box<dyn Future>>` for
//! better mockall compatibility.

use async_trait::async_trait;
use thiserror::Error;

use scenesync_domain::{RoomId, SceneSnapshot};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot source unavailable: {0}")]
    Unavailable(String),

    #[error("invalid snapshot data: {0}")]
    Invalid(String),
}

/// Source of the initial state of a room.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// `Ok(None)` when the source has nothing for this room.
    async fn get_snapshot(&self, room_id: &RoomId) -> Result<Option<SceneSnapshot>, SnapshotError>;
}
