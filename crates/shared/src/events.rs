//! Live scene events
//!
//! `LiveEvent` is the closed set of things a subscriber can observe. Every
//! consumer matches it exhaustively, so adding a variant is a compile error
//! everywhere it is handled.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scenesync_domain::{PostEntry, PostId, RoomId, VoteEntry};

/// Connection state of the live transport.
///
/// Owned by the connection manager; everyone else only observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected to the server
    Disconnected,
    /// Attempting to establish connection
    Connecting,
    /// Successfully connected
    Connected,
    /// Connection lost, waiting to retry
    Reconnecting,
    /// Connection failed (max retries exceeded)
    Failed,
}

impl ConnectionState {
    /// Convert to u8 for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting => 3,
            ConnectionState::Failed => 4,
        }
    }

    /// Convert from u8 (atomic storage).
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            4 => ConnectionState::Failed,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Presented state should be treated as stale in these states.
    pub fn is_offline(self) -> bool {
        !matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Payload of a `voteCast` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteCast {
    pub post_id: PostId,
    /// Authoritative tally after this vote
    pub vote_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast_at: Option<DateTime<Utc>>,
}

impl VoteCast {
    /// History entry for this vote, stamped with `received_at` when the
    /// server did not send a timestamp.
    pub fn to_entry(&self, received_at: DateTime<Utc>) -> VoteEntry {
        VoteEntry {
            post_id: self.post_id,
            voter: self.voter.clone(),
            choice: self.choice,
            cast_at: self.cast_at.unwrap_or(received_at),
        }
    }
}

/// A decoded scene event.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    NewPost {
        room_id: RoomId,
        post: PostEntry,
    },
    PostUpdated {
        room_id: RoomId,
        post: PostEntry,
    },
    VoteCast {
        room_id: RoomId,
        vote: VoteCast,
    },
    /// Server pushed the whole feed for a room
    FeedReplaced {
        room_id: RoomId,
        posts: Vec<PostEntry>,
    },
    /// Synthesized locally by the connection manager, never decoded.
    ///
    /// `room_id` is the room the connection was streaming when the state
    /// changed, if any.
    ConnectionStateChanged {
        room_id: Option<RoomId>,
        state: ConnectionState,
    },
}

impl LiveEvent {
    /// Room the event belongs to; `None` for connection-wide events.
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            LiveEvent::NewPost { room_id, .. }
            | LiveEvent::PostUpdated { room_id, .. }
            | LiveEvent::VoteCast { room_id, .. }
            | LiveEvent::FeedReplaced { room_id, .. } => Some(room_id),
            LiveEvent::ConnectionStateChanged { .. } => None,
        }
    }

    /// Whether a consumer watching `room` should see this event.
    pub fn concerns(&self, room: &RoomId) -> bool {
        self.room_id().map_or(true, |r| r == room)
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            LiveEvent::NewPost { .. } => "new_post",
            LiveEvent::PostUpdated { .. } => "post_updated",
            LiveEvent::VoteCast { .. } => "vote_cast",
            LiveEvent::FeedReplaced { .. } => "feed_replaced",
            LiveEvent::ConnectionStateChanged { .. } => "connection_state_changed",
        }
    }
}
