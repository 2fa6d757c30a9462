//! Simple test fixtures used across unit and integration tests.

use chrono::{TimeZone, Utc};

use scenesync_domain::{PostEntry, PostId, RoomId, SceneSnapshot};

/// A post with zero likes and votes and a fixed creation time.
pub fn post(id: u64, author: &str, body: &str) -> PostEntry {
    PostEntry {
        id: PostId::new(id),
        author: author.to_string(),
        body: body.to_string(),
        like_count: 0,
        vote_count: 0,
        created_at: Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .unwrap_or_default(),
    }
}

pub fn snapshot_with_posts(room_id: &RoomId, posts: Vec<PostEntry>) -> SceneSnapshot {
    SceneSnapshot {
        posts,
        ..SceneSnapshot::empty(room_id.clone())
    }
}
