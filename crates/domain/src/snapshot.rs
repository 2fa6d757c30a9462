//! Scene snapshot model
//!
//! A `SceneSnapshot` is produced once per scene activation and replaced
//! wholesale on scene change. Between activations it only changes through the
//! delta operations below, which live deltas and optimistic updates drive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{PostId, RoomId};

/// A character shown in the scene sidebar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterEntry {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// A post in the scene thread feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostEntry {
    pub id: PostId,
    pub author: String,
    pub body: String,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub vote_count: u32,
    pub created_at: DateTime<Utc>,
}

/// A single vote in the scene's vote history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteEntry {
    pub post_id: PostId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<u32>,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSnapshot {
    pub room_id: RoomId,
    #[serde(default)]
    pub characters: Vec<CharacterEntry>,
    /// Newest first
    #[serde(default)]
    pub posts: Vec<PostEntry>,
    /// Newest first
    #[serde(default)]
    pub votes: Vec<VoteEntry>,
}

impl SceneSnapshot {
    pub fn empty(room_id: RoomId) -> Self {
        Self {
            room_id,
            characters: Vec::new(),
            posts: Vec::new(),
            votes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty() && self.posts.is_empty() && self.votes.is_empty()
    }

    pub fn post(&self, id: PostId) -> Option<&PostEntry> {
        self.posts.iter().find(|p| p.id == id)
    }

    pub fn post_mut(&mut self, id: PostId) -> Option<&mut PostEntry> {
        self.posts.iter_mut().find(|p| p.id == id)
    }

    /// Insert a newly created post at the head of the feed.
    ///
    /// Returns false when a post with the same id already exists; the existing
    /// entry is refreshed in place instead of duplicated.
    pub fn insert_post(&mut self, post: PostEntry) -> bool {
        if let Some(existing) = self.post_mut(post.id) {
            *existing = post;
            return false;
        }
        self.posts.insert(0, post);
        true
    }

    /// Overwrite an existing post with an authoritative copy.
    ///
    /// Returns false when no post with that id is present.
    pub fn update_post(&mut self, post: PostEntry) -> bool {
        match self.post_mut(post.id) {
            Some(existing) => {
                *existing = post;
                true
            }
            None => false,
        }
    }

    /// Record a vote against an existing post.
    ///
    /// `vote_count` is the server's authoritative tally. Returns false when no
    /// post with that id is present, in which case nothing changes.
    pub fn record_vote(&mut self, post_id: PostId, vote_count: u32, entry: VoteEntry) -> bool {
        let Some(post) = self.post_mut(post_id) else {
            return false;
        };
        post.vote_count = vote_count;
        self.votes.insert(0, entry);
        true
    }

    /// Replace the post list wholesale.
    pub fn replace_posts(&mut self, posts: Vec<PostEntry>) {
        self.posts = posts;
    }

    /// Adjust a post's like count by `delta`, saturating at zero.
    pub fn adjust_likes(&mut self, post_id: PostId, delta: i64) -> bool {
        match self.post_mut(post_id) {
            Some(post) => {
                post.like_count = saturating_adjust(post.like_count, delta);
                true
            }
            None => false,
        }
    }

    /// Adjust a post's vote count by `delta`, saturating at zero.
    pub fn adjust_votes(&mut self, post_id: PostId, delta: i64) -> bool {
        match self.post_mut(post_id) {
            Some(post) => {
                post.vote_count = saturating_adjust(post.vote_count, delta);
                true
            }
            None => false,
        }
    }
}

fn saturating_adjust(value: u32, delta: i64) -> u32 {
    (i64::from(value) + delta).clamp(0, i64::from(u32::MAX)) as u32
}
