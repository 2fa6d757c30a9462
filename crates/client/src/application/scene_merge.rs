//! Pure merge rules for live deltas and snapshot fallback.

use chrono::{DateTime, Utc};

use scenesync_domain::SceneSnapshot;
use scenesync_shared::LiveEvent;

use super::presentation::SnapshotSection;

/// What applying one live event did to the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new post was prepended
    Inserted,
    /// An existing entry changed
    Updated,
    /// The event targets a post the snapshot does not have
    MissedCreate,
    /// The event is for another room
    WrongRoom,
    /// Not a data event
    NotApplicable,
}

/// Apply `event` to `snapshot`; newest posts and votes go first.
pub fn apply_live_event(
    snapshot: &mut SceneSnapshot,
    event: &LiveEvent,
    received_at: DateTime<Utc>,
) -> MergeOutcome {
    if let Some(room_id) = event.room_id() {
        if *room_id != snapshot.room_id {
            return MergeOutcome::WrongRoom;
        }
    }

    match event {
        LiveEvent::NewPost { post, .. } => {
            if snapshot.insert_post(post.clone()) {
                MergeOutcome::Inserted
            } else {
                MergeOutcome::Updated
            }
        }
        LiveEvent::PostUpdated { post, .. } => {
            if snapshot.update_post(post.clone()) {
                MergeOutcome::Updated
            } else {
                MergeOutcome::MissedCreate
            }
        }
        LiveEvent::VoteCast { vote, .. } => {
            if snapshot.record_vote(vote.post_id, vote.vote_count, vote.to_entry(received_at)) {
                MergeOutcome::Updated
            } else {
                MergeOutcome::MissedCreate
            }
        }
        LiveEvent::FeedReplaced { posts, .. } => {
            snapshot.replace_posts(posts.clone());
            MergeOutcome::Updated
        }
        LiveEvent::ConnectionStateChanged { .. } => MergeOutcome::NotApplicable,
    }
}

/// Sections of `snapshot` that hold no entries.
pub fn empty_sections(snapshot: &SceneSnapshot) -> Vec<SnapshotSection> {
    let mut sections = Vec::new();
    if snapshot.characters.is_empty() {
        sections.push(SnapshotSection::Characters);
    }
    if snapshot.posts.is_empty() {
        sections.push(SnapshotSection::Posts);
    }
    if snapshot.votes.is_empty() {
        sections.push(SnapshotSection::Votes);
    }
    sections
}

/// Copy the listed sections from `fallback` into `snapshot`, returning the
/// ones that actually received data.
pub fn fill_sections(
    snapshot: &mut SceneSnapshot,
    fallback: &SceneSnapshot,
    sections: &[SnapshotSection],
) -> Vec<SnapshotSection> {
    let mut filled = Vec::new();
    for section in sections {
        let had_data = match section {
            SnapshotSection::Characters => {
                snapshot.characters = fallback.characters.clone();
                !snapshot.characters.is_empty()
            }
            SnapshotSection::Posts => {
                snapshot.posts = fallback.posts.clone();
                !snapshot.posts.is_empty()
            }
            SnapshotSection::Votes => {
                snapshot.votes = fallback.votes.clone();
                !snapshot.votes.is_empty()
            }
        };
        if had_data {
            filled.push(*section);
        }
    }
    filled
}
