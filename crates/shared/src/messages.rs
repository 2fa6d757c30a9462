//! WebSocket message types for server-client communication
//!
//! ## Inbound (server → client)
//!
//! - Scene events: `{ "event": "...", "roomId": "...", "payload": {...} }`
//! - Acknowledgements: `{ "correlationId": "...", "status": "ok" | "error" }`
//!
//! Unknown `event` names decode to [`ServerMessage::Unhandled`] so newer servers
//! never break older clients.
//!
//! ## Outbound (client → server)
//!
//! - Commands: `{ "correlationId", "kind": "like" | "vote", "targetId", ... }`
//! - Room interest: `{ "action": "subscribe" | "unsubscribe", "roomId" }`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use scenesync_domain::{CorrelationId, PostEntry, PostId, RoomId};

use crate::events::{LiveEvent, VoteCast};

// =============================================================================
// Server Messages (server → client)
// =============================================================================

pub const EVENT_NEW_POST: &str = "newPost";
pub const EVENT_POST_UPDATED: &str = "postUpdated";
pub const EVENT_VOTE_CAST: &str = "voteCast";
pub const EVENT_SCENE_FEED: &str = "sceneFeed";

/// Decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Event(LiveEvent),
    Ack(Acknowledgement),
    /// Well-formed envelope with an event name this client does not know
    Unhandled {
        event: String,
        room_id: Option<RoomId>,
    },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("'{event}' event without a roomId")]
    MissingRoom { event: String },

    #[error("malformed '{event}' payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventEnvelope {
    event: String,
    #[serde(default)]
    room_id: Option<RoomId>,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct FeedPayload {
    #[serde(default)]
    posts: Vec<PostEntry>,
}

/// Decode one text frame into exactly one message.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, DecodeError> {
    let value: Value = serde_json::from_str(text)?;

    if value.get("correlationId").is_some() {
        let ack: Acknowledgement = serde_json::from_value(value)?;
        return Ok(ServerMessage::Ack(ack));
    }

    let envelope: EventEnvelope = serde_json::from_value(value)?;
    let EventEnvelope {
        event,
        room_id,
        payload,
    } = envelope;

    if !is_known_event(&event) {
        return Ok(ServerMessage::Unhandled { event, room_id });
    }
    let Some(room_id) = room_id else {
        return Err(DecodeError::MissingRoom { event });
    };

    let decoded = match event.as_str() {
        EVENT_NEW_POST => payload_as(&event, payload).map(|post| LiveEvent::NewPost {
            room_id,
            post,
        })?,
        EVENT_POST_UPDATED => payload_as(&event, payload).map(|post| LiveEvent::PostUpdated {
            room_id,
            post,
        })?,
        EVENT_VOTE_CAST => {
            payload_as::<VoteCast>(&event, payload).map(|vote| LiveEvent::VoteCast {
                room_id,
                vote,
            })?
        }
        _ => payload_as::<FeedPayload>(&event, payload).map(|feed| LiveEvent::FeedReplaced {
            room_id,
            posts: feed.posts,
        })?,
    };

    Ok(ServerMessage::Event(decoded))
}

fn is_known_event(event: &str) -> bool {
    matches!(
        event,
        EVENT_NEW_POST | EVENT_POST_UPDATED | EVENT_VOTE_CAST | EVENT_SCENE_FEED
    )
}

fn payload_as<T: serde::de::DeserializeOwned>(event: &str, payload: Value) -> Result<T, DecodeError> {
    serde_json::from_value(payload).map_err(|source| DecodeError::Payload {
        event: event.to_string(),
        source,
    })
}

// =============================================================================
// Acknowledgements
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Error,
    /// Unknown variant for forward compatibility; treated as a rejection
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    pub correlation_id: CorrelationId,
    pub status: AckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Acknowledgement {
    pub fn is_ok(&self) -> bool {
        self.status == AckStatus::Ok
    }
}

// =============================================================================
// Client Messages (client → server)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Like,
    Vote,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandKind::Like => write!(f, "like"),
            CommandKind::Vote => write!(f, "vote"),
        }
    }
}

/// A user action with its kind-specific fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Like,
    Vote { choice: u32 },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Like => CommandKind::Like,
            Command::Vote { .. } => CommandKind::Vote,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundCommand {
    pub correlation_id: CorrelationId,
    pub kind: CommandKind,
    pub target_id: PostId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl OutboundCommand {
    pub fn new(
        correlation_id: CorrelationId,
        command: Command,
        target_id: PostId,
        user_id: Option<String>,
    ) -> Self {
        let choice = match command {
            Command::Like => None,
            Command::Vote { choice } => Some(choice),
        };
        Self {
            correlation_id,
            kind: command.kind(),
            target_id,
            choice,
            user_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomAction {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    pub action: RoomAction,
    pub room_id: RoomId,
}

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Command(OutboundCommand),
    Room(RoomRequest),
}

impl ClientMessage {
    pub fn subscribe(room_id: RoomId) -> Self {
        Self::Room(RoomRequest {
            action: RoomAction::Subscribe,
            room_id,
        })
    }

    pub fn unsubscribe(room_id: RoomId) -> Self {
        Self::Room(RoomRequest {
            action: RoomAction::Unsubscribe,
            room_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post_json(id: u64) -> Value {
        json!({
            "id": id,
            "author": "Mabel",
            "body": "The cows escaped again",
            "likeCount": 1,
            "voteCount": 0,
            "createdAt": "2024-05-01T12:00:00Z"
        })
    }

    #[test]
    fn decodes_new_post_with_numeric_room() {
        let text = json!({"event": "newPost", "roomId": 4, "payload": post_json(7)}).to_string();
        let msg = decode_server_message(&text).unwrap();
        match msg {
            ServerMessage::Event(LiveEvent::NewPost { room_id, post }) => {
                assert_eq!(room_id.as_str(), "4");
                assert_eq!(post.id, PostId::new(7));
                assert_eq!(post.like_count, 1);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn decodes_vote_cast_and_feed() {
        let vote = json!({
            "event": "voteCast",
            "roomId": "3",
            "payload": {"postId": 9, "voteCount": 12, "choice": 1}
        });
        assert!(matches!(
            decode_server_message(&vote.to_string()).unwrap(),
            ServerMessage::Event(LiveEvent::VoteCast { ref vote, .. }) if vote.vote_count == 12
        ));

        let feed = json!({
            "event": "sceneFeed",
            "roomId": "3",
            "payload": {"posts": [post_json(1), post_json(2)]}
        });
        assert!(matches!(
            decode_server_message(&feed.to_string()).unwrap(),
            ServerMessage::Event(LiveEvent::FeedReplaced { ref posts, .. }) if posts.len() == 2
        ));
    }

    #[test]
    fn unknown_event_is_unhandled_not_error() {
        let text = json!({"event": "weatherChanged", "roomId": "4", "payload": {}}).to_string();
        let msg = decode_server_message(&text).unwrap();
        assert!(matches!(msg, ServerMessage::Unhandled { ref event, .. } if event == "weatherChanged"));
    }

    #[test]
    fn malformed_input_is_a_decode_error() {
        assert!(matches!(
            decode_server_message("{not json"),
            Err(DecodeError::Malformed(_))
        ));
        let bad_payload = json!({"event": "newPost", "roomId": "4", "payload": {"id": "x"}});
        assert!(matches!(
            decode_server_message(&bad_payload.to_string()),
            Err(DecodeError::Payload { .. })
        ));
        let no_room = json!({"event": "postUpdated", "payload": post_json(1)});
        assert!(matches!(
            decode_server_message(&no_room.to_string()),
            Err(DecodeError::MissingRoom { .. })
        ));
    }

    #[test]
    fn decodes_acknowledgement() {
        let id = CorrelationId::new();
        let text = json!({"correlationId": id.to_string(), "status": "error", "message": "nope"});
        let msg = decode_server_message(&text.to_string()).unwrap();
        match msg {
            ServerMessage::Ack(ack) => {
                assert_eq!(ack.correlation_id, id);
                assert!(!ack.is_ok());
                assert_eq!(ack.message.as_deref(), Some("nope"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn outbound_command_wire_shape() {
        let id = CorrelationId::new();
        let msg = ClientMessage::Command(OutboundCommand::new(
            id,
            Command::Vote { choice: 2 },
            PostId::new(42),
            Some("u-1".into()),
        ));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["correlationId"], id.to_string());
        assert_eq!(value["kind"], "vote");
        assert_eq!(value["targetId"], 42);
        assert_eq!(value["choice"], 2);
        assert_eq!(value["userId"], "u-1");

        let like = ClientMessage::Command(OutboundCommand::new(id, Command::Like, PostId::new(1), None));
        let value = serde_json::to_value(&like).unwrap();
        assert!(value.get("choice").is_none());
        assert!(value.get("userId").is_none());
    }

    #[test]
    fn room_request_wire_shape() {
        let value = serde_json::to_value(ClientMessage::subscribe(RoomId::new("3").unwrap())).unwrap();
        assert_eq!(value, json!({"action": "subscribe", "roomId": "3"}));
    }
}
