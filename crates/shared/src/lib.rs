//! SceneSync Protocol - Shared types for the scene server, the client and the
//! embedded game runtime
//!
//! This crate contains all types that cross a process boundary:
//! - Inbound server messages and their decoding (`ServerMessage`, `LiveEvent`)
//! - Outbound client messages (`ClientMessage`, `OutboundCommand`)
//! - Connection state shared between the transport and its observers
//! - The game runtime bridge envelope
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, serde_json, chrono and thiserror
//! 2. **No business logic** - Pure data types and serialization
//! 3. **Forward compatible** - Unknown events and statuses decode, never fail

pub mod bridge;
pub mod events;
pub mod messages;

pub use bridge::{BridgeEnvelope, PostActionPayload, UpdateScenePayload};
pub use events::{ConnectionState, LiveEvent, VoteCast};
pub use messages::{
    decode_server_message, AckStatus, Acknowledgement, ClientMessage, Command, CommandKind,
    DecodeError, OutboundCommand, RoomAction, RoomRequest, ServerMessage,
};
