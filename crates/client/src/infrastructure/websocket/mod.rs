//! Live connection to the scene server
//!
//! - `core`: runtime-agnostic reconnect backoff
//! - `client`: tokio-tungstenite transport
//! - `connection_manager`: connection state machine and inbound routing

mod client;
mod connection_manager;
pub mod core;

pub use client::{WsConnector, WsTransport};
pub use connection_manager::{AcknowledgementCallback, ConnectionManager};
pub use core::{BackoffState, ReconnectConfig};
