//! SceneSync Client
//!
//! Keeps a scene view in sync with a live scene server:
//!
//! - `infrastructure` - WebSocket connection with reconnect, live event
//!   fan-out, correlated command delivery, the game runtime bridge, storage
//! - `ports` - traits for the collaborators a host supplies
//! - `application` - the scene state controller and its merge rules
//! - `runner` - wires everything together for a host or the `scenesync` binary

pub mod application;
pub mod config;
pub mod infrastructure;
pub mod ports;
pub mod runner;

pub use application::{ActivationOutcome, ScenePresentation, SceneStateController, SnapshotSource};
pub use config::{ClientConfig, ConfigError};
pub use runner::{Collaborators, SceneSync};
