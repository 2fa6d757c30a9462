//! Infrastructure layer - adapters for the live transport, storage and the
//! embedded game runtime

pub mod game_bridge;
pub mod messaging;
pub mod snapshot_store;
pub mod storage;
pub mod websocket;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
