//! Connection state shared between the connection manager and its readers.
//!
//! The manager is the only writer. Readers such as a status indicator poll a
//! [`ConnectionStateObserver`] instead of subscribing to state-change events.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use scenesync_shared::ConnectionState;

/// Read-only handle on the manager's state cell. Clones share the cell.
#[derive(Clone)]
pub struct ConnectionStateObserver {
    cell: Arc<AtomicU8>,
}

impl ConnectionStateObserver {
    pub(crate) fn new(cell: Arc<AtomicU8>) -> Self {
        Self { cell }
    }

    pub fn state(&self) -> ConnectionState {
        load_connection_state(&self.cell)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state(), ConnectionState::Connected)
    }

    /// True whenever live updates may be missing from what is on screen.
    pub fn is_offline(&self) -> bool {
        self.state().is_offline()
    }
}

pub(crate) fn load_connection_state(cell: &AtomicU8) -> ConnectionState {
    ConnectionState::from_u8(cell.load(Ordering::SeqCst))
}

/// Store `next`, returning what was there before.
pub(crate) fn swap_connection_state(cell: &AtomicU8, next: ConnectionState) -> ConnectionState {
    ConnectionState::from_u8(cell.swap(next.to_u8(), Ordering::SeqCst))
}
