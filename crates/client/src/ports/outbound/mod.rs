//! Outbound ports - Interfaces for external services
//!
//! These ports define the contracts that infrastructure adapters must implement,
//! so the connection manager, dispatcher and scene controller never depend on a
//! concrete socket, data source, credential store or game runtime.

pub mod runtime_port;
pub mod session_port;
pub mod snapshot_port;
pub mod transport_port;

pub use runtime_port::{BridgeError, RuntimeChannel};
pub use session_port::{session_keys, SessionIdentity, SessionStore};
pub use snapshot_port::{SnapshotError, SnapshotProvider};
pub use transport_port::{Connector, Transport, TransportError};

#[cfg(any(test, feature = "testing"))]
pub use runtime_port::MockRuntimeChannel;
#[cfg(any(test, feature = "testing"))]
pub use session_port::MockSessionStore;
#[cfg(any(test, feature = "testing"))]
pub use snapshot_port::MockSnapshotProvider;
