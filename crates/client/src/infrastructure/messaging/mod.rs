//! Messaging layer between the live transport and its consumers:
//! - `SubscriptionRegistry`: push-based fan-out of live events
//! - `CommandDispatcher`: correlated, retried, coalesced user commands
//! - `ConnectionStateObserver`: lock-free view of the connection state

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod command_dispatcher;
pub mod connection;
pub mod subscription_registry;

pub use command_dispatcher::{
    CommandConfig, CommandDispatcher, CommandError, CommandOutcome, PendingCommand,
    PendingCommandHandle,
};
pub use connection::ConnectionStateObserver;
pub use subscription_registry::{PublishReport, SubscriptionHandle, SubscriptionRegistry};

/// Lock a std mutex, recovering the data if a holder panicked.
///
/// Every critical section in this crate leaves its data consistent before
/// anything that can panic runs, so a poisoned lock is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
