//! Command dispatcher for user actions sent to the scene server.
//!
//! Every command is tagged with a fresh [`CorrelationId`] and tracked until the
//! server acknowledges it, it exhausts its retries, or the dispatcher shuts
//! down. A second command with the same kind and target issued while the
//! first is pending is coalesced onto it instead of being sent again.
//!
//! Commands issued while offline are queued in issue order and flushed when
//! the connection reports `Connected`. If the connection gives up instead
//! (`Failed`), queued commands resolve with [`CommandError::Offline`]. Nothing
//! is ever dropped silently: every handle eventually resolves.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot;

use scenesync_domain::{CorrelationId, PostId};
use scenesync_shared::{
    Acknowledgement, ClientMessage, Command, CommandKind, ConnectionState, LiveEvent,
    OutboundCommand,
};

use crate::infrastructure::websocket::ConnectionManager;
use crate::ports::outbound::{SessionIdentity, SessionStore, TransportError};

use super::{lock, SubscriptionHandle};

pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandConfig {
    /// How long to wait for an acknowledgement before retransmitting
    pub ack_timeout: Duration,
    /// Retransmissions after the first send before giving up
    pub max_retries: u32,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(DEFAULT_ACK_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("command {correlation_id} not acknowledged after {attempts} attempts")]
    TimedOut {
        correlation_id: CorrelationId,
        attempts: u32,
    },

    #[error("command {correlation_id} rejected by server: {message}")]
    Rejected {
        correlation_id: CorrelationId,
        message: String,
    },

    #[error("command {correlation_id} abandoned, connection failed")]
    Offline { correlation_id: CorrelationId },

    #[error("command cancelled")]
    Cancelled,

    #[error("command dispatcher is shut down")]
    NotRunning,
}

pub type CommandOutcome = Result<(), CommandError>;

/// A command awaiting acknowledgement.
#[derive(Debug)]
pub struct PendingCommand {
    pub correlation_id: CorrelationId,
    pub command: Command,
    pub target_id: PostId,
    /// Transmissions so far
    pub attempts: u32,
    pub issued_at: DateTime<Utc>,
    pub user_id: Option<String>,
    waiters: Vec<oneshot::Sender<CommandOutcome>>,
}

impl PendingCommand {
    fn key(&self) -> (CommandKind, PostId) {
        (self.command.kind(), self.target_id)
    }

    fn outbound(&self) -> OutboundCommand {
        OutboundCommand::new(
            self.correlation_id,
            self.command,
            self.target_id,
            self.user_id.clone(),
        )
    }

    fn resolve(self, outcome: CommandOutcome) {
        for waiter in self.waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Returned by [`CommandDispatcher::send`].
#[derive(Debug)]
pub struct PendingCommandHandle {
    pub correlation_id: CorrelationId,
    /// True when this call joined an already pending identical command
    pub coalesced: bool,
    outcome: oneshot::Receiver<CommandOutcome>,
}

impl PendingCommandHandle {
    /// Wait for the command to be acknowledged, rejected or abandoned.
    pub async fn outcome(self) -> CommandOutcome {
        self.outcome.await.unwrap_or(Err(CommandError::Cancelled))
    }
}

#[derive(Default)]
struct DispatchState {
    pending: HashMap<CorrelationId, PendingCommand>,
    by_target: HashMap<(CommandKind, PostId), CorrelationId>,
    /// Issued while offline, in issue order
    queue: VecDeque<CorrelationId>,
    closed: bool,
}

struct DispatcherInner {
    connection: ConnectionManager,
    session: Arc<dyn SessionStore>,
    config: CommandConfig,
    state: Mutex<DispatchState>,
    subscription: Mutex<Option<SubscriptionHandle>>,
}

/// Cheap to clone; clones share pending state.
#[derive(Clone)]
pub struct CommandDispatcher {
    inner: Arc<DispatcherInner>,
}

impl CommandDispatcher {
    /// Create a dispatcher and attach it to the connection's acknowledgement
    /// stream and state changes.
    pub fn new(
        connection: ConnectionManager,
        session: Arc<dyn SessionStore>,
        config: CommandConfig,
    ) -> Self {
        let inner = Arc::new(DispatcherInner {
            connection: connection.clone(),
            session,
            config,
            state: Mutex::new(DispatchState::default()),
            subscription: Mutex::new(None),
        });

        let weak: Weak<DispatcherInner> = Arc::downgrade(&inner);
        connection.set_on_acknowledgement(move |ack| {
            if let Some(inner) = weak.upgrade() {
                inner.on_acknowledgement(ack);
            }
        });

        let weak = Arc::downgrade(&inner);
        let handle = connection
            .registry()
            .subscribe("command-dispatcher", move |event: &LiveEvent| {
                let LiveEvent::ConnectionStateChanged { state, .. } = event else {
                    return Ok(());
                };
                if let Some(inner) = weak.upgrade() {
                    match state {
                        ConnectionState::Connected => inner.flush(),
                        ConnectionState::Failed => inner.abandon_queued(),
                        _ => {}
                    }
                }
                Ok(())
            });
        *lock(&inner.subscription) = Some(handle);

        Self { inner }
    }

    /// Issue `command` against `target_id`.
    ///
    /// Fails only with [`CommandError::NotRunning`] after shutdown.
    pub fn send(
        &self,
        command: Command,
        target_id: PostId,
    ) -> Result<PendingCommandHandle, CommandError> {
        self.send_observed(command, target_id).map(|(handle, _)| handle)
    }

    /// Like [`send`](Self::send), plus a second receiver for the outcome that
    /// is registered atomically with the command, so an observer can never
    /// miss a fast failure.
    pub fn send_observed(
        &self,
        command: Command,
        target_id: PostId,
    ) -> Result<(PendingCommandHandle, oneshot::Receiver<CommandOutcome>), CommandError> {
        let user_id = SessionIdentity::lookup(self.inner.session.as_ref()).map(|id| id.user_id);
        let (tx, rx) = oneshot::channel();
        let (observer_tx, observer_rx) = oneshot::channel();
        let key = (command.kind(), target_id);

        let correlation_id = {
            let mut state = lock(&self.inner.state);
            if state.closed {
                return Err(CommandError::NotRunning);
            }

            if let Some(existing) = state.by_target.get(&key).copied() {
                if let Some(pending) = state.pending.get_mut(&existing) {
                    pending.waiters.push(tx);
                    pending.waiters.push(observer_tx);
                    tracing::debug!(
                        correlation_id = %existing.short(),
                        kind = %key.0,
                        target = %target_id,
                        "Coalesced duplicate command"
                    );
                    let handle = PendingCommandHandle {
                        correlation_id: existing,
                        coalesced: true,
                        outcome: rx,
                    };
                    return Ok((handle, observer_rx));
                }
            }

            let correlation_id = CorrelationId::new();
            state.pending.insert(
                correlation_id,
                PendingCommand {
                    correlation_id,
                    command,
                    target_id,
                    attempts: 0,
                    issued_at: Utc::now(),
                    user_id,
                    waiters: vec![tx, observer_tx],
                },
            );
            state.by_target.insert(key, correlation_id);
            correlation_id
        };

        tracing::debug!(correlation_id = %correlation_id.short(), kind = %key.0, target = %target_id, "Command issued");
        self.inner.dispatch(correlation_id);

        let handle = PendingCommandHandle {
            correlation_id,
            coalesced: false,
            outcome: rx,
        };
        Ok((handle, observer_rx))
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.inner.state).pending.len()
    }

    pub fn queued_count(&self) -> usize {
        lock(&self.inner.state).queue.len()
    }

    /// Detach from the connection and cancel everything still pending.
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.inner.subscription).take() {
            self.inner.connection.registry().unsubscribe(handle);
        }
        self.inner.connection.clear_on_acknowledgement();

        let drained: Vec<PendingCommand> = {
            let mut state = lock(&self.inner.state);
            state.closed = true;
            state.queue.clear();
            state.by_target.clear();
            state.pending.drain().map(|(_, pending)| pending).collect()
        };
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "Cancelled pending commands on shutdown");
        }
        for pending in drained {
            pending.resolve(Err(CommandError::Cancelled));
        }
    }
}

impl DispatcherInner {
    /// First send or retry: keep FIFO order behind anything already queued.
    fn dispatch(self: &Arc<Self>, correlation_id: CorrelationId) {
        let queued_ahead = !lock(&self.state).queue.is_empty();
        if !queued_ahead {
            match self.try_transmit(correlation_id) {
                Ok(()) => return,
                Err(e) => {
                    tracing::debug!(correlation_id = %correlation_id.short(), error = %e, "Command queued until reconnect");
                }
            }
        }

        lock(&self.state).queue.push_back(correlation_id);
        // The connection may have changed between the failed send and the push
        match self.connection.state() {
            ConnectionState::Connected => self.flush(),
            ConnectionState::Failed => self.abandon_queued(),
            _ => {}
        }
    }

    /// No reconnect is coming: fail everything waiting in the queue.
    fn abandon_queued(&self) {
        let abandoned: Vec<PendingCommand> = {
            let mut state = lock(&self.state);
            let queued: Vec<CorrelationId> = state.queue.drain(..).collect();
            queued
                .into_iter()
                .filter_map(|correlation_id| state.remove(correlation_id))
                .collect()
        };
        for pending in abandoned {
            tracing::warn!(
                correlation_id = %pending.correlation_id.short(),
                kind = %pending.command.kind(),
                target = %pending.target_id,
                "Connection failed, abandoning queued command"
            );
            let correlation_id = pending.correlation_id;
            pending.resolve(Err(CommandError::Offline { correlation_id }));
        }
    }

    /// Send queued commands in order, stopping at the first failure.
    fn flush(self: &Arc<Self>) {
        loop {
            let Some(next) = lock(&self.state).queue.pop_front() else {
                return;
            };
            if let Err(e) = self.try_transmit(next) {
                tracing::debug!(error = %e, "Flush interrupted, connection unavailable");
                lock(&self.state).queue.push_front(next);
                return;
            }
        }
    }

    /// Transmit once and arm the acknowledgement timer. A command that is no
    /// longer pending counts as done.
    fn try_transmit(self: &Arc<Self>, correlation_id: CorrelationId) -> Result<(), TransportError> {
        let Some(message) = lock(&self.state)
            .pending
            .get(&correlation_id)
            .map(PendingCommand::outbound)
        else {
            return Ok(());
        };

        self.connection.transmit(&ClientMessage::Command(message))?;

        let attempt = {
            let mut state = lock(&self.state);
            match state.pending.get_mut(&correlation_id) {
                Some(pending) => {
                    pending.attempts += 1;
                    pending.attempts
                }
                // Acknowledged already
                None => return Ok(()),
            }
        };
        tracing::debug!(correlation_id = %correlation_id.short(), attempt, "Command transmitted");
        self.arm_timeout(correlation_id, attempt);
        Ok(())
    }

    fn arm_timeout(self: &Arc<Self>, correlation_id: CorrelationId, attempt: u32) {
        let weak = Arc::downgrade(self);
        let timeout = self.config.ack_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.on_timeout(correlation_id, attempt);
            }
        });
    }

    fn on_timeout(self: &Arc<Self>, correlation_id: CorrelationId, attempt: u32) {
        let expired = {
            let mut state = lock(&self.state);
            match state.pending.get(&correlation_id) {
                // Superseded by a later transmission or already resolved
                Some(pending) if pending.attempts == attempt => {}
                _ => return,
            }
            if attempt <= self.config.max_retries {
                None
            } else {
                state.remove(correlation_id)
            }
        };

        match expired {
            Some(pending) => {
                tracing::error!(
                    correlation_id = %correlation_id.short(),
                    kind = %pending.command.kind(),
                    target = %pending.target_id,
                    attempts = attempt,
                    "Command not acknowledged, giving up"
                );
                pending.resolve(Err(CommandError::TimedOut {
                    correlation_id,
                    attempts: attempt,
                }));
            }
            None => {
                tracing::warn!(
                    correlation_id = %correlation_id.short(),
                    attempt,
                    max_retries = self.config.max_retries,
                    "Acknowledgement timed out, retrying"
                );
                self.dispatch(correlation_id);
            }
        }
    }

    fn on_acknowledgement(&self, ack: Acknowledgement) {
        let Some(pending) = lock(&self.state).remove(ack.correlation_id) else {
            tracing::debug!(
                correlation_id = %ack.correlation_id,
                "Acknowledgement for unknown command - it may have timed out"
            );
            return;
        };

        let outcome = if ack.is_ok() {
            tracing::debug!(correlation_id = %ack.correlation_id.short(), attempts = pending.attempts, "Command acknowledged");
            Ok(())
        } else {
            let message = ack.message.unwrap_or_else(|| "no reason given".to_string());
            tracing::warn!(correlation_id = %ack.correlation_id.short(), reason = %message, "Command rejected");
            Err(CommandError::Rejected {
                correlation_id: ack.correlation_id,
                message,
            })
        };
        pending.resolve(outcome);
    }
}

impl DispatchState {
    fn remove(&mut self, correlation_id: CorrelationId) -> Option<PendingCommand> {
        let pending = self.pending.remove(&correlation_id)?;
        let key = pending.key();
        if self.by_target.get(&key) == Some(&correlation_id) {
            self.by_target.remove(&key);
        }
        self.queue.retain(|queued| *queued != correlation_id);
        Some(pending)
    }
}
