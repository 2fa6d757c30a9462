//! Bridge between the host and an embedded game runtime.
//!
//! Host-to-runtime messages posted before the runtime reports `READY` are
//! buffered (bounded; the oldest is dropped first) and flushed in order once
//! it does. Runtime-to-host messages are fanned out to registered handlers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use scenesync_shared::bridge::MSG_READY;
use scenesync_shared::BridgeEnvelope;

use crate::infrastructure::messaging::{lock, SubscriptionHandle, SubscriptionRegistry};
use crate::ports::outbound::{BridgeError, RuntimeChannel};

pub const DEFAULT_BUFFER_LIMIT: usize = 64;

/// [`RuntimeChannel`] over an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelRuntime {
    tx: mpsc::UnboundedSender<BridgeEnvelope>,
}

impl ChannelRuntime {
    /// The channel plus the receiving end the runtime reads from.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BridgeEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RuntimeChannel for ChannelRuntime {
    fn deliver(&self, envelope: BridgeEnvelope) -> Result<(), BridgeError> {
        self.tx.send(envelope).map_err(|_| BridgeError::ChannelClosed)
    }
}

#[derive(Default)]
struct BridgeState {
    ready: bool,
    buffer: VecDeque<BridgeEnvelope>,
}

struct BridgeInner {
    channel: Arc<dyn RuntimeChannel>,
    handlers: SubscriptionRegistry<BridgeEnvelope>,
    state: Mutex<BridgeState>,
    buffer_limit: usize,
}

#[derive(Clone)]
pub struct GameBridge {
    inner: Arc<BridgeInner>,
}

impl GameBridge {
    pub fn new(channel: Arc<dyn RuntimeChannel>, buffer_limit: usize) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                channel,
                handlers: SubscriptionRegistry::new(),
                state: Mutex::new(BridgeState::default()),
                buffer_limit: buffer_limit.max(1),
            }),
        }
    }

    pub fn is_ready(&self) -> bool {
        lock(&self.inner.state).ready
    }

    pub fn buffered_count(&self) -> usize {
        lock(&self.inner.state).buffer.len()
    }

    /// Send to the runtime, or buffer until it is ready.
    pub fn post(&self, envelope: BridgeEnvelope) -> Result<(), BridgeError> {
        // Delivery is non-blocking, so holding the lock keeps posts ordered
        // behind an in-progress flush
        let mut state = lock(&self.inner.state);
        if state.ready {
            return self.inner.channel.deliver(envelope);
        }

        if state.buffer.len() >= self.inner.buffer_limit {
            if let Some(dropped) = state.buffer.pop_front() {
                tracing::warn!(
                    dropped = %dropped.kind,
                    limit = self.inner.buffer_limit,
                    "Game runtime not ready, bridge buffer full; dropping oldest message"
                );
            }
        }
        tracing::debug!(kind = %envelope.kind, "Buffering message until game runtime is ready");
        state.buffer.push_back(envelope);
        Ok(())
    }

    /// Register a handler for runtime-to-host messages.
    pub fn on_message<F>(&self, consumer_id: impl Into<String>, handler: F) -> SubscriptionHandle
    where
        F: Fn(&BridgeEnvelope) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.handlers.subscribe(consumer_id, handler)
    }

    pub fn remove_handler(&self, handle: SubscriptionHandle) -> bool {
        self.inner.handlers.unsubscribe(handle)
    }

    /// Handle one message from the runtime.
    pub fn receive(&self, envelope: BridgeEnvelope) {
        if envelope.is(MSG_READY) {
            self.mark_ready();
            return;
        }
        tracing::debug!(kind = %envelope.kind, "Message from game runtime");
        self.inner.handlers.publish(&envelope);
    }

    /// The runtime reloaded: buffer again until the next `READY`.
    pub fn reset(&self) {
        let mut state = lock(&self.inner.state);
        state.ready = false;
        tracing::info!("Game runtime reset, buffering until ready");
    }

    fn mark_ready(&self) {
        let mut state = lock(&self.inner.state);
        let pending = state.buffer.len();
        while let Some(envelope) = state.buffer.pop_front() {
            if let Err(e) = self.inner.channel.deliver(envelope.clone()) {
                tracing::error!(error = %e, "Failed to flush buffered message to game runtime");
                state.buffer.push_front(envelope);
                return;
            }
        }
        state.ready = true;
        tracing::info!(flushed = pending, "Game runtime ready");
    }
}
