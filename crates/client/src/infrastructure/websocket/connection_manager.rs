//! Connection manager: owns the live transport and its state machine.
//!
//! ```text
//! Disconnected --connect()--> Connecting --ok--> Connected
//!      ^                          |                  |
//!      |                        error              drop
//!      |                          v                  v
//!      +----disconnect()---- Reconnecting <----------+
//!                                 |
//!                        attempts exhausted
//!                                 v
//!                              Failed
//! ```
//!
//! Every transition is published as `LiveEvent::ConnectionStateChanged` on the
//! subscription registry. Inbound frames are decoded one at a time; a frame
//! that fails to decode is logged and skipped without affecting the session.

use std::sync::atomic::AtomicU8;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use scenesync_domain::RoomId;
use scenesync_shared::{
    decode_server_message, Acknowledgement, ClientMessage, ConnectionState, LiveEvent,
    ServerMessage,
};

use crate::infrastructure::messaging::connection::{
    load_connection_state, swap_connection_state,
};
use crate::infrastructure::messaging::{lock, ConnectionStateObserver, SubscriptionRegistry};
use crate::ports::outbound::{Connector, Transport, TransportError};

use super::core::{BackoffState, ReconnectConfig};

/// Receives every decoded acknowledgement.
pub type AcknowledgementCallback = Arc<dyn Fn(Acknowledgement) + Send + Sync>;

#[derive(Default)]
struct Lifecycle {
    shutdown: Option<CancellationToken>,
    driver: Option<JoinHandle<()>>,
}

struct ManagerInner {
    connector: Arc<dyn Connector>,
    registry: SubscriptionRegistry<LiveEvent>,
    config: ReconnectConfig,
    state: Arc<AtomicU8>,
    lifecycle: Mutex<Lifecycle>,
    /// Present only while a session is established
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    room_interest: Mutex<Option<RoomId>>,
    on_ack: Mutex<Option<AcknowledgementCallback>>,
}

enum SessionEnd {
    Shutdown,
    Dropped(TransportError),
}

/// Handle to the live connection. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        registry: SubscriptionRegistry<LiveEvent>,
        config: ReconnectConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                connector,
                registry,
                config,
                state: Arc::new(AtomicU8::new(ConnectionState::Disconnected.to_u8())),
                lifecycle: Mutex::new(Lifecycle::default()),
                outbound: Mutex::new(None),
                room_interest: Mutex::new(None),
                on_ack: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        load_connection_state(&self.inner.state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn observer(&self) -> ConnectionStateObserver {
        ConnectionStateObserver::new(Arc::clone(&self.inner.state))
    }

    pub fn registry(&self) -> &SubscriptionRegistry<LiveEvent> {
        &self.inner.registry
    }

    /// Route acknowledgements to `callback` (replacing any previous one).
    pub fn set_on_acknowledgement<F>(&self, callback: F)
    where
        F: Fn(Acknowledgement) + Send + Sync + 'static,
    {
        *lock(&self.inner.on_ack) = Some(Arc::new(callback));
    }

    pub fn clear_on_acknowledgement(&self) {
        *lock(&self.inner.on_ack) = None;
    }

    /// Start connecting. A no-op unless `Disconnected` or `Failed`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut lifecycle = lock(&self.inner.lifecycle);
        let current = self.state();
        if !matches!(current, ConnectionState::Disconnected | ConnectionState::Failed) {
            tracing::debug!(state = %current, "connect() ignored, connection already active");
            return;
        }
        if let Some(previous) = lifecycle.driver.take() {
            previous.abort();
        }

        // The driver announces `Connecting` itself so notifications stay ordered
        swap_connection_state(&self.inner.state, ConnectionState::Connecting);

        let shutdown = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        lifecycle.driver = Some(tokio::spawn(drive(inner, shutdown.clone())));
        lifecycle.shutdown = Some(shutdown);
    }

    /// Close the connection and stop reconnecting. Resolves once the driver
    /// has finished and the state is `Disconnected`.
    pub async fn disconnect(&self) {
        let (shutdown, driver) = {
            let mut lifecycle = lock(&self.inner.lifecycle);
            (lifecycle.shutdown.take(), lifecycle.driver.take())
        };
        if let Some(shutdown) = shutdown {
            shutdown.cancel();
        }
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                tracing::warn!(error = %e, "Connection driver ended abnormally");
            }
        }
        // A driver that had already failed leaves `Failed` behind
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Queue a message on the live session.
    ///
    /// Fails with [`TransportError::NotConnected`] when no session is
    /// established; nothing is buffered here.
    pub fn transmit(&self, message: &ClientMessage) -> Result<(), TransportError> {
        let text =
            serde_json::to_string(message).map_err(|e| TransportError::Encode(e.to_string()))?;
        let sender = lock(&self.inner.outbound).clone();
        match sender {
            Some(sender) => sender.send(text).map_err(|_| TransportError::NotConnected),
            None => Err(TransportError::NotConnected),
        }
    }

    /// Room the server should stream. Re-sent on every (re)connect.
    pub fn room_interest(&self) -> Option<RoomId> {
        lock(&self.inner.room_interest).clone()
    }

    /// Change the streamed room, telling a live server immediately.
    pub fn set_room_interest(&self, room: Option<RoomId>) {
        let mut interest = lock(&self.inner.room_interest);
        if *interest == room {
            return;
        }
        let previous = std::mem::replace(&mut *interest, room.clone());

        // Same lock order as session setup: interest, then outbound
        let outbound = lock(&self.inner.outbound);
        let Some(sender) = outbound.as_ref() else {
            return;
        };
        let messages = previous
            .map(ClientMessage::unsubscribe)
            .into_iter()
            .chain(room.map(ClientMessage::subscribe));
        for message in messages {
            match serde_json::to_string(&message) {
                Ok(text) => {
                    if sender.send(text).is_err() {
                        tracing::debug!("Session closed while updating room interest");
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to encode room request"),
            }
        }
    }
}

impl ManagerInner {
    /// Store and announce a state change. No-op if unchanged.
    fn set_state(&self, new_state: ConnectionState) {
        let previous = swap_connection_state(&self.state, new_state);
        if previous != new_state {
            self.announce(new_state);
        }
    }

    fn announce(&self, state: ConnectionState) {
        tracing::info!(state = %state, "Connection state changed");
        let room_id = lock(&self.room_interest).clone();
        self.registry
            .publish(&LiveEvent::ConnectionStateChanged { room_id, state });
    }

    fn route_inbound(&self, text: &str) {
        match decode_server_message(text) {
            Ok(ServerMessage::Event(event)) => {
                tracing::debug!(kind = event.kind(), room = ?event.room_id(), "Live event received");
                self.registry.publish(&event);
            }
            Ok(ServerMessage::Ack(ack)) => {
                let callback = lock(&self.on_ack).clone();
                match callback {
                    Some(callback) => callback(ack),
                    None => tracing::debug!(
                        correlation_id = %ack.correlation_id,
                        "Acknowledgement received with no dispatcher attached"
                    ),
                }
            }
            Ok(ServerMessage::Unhandled { event, room_id }) => {
                tracing::warn!(event = %event, room = ?room_id, "Unhandled server event");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable server message");
            }
        }
    }
}

async fn drive(inner: Arc<ManagerInner>, shutdown: CancellationToken) {
    inner.announce(ConnectionState::Connecting);
    let mut backoff = BackoffState::new(inner.config.clone());

    loop {
        let connected = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            result = inner.connector.connect() => result,
        };

        match connected {
            Ok(transport) => {
                backoff.reset();
                match run_session(&inner, transport, &shutdown).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Dropped(reason) => {
                        tracing::warn!(error = %reason, "Connection lost");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    endpoint = %inner.connector.endpoint(),
                    attempt = backoff.attempts(),
                    error = %e,
                    "Connection attempt failed"
                );
            }
        }

        inner.set_state(ConnectionState::Reconnecting);
        let Some(delay) = backoff.next_delay_and_advance() else {
            tracing::error!("Max reconnection attempts reached, giving up");
            inner.set_state(ConnectionState::Failed);
            return;
        };
        tracing::info!(
            attempt = backoff.attempts(),
            max_attempts = backoff.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            "Reconnecting"
        );

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        inner.set_state(ConnectionState::Connecting);
    }

    inner.set_state(ConnectionState::Disconnected);
}

async fn run_session(
    inner: &Arc<ManagerInner>,
    mut transport: Box<dyn Transport>,
    shutdown: &CancellationToken,
) -> SessionEnd {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    {
        // Room subscription goes out before anything queued by `Connected` subscribers
        let interest = lock(&inner.room_interest);
        let mut outbound = lock(&inner.outbound);
        if let Some(room) = interest.as_ref() {
            match serde_json::to_string(&ClientMessage::subscribe(room.clone())) {
                Ok(text) => {
                    let _ = tx.send(text);
                }
                Err(e) => tracing::error!(error = %e, "Failed to encode room request"),
            }
        }
        *outbound = Some(tx);
    }
    inner.set_state(ConnectionState::Connected);

    let end = loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                if let Err(e) = transport.close().await {
                    tracing::debug!(error = %e, "Error closing transport");
                }
                break SessionEnd::Shutdown;
            }
            Some(text) = rx.recv() => {
                if let Err(e) = transport.send(text).await {
                    break SessionEnd::Dropped(e);
                }
            }
            incoming = transport.recv() => match incoming {
                Some(Ok(text)) => inner.route_inbound(&text),
                Some(Err(e)) => break SessionEnd::Dropped(e),
                None => break SessionEnd::Dropped(TransportError::Closed),
            },
        }
    };

    *lock(&inner.outbound) = None;
    end
}
