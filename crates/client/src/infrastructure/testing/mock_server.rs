//! Scripted in-process stand-in for the scene server.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::infrastructure::messaging::lock;
use crate::ports::outbound::{Connector, Transport, TransportError};

type Inbound = Option<Result<String, TransportError>>;

#[derive(Default)]
struct ServerState {
    accepting: AtomicBool,
    connect_attempts: AtomicU32,
    sent: Mutex<Vec<String>>,
    /// Feed of the most recent session; replaced on every accepted connect
    session: Mutex<Option<mpsc::UnboundedSender<Inbound>>>,
}

/// Records everything the client sends and lets a test push frames, refuse
/// connections and drop the live session.
#[derive(Clone)]
pub struct MockServer {
    state: Arc<ServerState>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    pub fn new() -> Self {
        let state = ServerState::default();
        state.accepting.store(true, Ordering::SeqCst);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            server: self.clone(),
        })
    }

    /// Refuse (`false`) or accept (`true`) subsequent connection attempts.
    pub fn set_accepting(&self, accepting: bool) {
        self.state.accepting.store(accepting, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    /// Deliver a text frame on the live session. Returns false without one.
    pub fn push(&self, text: &str) -> bool {
        self.feed(Some(Ok(text.to_string())))
    }

    pub fn push_json(&self, value: &serde_json::Value) -> bool {
        self.push(&value.to_string())
    }

    /// Fail the live session with a receive error.
    pub fn drop_connection(&self) -> bool {
        let dropped = self.feed(Some(Err(TransportError::Receive("connection reset".into()))));
        *lock(&self.state.session) = None;
        dropped
    }

    pub fn sent(&self) -> Vec<String> {
        lock(&self.state.sent).clone()
    }

    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    /// Sent messages that are commands (carry a correlation id).
    pub fn sent_commands(&self) -> Vec<serde_json::Value> {
        self.sent_json()
            .into_iter()
            .filter(|value| value.get("correlationId").is_some())
            .collect()
    }

    pub fn clear_sent(&self) {
        lock(&self.state.sent).clear();
    }

    fn feed(&self, item: Inbound) -> bool {
        match lock(&self.state.session).as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }
}

pub struct MockConnector {
    server: MockServer,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        let state = &self.server.state;
        state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if !state.accepting.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&state.session) = Some(tx);
        Ok(Box::new(MockTransport {
            incoming: rx,
            server: self.server.clone(),
        }))
    }

    fn endpoint(&self) -> String {
        "mock://scene-server".to_string()
    }
}

pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Inbound>,
    server: MockServer,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        lock(&self.server.state.sent).push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        // A feed replaced or dropped by the server reads as a clean close
        self.incoming.recv().await.flatten()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.incoming.close();
        Ok(())
    }
}
