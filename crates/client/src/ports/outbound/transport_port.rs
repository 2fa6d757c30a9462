//! Live transport port
//!
//! A [`Connector`] opens a fresh [`Transport`] per connection attempt. The
//! connection manager owns the transport exclusively for the lifetime of one
//! session and drops it when the session ends.
//!
//! `recv` must be cancel-safe: the manager polls it inside `tokio::select!`
//! alongside outbound traffic and shutdown.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("failed to send: {0}")]
    Send(String),

    #[error("failed to receive: {0}")]
    Receive(String),

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("connection closed")]
    Closed,

    #[error("not connected")]
    NotConnected,
}

/// One established, bidirectional text-frame connection.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound text frame. `None` means the peer closed cleanly.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Factory for transports; called once per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError>;

    /// Human-readable endpoint for logs
    fn endpoint(&self) -> String;
}
