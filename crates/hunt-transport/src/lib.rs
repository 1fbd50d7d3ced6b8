//! Transport layer for the Vampire Hunt server.
//!
//! The game core never touches sockets. What it needs from below is a
//! [`ConnectionId`] per client and a way to move whole frames. A
//! [`Listener`] hands out [`Connection`]s; each connection splits into an
//! [`Inbound`] half for the reading task and an [`Outbound`] half for the
//! writing task, so neither ever waits on the other.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket listener via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WsConnection, WsInbound, WsListener, WsOutbound};

use std::fmt;
use std::net::SocketAddr;

/// Identity of one live client connection.
///
/// Handed out by the listener in accept order and never reused within a
/// process. The room registry indexes participants by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Source of new client connections.
pub trait Listener: Send + 'static {
    type Conn: Connection;

    /// Waits for the next client and completes its handshake.
    async fn accept(&mut self) -> Result<Self::Conn, TransportError>;

    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// An accepted client, not yet split.
pub trait Connection: Send + 'static {
    type Inbound: Inbound;
    type Outbound: Outbound;

    fn id(&self) -> ConnectionId;

    /// Peer address, for logs.
    fn peer_addr(&self) -> SocketAddr;

    fn split(self) -> (Self::Inbound, Self::Outbound);
}

/// Reading half of a connection.
pub trait Inbound: Send + 'static {
    /// Next whole frame from the client, or `Ok(None)` once the client has
    /// closed. Control frames never surface here.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Writing half of a connection.
pub trait Outbound: Send + 'static {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Says goodbye to the client. Idempotent.
    async fn close(&mut self) -> Result<(), TransportError>;
}
