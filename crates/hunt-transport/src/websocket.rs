//! WebSocket listener on top of `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::{Connection, ConnectionId, Inbound, Listener, Outbound, TransportError};

static CONNECTION_IDS: AtomicU64 = AtomicU64::new(1);

type Ws = WebSocketStream<TcpStream>;

/// Accepts TCP clients and upgrades them to WebSocket.
pub struct WsListener {
    tcp: TcpListener,
}

impl WsListener {
    /// Port `0` lets the OS choose; read it back with
    /// [`Listener::local_addr`].
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let tcp = TcpListener::bind(addr).await.map_err(TransportError::Bind)?;
        tracing::info!(addr = ?tcp.local_addr().ok(), "listening for WebSocket clients");
        Ok(Self { tcp })
    }
}

impl Listener for WsListener {
    type Conn = WsConnection;

    async fn accept(&mut self) -> Result<WsConnection, TransportError> {
        let (stream, peer) = self.tcp.accept().await.map_err(TransportError::Bind)?;
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| TransportError::Handshake(peer, ws_io(e)))?;

        let id = ConnectionId::new(CONNECTION_IDS.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(connection = %id, %peer, "websocket upgraded");
        Ok(WsConnection { id, peer, ws })
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.tcp.local_addr()
    }
}

/// An upgraded client socket.
pub struct WsConnection {
    id: ConnectionId,
    peer: SocketAddr,
    ws: Ws,
}

impl Connection for WsConnection {
    type Inbound = WsInbound;
    type Outbound = WsOutbound;

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn split(self) -> (WsInbound, WsOutbound) {
        let (sink, stream) = self.ws.split();
        (
            WsInbound { stream },
            WsOutbound {
                sink,
                closed: false,
            },
        )
    }
}

pub struct WsInbound {
    stream: SplitStream<Ws>,
}

impl Inbound for WsInbound {
    /// Text and binary frames both come through as bytes. Pings are
    /// answered by tungstenite while this is polled.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        while let Some(frame) = self.stream.next().await {
            match frame.map_err(|e| TransportError::Receive(ws_io(e)))? {
                Message::Text(text) => return Ok(Some(text.as_bytes().to_vec())),
                Message::Binary(data) => return Ok(Some(data.to_vec())),
                Message::Close(_) => return Ok(None),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }
}

pub struct WsOutbound {
    sink: SplitSink<Ws, Message>,
    closed: bool,
}

impl Outbound for WsOutbound {
    /// UTF-8 frames go out as text, anything else as binary.
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let msg = match std::str::from_utf8(frame) {
            Ok(text) => Message::text(text.to_owned()),
            Err(_) => Message::binary(frame.to_vec()),
        };
        self.sink
            .send(msg)
            .await
            .map_err(|e| TransportError::Send(ws_io(e)))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Send(ws_io(e)))
    }
}

fn ws_io(e: tungstenite::Error) -> std::io::Error {
    match e {
        tungstenite::Error::Io(io) => io,
        other => std::io::Error::other(other),
    }
}
