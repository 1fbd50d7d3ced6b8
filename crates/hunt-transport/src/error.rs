use std::net::SocketAddr;

/// Socket-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("listener failed: {0}")]
    Bind(#[source] std::io::Error),

    #[error("websocket handshake with {0} failed: {1}")]
    Handshake(SocketAddr, #[source] std::io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    /// Sending after [`Outbound::close`](crate::Outbound::close).
    #[error("connection already closed")]
    Closed,
}
