use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::NetError;

/// Trait representing an abstract duplex stream.
///
/// Implementations may use TCP, TLS, or in-memory channels for testing.
/// `recv` yields one complete wire frame (header + payload) per call;
/// stream-oriented transports do the length-delimited buffering themselves.
#[async_trait]
pub trait Socket: Send + Sync + 'static {
    /// Send a complete wire frame.
    async fn send(&self, data: Bytes) -> Result<(), NetError>;

    /// Receive the next complete wire frame.
    async fn recv(&self) -> Result<Bytes, NetError>;

    /// Return the remote peer address.
    fn peer_addr(&self) -> SocketAddr;

    /// Close the socket gracefully.
    async fn close(&self);
}

/// Trait for accepting incoming connections.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Accept the next incoming connection.
    async fn accept(&self) -> Result<Arc<dyn Socket>, NetError>;

    /// Return the local address this listener is bound to.
    fn local_addr(&self) -> SocketAddr;
}

/// Trait for dialing a remote address, used by the reversed-connection
/// loop.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, addr: SocketAddr) -> Result<Arc<dyn Socket>, NetError>;
}
