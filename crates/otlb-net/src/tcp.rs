//! TCP implementations of the transport traits.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::error::NetError;
use crate::message::{MessageHeader, MESSAGE_HEADER_SIZE, MESSAGE_MAX_SIZE};
use crate::socket::{Connector, Listener, Socket};

/// A connected TCP stream speaking the bridge framing.
///
/// Reads are length-delimited: the 8-byte header is read first, then
/// exactly `size` payload bytes, and the whole frame is handed up in one
/// buffer. Read and write halves carry independent locks so a blocked
/// reader never stalls writes.
pub struct TcpSocket {
    peer: SocketAddr,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

impl TcpSocket {
    pub fn new(stream: TcpStream) -> Result<Self, NetError> {
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            peer,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        })
    }
}

#[async_trait]
impl Socket for TcpSocket {
    async fn send(&self, data: Bytes) -> Result<(), NetError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Bytes, NetError> {
        let mut reader = self.reader.lock().await;

        let mut header_bytes = [0u8; MESSAGE_HEADER_SIZE];
        if let Err(e) = reader.read_exact(&mut header_bytes).await {
            return match e.kind() {
                std::io::ErrorKind::UnexpectedEof => Err(NetError::ConnectionClosed),
                _ => Err(e.into()),
            };
        }
        let header = MessageHeader::from_bytes(&header_bytes);

        let size = header.size as usize;
        if size > MESSAGE_MAX_SIZE {
            return Err(NetError::MessageTooLarge {
                size,
                max: MESSAGE_MAX_SIZE,
            });
        }

        let mut frame = BytesMut::with_capacity(MESSAGE_HEADER_SIZE + size);
        frame.extend_from_slice(&header_bytes);
        frame.resize(MESSAGE_HEADER_SIZE + size, 0);
        reader.read_exact(&mut frame[MESSAGE_HEADER_SIZE..]).await?;

        Ok(frame.freeze())
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// TCP listener yielding framed sockets.
pub struct TcpAcceptor {
    listener: TcpListener,
    local: SocketAddr,
}

impl TcpAcceptor {
    pub async fn bind(addr: SocketAddr) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        Ok(Self { listener, local })
    }
}

#[async_trait]
impl Listener for TcpAcceptor {
    async fn accept(&self) -> Result<Arc<dyn Socket>, NetError> {
        let (stream, _) = self.listener.accept().await?;
        Ok(Arc::new(TcpSocket::new(stream)?))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

/// Plain TCP dialer.
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: SocketAddr) -> Result<Arc<dyn Socket>, NetError> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                NetError::ConnectionRefused
            } else {
                NetError::Io(e)
            }
        })?;
        Ok(Arc::new(TcpSocket::new(stream)?))
    }
}
