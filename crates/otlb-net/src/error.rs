use thiserror::Error;

/// Errors that can occur in the transport layer.
#[derive(Debug, Error)]
pub enum NetError {
    /// The connection was closed by the remote peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection was refused by the remote peer.
    #[error("connection refused")]
    ConnectionRefused,

    /// An I/O error from the underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame checksum did not match the computed CRC32C.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// The received frame does not carry the bridge magic byte.
    #[error("invalid frame: bad magic (checksum low byte: {0:#04x})")]
    InvalidMagic(u8),

    /// The frame size exceeds the maximum allowed.
    #[error("frame too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The frame is shorter than its fixed prefix requires.
    #[error("incomplete frame: need {need} bytes, have {have}")]
    IncompleteFrame { need: usize, have: usize },

    /// The frame payload failed protobuf decoding.
    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The frame names a service id nothing is registered for.
    #[error("unknown service: service_id={0}")]
    UnknownService(u16),

    /// A write was attempted on a session that already shut down.
    #[error("session closed")]
    SessionClosed,

    /// The peer's authentication token expired.
    #[error("token expired")]
    TokenExpired,
}
