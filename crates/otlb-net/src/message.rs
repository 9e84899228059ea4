//! Wire framing.
//!
//! Every message on a bridge stream is one frame:
//!
//! ```text
//! [checksum: 4 bytes LE][size: 4 bytes LE][service_id: u16 LE][method_id: u16 LE][body]
//! ```
//!
//! The checksum is CRC32C over the envelope + body with the bridge magic
//! number in the low byte, so a stray peer speaking something else is
//! rejected on the first frame.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::NetError;

/// Size of the frame header in bytes.
pub const MESSAGE_HEADER_SIZE: usize = 8;

/// Magic number identifying a bridge frame (occupies the low byte of
/// `checksum`).
pub const FRAME_MAGIC_NUM: u8 = 0x9D;

/// Maximum allowed frame payload (64 MiB); a metric batch never comes close.
pub const MESSAGE_MAX_SIZE: usize = 64 * 1024 * 1024;

/// Size of the `[service_id][method_id]` envelope at the head of a payload.
pub const FRAME_ENVELOPE_SIZE: usize = 4;

/// OpenTelemetry export service: collectors pushing raw
/// `ExportMetricsServiceRequest` frames.
pub const SERVICE_OTEL: u16 = 1;
/// Proprietary agent service: `MessageFromAgent` / `MessageToAgent` frames.
pub const SERVICE_AGENT: u16 = 2;

/// `SERVICE_OTEL` methods.
pub const METHOD_EXPORT: u16 = 1;
pub const METHOD_EXPORT_ACK: u16 = 2;
/// The single `SERVICE_AGENT` method; direction disambiguates the message.
pub const METHOD_AGENT_MESSAGE: u16 = 1;

/// Wire header prepended to every frame: 4-byte checksum followed by
/// 4-byte payload size, both little-endian.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub checksum: u32,
    pub size: u32,
}

impl MessageHeader {
    /// Create a header for the given payload, embedding the magic number in
    /// the checksum low byte.
    pub fn for_payload(payload: &[u8]) -> Self {
        Self {
            checksum: calc_frame_checksum(payload),
            size: payload.len() as u32,
        }
    }

    /// Returns `true` if the checksum low byte carries the bridge magic.
    pub fn is_bridge_frame(&self) -> bool {
        (self.checksum & 0xFF) == FRAME_MAGIC_NUM as u32
    }

    pub fn from_bytes(data: &[u8; MESSAGE_HEADER_SIZE]) -> Self {
        let checksum = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        Self { checksum, size }
    }

    pub fn to_bytes(&self) -> [u8; MESSAGE_HEADER_SIZE] {
        let mut buf = [0u8; MESSAGE_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.checksum.to_le_bytes());
        buf[4..8].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    /// Validate the magic byte, the size bound and the payload checksum.
    pub fn validate(&self, payload: &[u8]) -> Result<(), NetError> {
        if !self.is_bridge_frame() {
            return Err(NetError::InvalidMagic((self.checksum & 0xFF) as u8));
        }

        let size = self.size as usize;
        if size > MESSAGE_MAX_SIZE {
            return Err(NetError::MessageTooLarge {
                size,
                max: MESSAGE_MAX_SIZE,
            });
        }

        let expected = calc_frame_checksum(payload);
        if self.checksum != expected {
            return Err(NetError::ChecksumMismatch {
                expected,
                actual: self.checksum,
            });
        }

        Ok(())
    }
}

/// CRC32C over the payload with the magic number replacing the low byte.
pub fn calc_frame_checksum(data: &[u8]) -> u32 {
    let crc = crc32c::crc32c(data);
    (crc & !0xFF) | (FRAME_MAGIC_NUM as u32)
}

/// One decoded frame: the routing envelope plus the protobuf body.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub service_id: u16,
    pub method_id: u16,
    pub body: Bytes,
}

impl Frame {
    pub fn new(service_id: u16, method_id: u16, body: Bytes) -> Self {
        Self {
            service_id,
            method_id,
            body,
        }
    }

    /// Frame a protobuf message under the given envelope.
    pub fn with_message(service_id: u16, method_id: u16, message: &impl prost::Message) -> Self {
        Self::new(service_id, method_id, Bytes::from(message.encode_to_vec()))
    }

    /// Serialize into a complete wire frame, header included.
    pub fn encode(&self) -> Bytes {
        let payload_len = FRAME_ENVELOPE_SIZE + self.body.len();
        let mut payload = BytesMut::with_capacity(payload_len);
        payload.put_u16_le(self.service_id);
        payload.put_u16_le(self.method_id);
        payload.extend_from_slice(&self.body);

        let header = MessageHeader::for_payload(&payload);
        let mut wire = BytesMut::with_capacity(MESSAGE_HEADER_SIZE + payload_len);
        wire.extend_from_slice(&header.to_bytes());
        wire.extend_from_slice(&payload);
        wire.freeze()
    }

    /// Parse and validate a complete wire frame.
    pub fn decode(data: &[u8]) -> Result<Self, NetError> {
        if data.len() < MESSAGE_HEADER_SIZE {
            return Err(NetError::IncompleteFrame {
                need: MESSAGE_HEADER_SIZE,
                have: data.len(),
            });
        }

        let header_bytes: [u8; MESSAGE_HEADER_SIZE] = data[..MESSAGE_HEADER_SIZE]
            .try_into()
            .expect("slice length verified above");
        let header = MessageHeader::from_bytes(&header_bytes);

        let declared = header.size as usize;
        let payload = &data[MESSAGE_HEADER_SIZE..];
        if payload.len() < declared {
            return Err(NetError::IncompleteFrame {
                need: MESSAGE_HEADER_SIZE + declared,
                have: data.len(),
            });
        }
        let payload = &payload[..declared];
        header.validate(payload)?;

        if payload.len() < FRAME_ENVELOPE_SIZE {
            return Err(NetError::IncompleteFrame {
                need: FRAME_ENVELOPE_SIZE,
                have: payload.len(),
            });
        }
        let service_id = u16::from_le_bytes([payload[0], payload[1]]);
        let method_id = u16::from_le_bytes([payload[2], payload[3]]);
        let body = Bytes::copy_from_slice(&payload[FRAME_ENVELOPE_SIZE..]);

        Ok(Self::new(service_id, method_id, body))
    }
}
