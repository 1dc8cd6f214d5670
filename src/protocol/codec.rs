//! Protocol codec
//!
//! Encoding and decoding functions for bridge frames.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, SwitchboardError};
use crate::message::Message;

use super::{Frame, FrameKind};

/// Header size: 1 byte kind + 4 bytes length + 4 bytes CRC
pub const HEADER_SIZE: usize = 9;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Frame Encoding/Decoding
// =============================================================================

/// Encode a frame to bytes
pub fn encode_frame(frame: &Frame) -> Result<Bytes> {
    let payload = match frame {
        Frame::Hello { version, options } => bincode::serialize(&(version, options))?,
        Frame::Welcome { version } => bincode::serialize(version)?,
        Frame::Command(message) | Frame::Response(message) | Frame::Event(message) => {
            bincode::serialize(message)?
        }
        Frame::Failure(reason) => bincode::serialize(reason)?,
    };

    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(SwitchboardError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_u8(frame.kind() as u8);
    buf.put_u32(payload.len() as u32);
    buf.put_u32(crc32fast::hash(&payload));
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Decode a frame from bytes
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    if bytes.len() < HEADER_SIZE {
        return Err(SwitchboardError::Protocol(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let (kind, payload_len, crc) = parse_header(&bytes[..HEADER_SIZE])?;

    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(SwitchboardError::Protocol(format!(
            "Incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    decode_payload(kind, crc, &bytes[HEADER_SIZE..total_len])
}

/// Validate a header, returning kind, payload length and CRC
fn parse_header(header: &[u8]) -> Result<(FrameKind, usize, u32)> {
    let kind = FrameKind::from_byte(header[0]).ok_or_else(|| {
        SwitchboardError::Protocol(format!("Unknown frame kind: 0x{:02x}", header[0]))
    })?;
    let payload_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    let crc = u32::from_be_bytes([header[5], header[6], header[7], header[8]]);

    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(SwitchboardError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    Ok((kind, payload_len as usize, crc))
}

fn decode_payload(kind: FrameKind, crc: u32, payload: &[u8]) -> Result<Frame> {
    let actual = crc32fast::hash(payload);
    if actual != crc {
        return Err(SwitchboardError::Protocol(format!(
            "Checksum mismatch: header 0x{:08x}, payload 0x{:08x}",
            crc, actual
        )));
    }

    let frame = match kind {
        FrameKind::Hello => {
            let (version, options): (u32, String) = bincode::deserialize(payload)?;
            Frame::Hello { version, options }
        }
        FrameKind::Welcome => Frame::Welcome {
            version: bincode::deserialize(payload)?,
        },
        FrameKind::Command => Frame::Command(decode_message(payload)?),
        FrameKind::Response => Frame::Response(decode_message(payload)?),
        FrameKind::Event => Frame::Event(decode_message(payload)?),
        FrameKind::Failure => Frame::Failure(bincode::deserialize(payload)?),
    };
    Ok(frame)
}

fn decode_message(payload: &[u8]) -> Result<Message> {
    Ok(bincode::deserialize(payload)?)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete frame from a stream
///
/// Blocks until a complete frame is received or an error occurs
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let (kind, payload_len, crc) = parse_header(&header)?;

    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        reader.read_exact(&mut payload)?;
    }

    decode_payload(kind, crc, &payload)
}

/// Write a frame to a stream
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
    let bytes = encode_frame(frame)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
