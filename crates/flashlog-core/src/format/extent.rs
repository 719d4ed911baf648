use crate::error::FlashlogError;
use crate::types::Result;

use super::{EXTENT_HEADER_SIZE, EXTENT_MAGIC, RECORD_HEADER_SIZE};

/// Header of one extent: a contiguous compressed run drained from a single
/// staging buffer.
///
/// Extents are packed back to back inside a flushed block; the zero padding
/// that rounds a block up to the alignment can never start with the magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentHeader {
    /// Id of the staging buffer the run came from.
    pub buffer_id: u32,
    /// Length in bytes of the compressed payload following this header.
    pub payload_len: u32,
    /// CRC32 of the compressed payload.
    pub crc32: u32,
}

impl ExtentHeader {
    pub fn to_bytes(&self) -> [u8; EXTENT_HEADER_SIZE] {
        let mut bytes = [0u8; EXTENT_HEADER_SIZE];
        bytes[..4].copy_from_slice(&EXTENT_MAGIC);
        bytes[4..8].copy_from_slice(&self.buffer_id.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.crc32.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: [u8; EXTENT_HEADER_SIZE]) -> Result<Self> {
        if bytes[..4] != EXTENT_MAGIC {
            return Err(FlashlogError::InvalidFormat("invalid extent magic"));
        }
        Ok(Self {
            buffer_id: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            payload_len: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            crc32: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        })
    }
}

/// Header framing one log record inside the uncompressed staging stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Call-site id, resolved through the metadata table by the decoder.
    pub log_id: u32,
    /// Length in bytes of the record payload.
    pub payload_len: u32,
    /// Raw cycle-counter reading taken at commit time.
    pub timestamp: u64,
}

impl RecordHeader {
    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut bytes = [0u8; RECORD_HEADER_SIZE];
        bytes[..4].copy_from_slice(&self.log_id.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.payload_len.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: [u8; RECORD_HEADER_SIZE]) -> Self {
        Self {
            log_id: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            payload_len: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            timestamp: u64::from_le_bytes([
                bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14],
                bytes[15],
            ]),
        }
    }

    /// Parses a header from the front of `bytes`, or `None` when fewer than
    /// [`RECORD_HEADER_SIZE`] bytes remain.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let header: [u8; RECORD_HEADER_SIZE] = bytes.get(..RECORD_HEADER_SIZE)?.try_into().ok()?;
        Some(Self::from_bytes(header))
    }
}
