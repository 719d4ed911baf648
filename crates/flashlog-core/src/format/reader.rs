use crate::compression::RecordCodec;
use crate::error::FlashlogError;
use crate::types::{DecodedRecord, Result};

use super::{
    ExtentHeader, RecordHeader, EXTENT_HEADER_SIZE, EXTENT_MAGIC, OUTPUT_BLOCK_ALIGNMENT,
    RECORD_HEADER_SIZE,
};

/// Sequential reader over a compressed log file.
///
/// The file is a sequence of extents packed into 512-byte-aligned blocks;
/// zero padding fills the gap between the last extent of a block and the
/// next block boundary. Extents from different buffers are yielded in file
/// order, which preserves per-buffer commit order but defines no ordering
/// across buffers.
pub struct LogFileReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> LogFileReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the next extent header and its compressed payload, or `None`
    /// at end of file.
    pub fn next_extent(&mut self) -> Result<Option<(ExtentHeader, &'a [u8])>> {
        loop {
            if self.pos >= self.data.len() {
                return Ok(None);
            }
            let remaining = &self.data[self.pos..];
            if remaining.len() >= EXTENT_HEADER_SIZE && remaining[..4] == EXTENT_MAGIC {
                let header_bytes: [u8; EXTENT_HEADER_SIZE] = remaining[..EXTENT_HEADER_SIZE]
                    .try_into()
                    .expect("slice length checked above");
                let header = ExtentHeader::from_bytes(header_bytes)?;

                let start = self.pos + EXTENT_HEADER_SIZE;
                let end = start + header.payload_len as usize;
                if end > self.data.len() {
                    return Err(FlashlogError::InvalidFormat("extent payload overruns file"));
                }
                let payload = &self.data[start..end];
                let actual = crc32fast::hash(payload);
                if actual != header.crc32 {
                    return Err(FlashlogError::ChecksumMismatch {
                        expected: header.crc32,
                        actual,
                    });
                }
                self.pos = end;
                return Ok(Some((header, payload)));
            }

            // Padding runs to the next block boundary and must be all zero.
            let boundary = (self.pos + 1)
                .next_multiple_of(OUTPUT_BLOCK_ALIGNMENT)
                .min(self.data.len());
            if self.data[self.pos..boundary].iter().any(|&byte| byte != 0) {
                return Err(FlashlogError::InvalidFormat("garbage between extents"));
            }
            self.pos = boundary;
        }
    }

    /// Decompresses every extent and splits the streams back into records.
    ///
    /// Stops early once `limit` records have been produced.
    pub fn decode(
        &mut self,
        codec: &dyn RecordCodec,
        limit: Option<usize>,
    ) -> Result<Vec<DecodedRecord>> {
        let mut records = Vec::new();
        let mut raw = Vec::new();
        while let Some((extent, payload)) = self.next_extent()? {
            raw.clear();
            codec.decompress(payload, &mut raw)?;

            let mut pos = 0;
            while pos < raw.len() {
                let Some(header) = RecordHeader::parse(&raw[pos..]) else {
                    return Err(FlashlogError::InvalidFormat("truncated record header"));
                };
                let body_start = pos + RECORD_HEADER_SIZE;
                let body_end = body_start + header.payload_len as usize;
                if body_end > raw.len() {
                    return Err(FlashlogError::InvalidFormat(
                        "record payload overruns extent",
                    ));
                }
                records.push(DecodedRecord {
                    buffer_id: extent.buffer_id,
                    log_id: header.log_id,
                    timestamp: header.timestamp,
                    payload: raw[body_start..body_end].to_vec(),
                });
                if limit.is_some_and(|limit| records.len() >= limit) {
                    return Ok(records);
                }
                pos = body_end;
            }
        }
        Ok(records)
    }
}
