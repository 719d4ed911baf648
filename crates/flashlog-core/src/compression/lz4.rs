use lz4_flex::block::{compress_prepend_size, decompress_size_prepended, get_maximum_output_size};

use crate::error::FlashlogError;
use crate::format::{RecordHeader, RECORD_HEADER_SIZE};
use crate::types::Result;

use super::{CompressOutcome, RecordCodec};

/// Default codec: LZ4 block compression over whole-record prefixes.
///
/// The record stream is self-describing (each record carries its length), so
/// the codec only has to pick the largest prefix whose worst-case compressed
/// size fits the output budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4RecordCodec;

/// Worst-case encoded size of `len` input bytes, including the length
/// prefix `compress_prepend_size` emits.
fn max_encoded_len(len: usize) -> usize {
    get_maximum_output_size(len) + 4
}

impl RecordCodec for Lz4RecordCodec {
    fn compress(
        &mut self,
        _source_id: u32,
        input: &[u8],
        out: &mut Vec<u8>,
        max_out: usize,
    ) -> CompressOutcome {
        let mut take = 0usize;
        let mut records = 0u64;
        while let Some(header) = RecordHeader::parse(&input[take..]) {
            let next = take + RECORD_HEADER_SIZE + header.payload_len as usize;
            if next > input.len() || max_encoded_len(next) > max_out {
                break;
            }
            take = next;
            records += 1;
        }
        if take == 0 {
            return CompressOutcome::default();
        }

        let compressed = compress_prepend_size(&input[..take]);
        debug_assert!(compressed.len() <= max_out);
        out.extend_from_slice(&compressed);
        CompressOutcome {
            bytes_in: take,
            bytes_out: compressed.len(),
            records,
        }
    }

    fn decompress(&self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let raw = decompress_size_prepended(input)
            .map_err(|err| FlashlogError::DecompressionError(format!("lz4 decode failed: {err}")))?;
        out.extend_from_slice(&raw);
        Ok(())
    }
}
