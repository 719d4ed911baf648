pub mod lz4;

pub use lz4::Lz4RecordCodec;

use crate::types::Result;

/// Result of one compress call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressOutcome {
    /// Uncompressed input bytes digested.
    pub bytes_in: usize,
    /// Compressed bytes appended to the output.
    pub bytes_out: usize,
    /// Whole records contained in the digested prefix.
    pub records: u64,
}

/// The worker's pluggable compression seam.
///
/// The worker hands each codec a contiguous run of committed staging bytes;
/// the codec digests some whole-record prefix of it and appends the
/// compressed representation to `out`. Runs always start and end on record
/// boundaries because producers commit one record at a time.
pub trait RecordCodec: Send {
    /// Digests a whole-record prefix of `input`, appending at most `max_out`
    /// bytes to `out`.
    ///
    /// Must digest at least one record whenever a single record's worst-case
    /// encoding fits in `max_out`; returns a zeroed outcome when nothing
    /// fits.
    fn compress(
        &mut self,
        source_id: u32,
        input: &[u8],
        out: &mut Vec<u8>,
        max_out: usize,
    ) -> CompressOutcome;

    /// Reverses [`compress`](Self::compress): expands one extent payload
    /// back into the raw record stream.
    fn decompress(&self, input: &[u8], out: &mut Vec<u8>) -> Result<()>;
}
