use crate::error::FlashlogError;

pub type Result<T> = std::result::Result<T, FlashlogError>;

/// One log record reconstructed by the offline reader.
///
/// Records are yielded in per-buffer commit order; no ordering is defined
/// across buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub buffer_id: u32,
    pub log_id: u32,
    pub timestamp: u64,
    pub payload: Vec<u8>,
}
