use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlashlogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record of {nbytes} bytes cannot fit a staging buffer of {capacity} bytes")]
    RecordTooLarge { nbytes: usize, capacity: usize },
    #[error("invalid format: {0}")]
    InvalidFormat(&'static str),
    #[error("checksum mismatch (expected {expected:#010x}, actual {actual:#010x})")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("decompression error: {0}")]
    DecompressionError(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
