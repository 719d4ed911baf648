pub mod extent;
pub mod metadata;
pub mod reader;

pub use extent::{ExtentHeader, RecordHeader};
pub use metadata::{LogMetadata, MetadataTable};
pub use reader::LogFileReader;

/// Magic bytes opening every extent.
pub const EXTENT_MAGIC: [u8; 4] = *b"FXT1";
/// Fixed size of an extent header in bytes.
pub const EXTENT_HEADER_SIZE: usize = 16;
/// Fixed size of a record header in bytes.
pub const RECORD_HEADER_SIZE: usize = 16;
/// Every asynchronous write is zero-padded to this block size.
pub const OUTPUT_BLOCK_ALIGNMENT: usize = 512;
