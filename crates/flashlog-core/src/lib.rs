//! Runtime core of the flashlog low-latency binary logging system.
//!
//! A log call site appends a small binary record to a per-thread staging
//! buffer; a single background worker drains every buffer, compresses the
//! records, and writes 512-byte-aligned blocks to the output file. Text
//! formatting never happens on the producer path: the offline decoder
//! reconstructs readable output from the binary log and a static metadata
//! table describing each call site.

pub mod buffer;
pub mod clock;
pub mod compression;
pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod runtime;
pub mod stats;
pub mod types;

pub use buffer::{BufferRegistry, StagingBuffer};
pub use compression::{CompressOutcome, Lz4RecordCodec, RecordCodec};
pub use config::Config;
pub use error::FlashlogError;
pub use format::{
    ExtentHeader, LogFileReader, LogMetadata, MetadataTable, RecordHeader, EXTENT_HEADER_SIZE,
    EXTENT_MAGIC, OUTPUT_BLOCK_ALIGNMENT, RECORD_HEADER_SIZE,
};
pub use io::OutputSink;
pub use runtime::{
    finish_alloc, preallocate, print_config, print_stats, reserve_alloc, set_log_file, shutdown,
    sync, write_record, Runtime,
};
pub use stats::{StatsSnapshot, WorkerMetrics};
pub use types::{DecodedRecord, Result};
