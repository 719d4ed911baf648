use flashlog_core::{
    ExtentHeader, FlashlogError, LogFileReader, Lz4RecordCodec, RecordCodec, RecordHeader,
    EXTENT_HEADER_SIZE, OUTPUT_BLOCK_ALIGNMENT,
};

fn record(log_id: u32, timestamp: u64, payload: &[u8]) -> Vec<u8> {
    let header = RecordHeader {
        log_id,
        payload_len: payload.len() as u32,
        timestamp,
    };
    let mut bytes = header.to_bytes().to_vec();
    bytes.extend_from_slice(payload);
    bytes
}

/// Builds one padded block holding a single extent, the way the worker does.
fn block(buffer_id: u32, records: &[Vec<u8>]) -> Vec<u8> {
    let mut run = Vec::new();
    for r in records {
        run.extend_from_slice(r);
    }

    let mut codec = Lz4RecordCodec;
    let mut payload = Vec::new();
    let outcome = codec.compress(buffer_id, &run, &mut payload, 1 << 20);
    assert_eq!(outcome.bytes_in, run.len());

    let header = ExtentHeader {
        buffer_id,
        payload_len: payload.len() as u32,
        crc32: crc32fast::hash(&payload),
    };
    let mut bytes = header.to_bytes().to_vec();
    bytes.extend_from_slice(&payload);
    let padded = bytes.len().next_multiple_of(OUTPUT_BLOCK_ALIGNMENT);
    bytes.resize(padded, 0);
    bytes
}

#[test]
fn reads_extents_across_block_padding() {
    let mut data = block(1, &[record(10, 111, b"alpha"), record(11, 222, b"beta")]);
    data.extend_from_slice(&block(2, &[record(12, 333, b"gamma")]));
    assert_eq!(data.len() % OUTPUT_BLOCK_ALIGNMENT, 0);

    let records = LogFileReader::new(&data)
        .decode(&Lz4RecordCodec, None)
        .unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].buffer_id, 1);
    assert_eq!(records[0].log_id, 10);
    assert_eq!(records[0].timestamp, 111);
    assert_eq!(records[0].payload, b"alpha");
    assert_eq!(records[2].buffer_id, 2);
    assert_eq!(records[2].payload, b"gamma");
}

#[test]
fn decode_stops_at_the_limit() {
    let data = block(
        1,
        &[
            record(1, 0, b"one"),
            record(2, 0, b"two"),
            record(3, 0, b"three"),
        ],
    );
    let records = LogFileReader::new(&data)
        .decode(&Lz4RecordCodec, Some(2))
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].payload, b"two");
}

#[test]
fn corrupt_payload_fails_the_checksum() {
    let mut data = block(1, &[record(1, 0, b"payload")]);
    // Flip a byte inside the compressed payload, past the extent header.
    data[EXTENT_HEADER_SIZE + 2] ^= 0xFF;

    let error = LogFileReader::new(&data)
        .decode(&Lz4RecordCodec, None)
        .unwrap_err();
    assert!(matches!(error, FlashlogError::ChecksumMismatch { .. }));
}

#[test]
fn nonzero_padding_is_rejected() {
    let mut data = block(1, &[record(1, 0, b"ok")]);
    // Corrupt the zero padding at the tail of the block.
    let last = data.len() - 1;
    assert_eq!(data[last], 0);
    data[last] = 0x7F;

    let mut reader = LogFileReader::new(&data);
    let first = reader.next_extent().unwrap();
    assert!(first.is_some());
    assert!(matches!(
        reader.next_extent(),
        Err(FlashlogError::InvalidFormat(_))
    ));
}

#[test]
fn truncated_extent_payload_is_detected() {
    let data = block(1, &[record(1, 0, b"a longer payload to truncate")]);
    let cut = &data[..EXTENT_HEADER_SIZE + 4];
    assert!(matches!(
        LogFileReader::new(cut).next_extent(),
        Err(FlashlogError::InvalidFormat(_))
    ));
}

#[test]
fn trailing_zero_blocks_end_the_stream() {
    let mut data = block(1, &[record(1, 0, b"x")]);
    data.extend_from_slice(&[0u8; OUTPUT_BLOCK_ALIGNMENT]);

    let records = LogFileReader::new(&data)
        .decode(&Lz4RecordCodec, None)
        .unwrap();
    assert_eq!(records.len(), 1);
}
