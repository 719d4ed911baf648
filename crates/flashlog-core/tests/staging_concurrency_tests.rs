use std::sync::Arc;
use std::thread;

use flashlog_core::StagingBuffer;

/// Byte-exact SPSC round trip: everything the producer commits comes out of
/// peek/consume in the same order, across many wraps.
#[test]
fn concurrent_round_trip_preserves_every_byte() {
    let buffer = Arc::new(StagingBuffer::new(1, 4096));
    let record_count = 20_000usize;

    let producer = Arc::clone(&buffer);
    let writer = thread::spawn(move || {
        let mut written = Vec::new();
        for i in 0..record_count {
            // Variable sizes force both the fast path and the wrap path.
            let len = 1 + (i * 7) % 96;
            let record = vec![(i % 251) as u8; len];
            producer.push(&record).unwrap();
            written.extend_from_slice(&record);
        }
        written
    });

    let expected_len: usize = (0..record_count).map(|i| 1 + (i * 7) % 96).sum();
    let mut seen = Vec::new();
    while seen.len() < expected_len {
        let run = buffer.peek();
        if run.is_empty() {
            thread::yield_now();
            continue;
        }
        seen.extend_from_slice(run);
        let len = run.len();
        buffer.consume(len);
    }

    let written = writer.join().unwrap();
    assert_eq!(seen.len(), written.len());
    assert_eq!(seen, written);
}

/// A producer facing a paused consumer blocks in reserve and resumes once
/// space frees up, recording the stall in its blocked-cycle counter.
#[test]
fn paused_consumer_applies_back_pressure() {
    let buffer = Arc::new(StagingBuffer::new(1, 4096));
    let producer = Arc::clone(&buffer);

    let writer = thread::spawn(move || {
        // More bytes than the queue holds: the later pushes must block.
        for _ in 0..8 {
            producer.push(&[0x5A; 1024]).unwrap();
        }
    });

    // Let the producer hit the full queue before draining.
    thread::sleep(std::time::Duration::from_millis(50));

    let mut drained = 0usize;
    while drained < 8 * 1024 {
        let run = buffer.peek();
        if run.is_empty() {
            thread::yield_now();
            continue;
        }
        assert!(run.iter().all(|&byte| byte == 0x5A));
        drained += run.len();
        let len = run.len();
        buffer.consume(len);
    }
    writer.join().unwrap();

    assert_eq!(drained, 8 * 1024);
    assert!(buffer.cycles_producer_blocked() > 0);
}
